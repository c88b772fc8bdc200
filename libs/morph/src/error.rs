//! Error types for the client half.

use thiserror::Error;
use weft_id::{ComponentId, IdError};
use weft_protocol::ProtocolError;

use crate::NodeKey;

/// Errors raised while morphing the DOM or routing events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MorphError {
    /// The key refers to a node that has been removed.
    #[error("node {0} is no longer in the document")]
    StaleNode(NodeKey),

    /// A node's retained description disagrees with the node itself.
    #[error("node {node} was retained as {retained} but is {found}")]
    RetainedMismatch {
        node: NodeKey,
        retained: String,
        found: String,
    },

    /// An operation needs an element but got a text node.
    #[error("node {0} is not an element")]
    NotAnElement(NodeKey),

    /// Inserting the node would make it its own ancestor.
    #[error("inserting {child} under {parent} would create a cycle")]
    Cycle { parent: NodeKey, child: NodeKey },

    /// An update addressed a component the DOM does not show.
    #[error("no element shows component {0}")]
    UnknownTarget(ComponentId),

    /// The document holds no root marker to connect with.
    #[error("document contains no root elements")]
    NoRoots,

    /// An event marker matched outside every root element.
    #[error("node {0} is not inside a root element")]
    OutsideRoot(NodeKey),

    /// A marker attribute carries an unparseable id.
    #[error("invalid id in {attr}: {source}")]
    BadMarker { attr: String, source: IdError },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl MorphError {
    /// Whether the error means client and server no longer agree on the
    /// tree, so the page should be reloaded.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            MorphError::RetainedMismatch { .. } | MorphError::UnknownTarget(_) | MorphError::BadMarker { .. }
        )
    }
}
