//! Error types for the wire contract.

use thiserror::Error;

/// Errors raised while decoding or validating protocol data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A message could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// An event payload did not match the shape its event name requires.
    #[error("invalid {event_name} payload: {detail}")]
    InvalidPayload { event_name: String, detail: String },

    /// A tag name is not serializable as HTML.
    #[error("invalid tag name: {0:?}")]
    InvalidTagName(String),

    /// An attribute name is not serializable as HTML.
    #[error("invalid attribute name {name:?} on <{tag}>")]
    InvalidAttributeName { tag: String, name: String },

    /// A void element was given children.
    #[error("void element <{0}> cannot have children")]
    VoidElementChildren(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed(err.to_string())
    }
}
