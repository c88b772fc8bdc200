//! # weft-protocol
//!
//! Types shared by both ends of a weft connection.
//!
//! ## Design Principles
//!
//! - The server never diffs: it re-renders and ships a whole [`PNode`] tree
//!   for the component that changed; the client reconciles its DOM
//! - Every wire type is plain data with a stable JSON shape
//! - Snapshots ([`StateTree`]) hold no live references and match by declared
//!   component name, never by instance id
//!
//! ## Wire Messages
//!
//! Client to server:
//! - `connect` (the root ids present in the DOM, optional CSS state id)
//! - `event` (root id, component id, handler id, optional payload)
//! - `seenEventNames` (event names the client has wired listeners for)
//! - `nextRuleIndex` (first CSS rule index the client has not seen)
//!
//! Server to client:
//! - `update` (component id, node tree, new event names, CSS rules)

pub mod attrs;
mod error;
pub mod html;
mod message;
mod node;
mod payload;
mod state_tree;

pub use error::ProtocolError;
pub use message::*;
pub use node::*;
pub use payload::*;
pub use state_tree::*;

/// A component's state: a JSON object shallow-merged by changesets.
pub type State = serde_json::Map<String, serde_json::Value>;
