//! # weft-morph
//!
//! The client half of weft, over an in-memory document.
//!
//! ## Pieces
//!
//! - [`Dom`]: an arena of element and text nodes with generation-checked
//!   keys, live form state, and per-node debounce timers
//! - [`Morph`]: edits a subtree to match an incoming [`weft_protocol::PNode`]
//!   while keeping node identity, keyed order, and in-flight typing
//! - [`EventRouter`]: lazy listener wiring and capture/bubble dispatch into
//!   `event` messages
//! - [`Client`]: ties the three together and speaks the wire protocol
//!
//! A server-rendered page is loaded with [`Dom::load`], then
//! [`Client::connect`] adopts it once so later updates morph it in place.

pub mod client;
pub mod dom;
mod error;
pub mod morph;
pub mod router;

pub use client::Client;
pub use dom::{Dom, NodeKey, Retained};
pub use error::MorphError;
pub use morph::{Morph, MorphOptions, MorphOutcome, MorphStats, DEFAULT_TEXT_DEBOUNCE};
pub use router::{Dispatch, DomEvent, EventRouter};
