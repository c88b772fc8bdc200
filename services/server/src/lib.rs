//! # weft-server
//!
//! The server half of weft: a component tree held on the server and kept in
//! sync with the browser's DOM over a duplex channel.
//!
//! ## Flow
//!
//! 1. [`Server::render_page`] renders a root component to HTML and persists
//!    its [`weft_protocol::StateTree`] snapshot
//! 2. The browser opens a channel and sends `connect` with the root ids in
//!    its DOM; the [`Session`] rehydrates each root from its snapshot
//! 3. Events dispatch to handlers, handlers call [`Instance::set_state`], and
//!    every state change that alters state re-renders the instance and pushes
//!    its whole node tree to the client
//! 4. On close each root is snapshotted again so a reconnect can resume it
//!
//! ## Concurrency
//!
//! Every instance serializes state application, rendering, mounting and
//! unmounting behind its own async lock, always acquired parent before child.
//! Lifecycle hooks run outside any lock, so a hook may freely call
//! `set_state` on any instance.

pub mod api;
pub mod component;
pub mod config;
pub mod css;
pub mod demo;
mod error;
mod render;
pub mod report;
mod root;
mod scope;
mod server;
mod session;
pub mod snapshot;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use component::{
    Callback, Changeset, Component, ComponentRegistry, ComponentType, El, EventCx, Instance,
    Markup, Props, RenderCx,
};
pub use error::{
    DivergenceError, HookError, LifecycleError, ProtocolViolation, RegistryError, ServerError,
    SnapshotError,
};
pub use render::RenderTrigger;
pub use root::{Root, RootContext};
pub use scope::{RenderOptions, DEFAULT_HANDLER_GRACE};
pub use server::{
    PageRender, Server, ServerBuilder, ServerOptions, DEFAULT_RELOAD_SNAPSHOT_TTL,
    DEFAULT_SNAPSHOT_TTL,
};
pub use session::Session;

/// A component's state.
pub use weft_protocol::State;

/// Locks a std mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
