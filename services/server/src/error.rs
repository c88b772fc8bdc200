//! Error taxonomy for the server half.
//!
//! [`ServerError::is_fatal`] decides whether a connection survives an error:
//! protocol violations and render divergence force-close the channel, while
//! user callback failures and rejected payloads only drop the offending event.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use weft_id::{ComponentId, CssStateId, HandlerId};
use weft_protocol::ProtocolError;

/// A failure raised by user code: a render function, lifecycle hook or event
/// callback.
///
/// Cloning shares the underlying error, so the reporter can recognise the same
/// failure arriving along several propagation paths.
#[derive(Clone)]
pub struct HookError(pub(crate) Arc<anyhow::Error>);

impl HookError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// True when both values carry the same error object.
    pub fn same(&self, other: &HookError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl From<anyhow::Error> for HookError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl From<ServerError> for HookError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Hook(err) => err,
            other => Self::new(other),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Lifecycle misuse.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("component {component_id} mutated state {attempts} times after unmount")]
    StrayMutation {
        component_id: ComponentId,
        attempts: u32,
    },
}

/// Component registration and lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component name {0:?} is already registered")]
    DuplicateName(String),

    #[error("component {0:?} is not registered")]
    Unregistered(String),
}

/// The rendered tree no longer matches what the reconciler can express.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DivergenceError {
    #[error("component {component} rendered {count} root nodes, expected exactly one element")]
    NotExactlyOneRoot { component: String, count: usize },

    #[error("component {component} rendered a text node as its root")]
    TextRoot { component: String },

    #[error("alias chain starting at {0} does not terminate")]
    AliasCycle(ComponentId),
}

/// Violations of the connection protocol. All of them are fatal.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    #[error("connect message carried no root ids")]
    EmptyRootIds,

    #[error("no snapshot stored for root {0}")]
    MissingSnapshot(ComponentId),

    #[error("no CSS state stored under {0}")]
    MissingCssState(CssStateId),

    #[error("failed to rehydrate root {root_id}: {reason}")]
    RehydrationFailed { root_id: ComponentId, reason: String },

    #[error("connection already received its connect message")]
    AlreadyConnected,

    #[error("message received before connect")]
    NotConnected,

    #[error("event addressed to unknown root {0}")]
    UnknownRoot(ComponentId),

    #[error("malformed message: {0}")]
    Malformed(#[from] ProtocolError),
}

/// Snapshot persistence failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid TTL: {0}")]
    InvalidTtl(String),
}

/// Top-level error for render passes, lifecycle operations and sessions.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("render divergence: {0}")]
    Divergence(#[from] DivergenceError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("component error: {0}")]
    Hook(#[from] HookError),

    #[error("rejected event {handler_id}: {source}")]
    RejectedEvent {
        handler_id: HandlerId,
        source: ProtocolError,
    },

    #[error("HTML serialization failed: {0}")]
    Html(ProtocolError),
}

impl ServerError {
    /// Whether the connection must be force-closed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ServerError::Hook(_) | ServerError::RejectedEvent { .. } | ServerError::Lifecycle(_)
        )
    }
}
