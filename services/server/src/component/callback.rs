use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use weft_protocol::EventPayload;

use super::Instance;
use crate::HookError;

/// What an event callback receives.
#[derive(Debug, Clone)]
pub struct EventCx {
    /// The instance whose render registered the handler.
    pub instance: Instance,
    pub event_name: String,
    pub payload: EventPayload,
}

/// How the reconciler recognises "the same" callback across renders.
///
/// Closures are recognised by their concrete type, so a callback created at
/// one call site keeps its handler id while a fresh closure value is built on
/// every render. Several bindings of the same closure type within one render
/// are told apart by occurrence order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackIdentity {
    Closure(TypeId),
    Keyed(String),
}

type CallbackFn = dyn Fn(EventCx) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync;

/// An event callback.
#[derive(Clone)]
pub struct Callback {
    identity: CallbackIdentity,
    f: Arc<CallbackFn>,
}

impl Callback {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventCx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        Self {
            identity: CallbackIdentity::Closure(TypeId::of::<F>()),
            f: Arc::new(move |cx| Box::pin(f(cx))),
        }
    }

    /// A callback with an explicit identity, for closures built generically
    /// where several call sites share one closure type.
    pub fn keyed<F, Fut>(key: impl Into<String>, f: F) -> Self
    where
        F: Fn(EventCx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        Self {
            identity: CallbackIdentity::Keyed(key.into()),
            ..Self::new(f)
        }
    }

    pub fn identity(&self) -> &CallbackIdentity {
        &self.identity
    }

    pub(crate) fn call(&self, cx: EventCx) -> BoxFuture<'static, Result<(), HookError>> {
        (self.f)(cx)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
