//! Reporting of user-code failures.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::error;

use crate::{lock, HookError, ServerError};

/// Callback invoked with user-code failures.
pub type ErrorHook = Arc<dyn Fn(&HookError) + Send + Sync>;

/// Routes render, lifecycle and callback failures to an optional hook.
///
/// With a hook installed, failures are contained: the hook sees each distinct
/// error object once and the caller carries on. Without one, the failure
/// propagates to the caller.
#[derive(Default)]
pub struct ErrorReporter {
    hook: Option<ErrorHook>,
    seen: Mutex<Vec<Weak<anyhow::Error>>>,
}

impl ErrorReporter {
    pub fn new(hook: Option<ErrorHook>) -> Self {
        Self {
            hook,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    pub fn report(&self, err: HookError) -> Result<(), ServerError> {
        let Some(hook) = &self.hook else {
            return Err(ServerError::Hook(err));
        };
        if self.first_sighting(&err) {
            error!(error = %err, "Component error");
            hook(&err);
        }
        Ok(())
    }

    /// Routes the error carried by a [`ServerError::Hook`] through the hook;
    /// any other error passes through untouched.
    pub fn contain(&self, err: ServerError) -> Result<(), ServerError> {
        match err {
            ServerError::Hook(err) => self.report(err),
            other => Err(other),
        }
    }

    fn first_sighting(&self, err: &HookError) -> bool {
        let mut seen = lock(&self.seen);
        seen.retain(|weak| weak.strong_count() > 0);
        let ptr = Arc::as_ptr(&err.0);
        if seen.iter().any(|weak| std::ptr::eq(weak.as_ptr(), ptr)) {
            return false;
        }
        seen.push(Arc::downgrade(&err.0));
        true
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("has_hook", &self.has_hook())
            .finish()
    }
}
