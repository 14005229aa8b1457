use std::{fmt::Display, future::Future, mem};

use parking_lot::{RwLock, const_rwlock};
use tokio::runtime::Handle;

use super::completion::Completer;

type Handler = Box<dyn Fn(&UnhandledFailure) + Send + Sync + 'static>;

static HANDLER: RwLock<Option<Handler>> = const_rwlock(None);

/// Failure of a cleanup task that has no caller to report to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnhandledFailure {
    origin: &'static str,
    message: String,
}

impl UnhandledFailure {
    fn new(origin: &'static str, error: &impl Display) -> Self {
        Self {
            origin,
            message: error.to_string(),
        }
    }

    /// Cleanup task that failed
    #[must_use]
    pub fn origin(&self) -> &'static str {
        self.origin
    }

    /// Rendered error
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for UnhandledFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.origin, self.message)
    }
}

/// Installs a process-wide handler for failures of detached cleanup tasks
///
/// Replaces the default handler, which logs at error level. The handler must
/// not install or clear handlers itself.
pub fn set_unhandled_failure_handler(
    handler: impl Fn(&UnhandledFailure) + Send + Sync + 'static,
) {
    *HANDLER.write() = Some(Box::new(handler));
}

/// Restores the default handler
pub fn clear_unhandled_failure_handler() {
    HANDLER.write().take();
}

pub(crate) fn report(origin: &'static str, error: &impl Display) {
    let failure = UnhandledFailure::new(origin, error);
    match &*HANDLER.read() {
        Some(handler) => handler(&failure),
        None => tracing::error!(origin, error = %failure.message, "unhandled failure"),
    }
}

/// Runs a cleanup task in the background, reporting its failure to the handler
pub(crate) fn spawn_detached<F, E>(origin: &'static str, cleanup: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(error) = cleanup.await {
                    report(origin, &error);
                }
            });
        }
        Err(error) => report(origin, &error),
    }
}

/// Fires its completer only when told to; dropping it leaves the signal pending
struct PendingCompletion(Option<Completer>);

impl PendingCompletion {
    fn complete(mut self) {
        if let Some(completer) = self.0.take() {
            completer.complete();
        }
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        if let Some(completer) = self.0.take() {
            mem::forget(completer);
        }
    }
}

/// Runs a cleanup task on `runtime` and fires `completer` once it has run
///
/// Works from threads outside any runtime. If the runtime is shut down
/// before the task runs, `completer` never fires, so whatever waits on it
/// stays out of circulation.
pub(crate) fn complete_after<F, E>(
    runtime: &Handle,
    origin: &'static str,
    completer: Completer,
    cleanup: F,
) where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let pending = PendingCompletion(Some(completer));
    runtime.spawn(async move {
        let result = cleanup.await;
        pending.complete();
        if let Err(error) = result {
            report(origin, &error);
        }
    });
}
