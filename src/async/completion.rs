use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};

/// Creates a linked completion signal
///
/// The [`Completion`] resolves once the [`Completer`] is either completed
/// or dropped.
///
/// # Example
/// ```
/// use db_conn_pool::r#async::completion;
///
/// let (completer, completion) = completion();
/// let observer = completion.clone();
///
/// completer.complete();
/// tokio_test::block_on(observer);
/// assert!(completion.is_complete());
/// ```
#[must_use]
pub fn completion() -> (Completer, Completion) {
    let (sender, receiver) = oneshot::channel();
    (Completer(sender), Completion(receiver.shared()))
}

/// Firing side of a completion signal
pub struct Completer(oneshot::Sender<()>);

impl Completer {
    /// Fires the signal
    pub fn complete(self) {
        // observers may all be gone
        let _ = self.0.send(());
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("observed", &!self.0.is_canceled())
            .finish()
    }
}

/// Observing side of a completion signal
///
/// Clones observe the same signal.
#[derive(Clone)]
pub struct Completion(Shared<oneshot::Receiver<()>>);

impl Completion {
    /// Whether the signal has fired
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.0.clone().now_or_never().is_some()
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_unpin(cx).map(|_| ())
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}
