use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio::{runtime::Handle, sync::mpsc};
use tokio_postgres::Client;

use crate::common::statement::postgres;

use super::{
    super::{
        super::{
            completion::{Completer, Completion, completion},
            failure,
        },
        common::error::tokio_postgres::QueryError,
        r#trait::{Listener, Operation},
        types::Notification,
    },
    connection::Subscribers,
};

/// Subscription to a notification channel on a ``tokio-postgres`` connection
///
/// Dropping an active listener unsubscribes in the background, on the
/// runtime the listener was created on. The connection is released only
/// after `UNLISTEN` has run.
pub struct PgListener {
    client: Arc<Client>,
    runtime: Handle,
    subscribers: Subscribers,
    channel: String,
    notifications: mpsc::UnboundedReceiver<Notification>,
    completer: Option<Completer>,
    completion: Completion,
}

impl PgListener {
    pub(super) fn new(
        client: Arc<Client>,
        subscribers: Subscribers,
        channel: &str,
        notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> Self {
        let (completer, completion) = completion();
        Self {
            client,
            runtime: Handle::current(),
            subscribers,
            channel: channel.to_owned(),
            notifications,
            completer: Some(completer),
            completion,
        }
    }
}

impl fmt::Debug for PgListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgListener")
            .field("channel", &self.channel)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl Operation for PgListener {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

#[async_trait]
impl Listener for PgListener {
    type Error = QueryError;

    fn channel(&self) -> &str {
        &self.channel
    }

    fn is_listening(&self) -> bool {
        self.completer.is_some()
    }

    async fn next(&mut self) -> Option<Notification> {
        if !self.is_listening() {
            return None;
        }
        self.notifications.recv().await
    }

    async fn unlisten(&mut self) -> Result<(), QueryError> {
        let Some(completer) = self.completer.take() else {
            return Err(QueryError::NotListening(self.channel.clone()));
        };

        let result = self
            .client
            .batch_execute(&postgres::unlisten(&self.channel))
            .await;
        self.subscribers.lock().remove(&self.channel);
        completer.complete();
        result.map_err(Into::into)
    }
}

impl Drop for PgListener {
    fn drop(&mut self) {
        let Some(completer) = self.completer.take() else {
            return;
        };

        let client = self.client.clone();
        let subscribers = self.subscribers.clone();
        let channel = std::mem::take(&mut self.channel);
        failure::complete_after(&self.runtime, "listener cleanup", completer, async move {
            let result = client.batch_execute(&postgres::unlisten(&channel)).await;
            subscribers.lock().remove(&channel);
            result.map_err(QueryError::from)
        });
    }
}
