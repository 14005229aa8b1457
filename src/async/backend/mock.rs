use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    super::completion::{Completer, Completion, completion},
    r#trait::{Connection, Connector, Listener, Operation, PreparedStatement, Transaction},
    types::{CommandResult, IsolationLevel, Notification, QueryResult, Value},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub(crate) struct MockError(pub(crate) String);

/// Counters and switches shared by a connector and everything it creates
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) created: AtomicUsize,
    connecting: AtomicUsize,
    pub(crate) peak_connecting: AtomicUsize,
    pub(crate) refuse_next: AtomicBool,
    pub(crate) prepared: AtomicUsize,
    pub(crate) deallocated: AtomicUsize,
    pub(crate) fail_deallocation: AtomicBool,
    subscribers: Mutex<Vec<(String, mpsc::UnboundedSender<Notification>)>>,
}

impl Counters {
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn publish(&self, channel: &str, payload: &str) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, sender)| !sender.is_closed());
        for (_, sender) in subscribers.iter().filter(|(name, _)| name == channel) {
            let _ = sender.send(Notification {
                channel: channel.to_owned(),
                process_id: 1,
                payload: payload.to_owned(),
            });
        }
    }
}

pub(crate) struct MockConnector {
    counters: Arc<Counters>,
}

impl MockConnector {
    pub(crate) fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                counters: counters.clone(),
            },
            counters,
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self) -> Result<MockConnection, MockError> {
        let connecting = self.counters.connecting.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .peak_connecting
            .fetch_max(connecting, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.counters.connecting.fetch_sub(1, Ordering::SeqCst);

        if self.counters.refuse_next.swap(false, Ordering::SeqCst) {
            return Err(MockError("connection refused".to_owned()));
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            counters: self.counters.clone(),
            channels: Arc::default(),
        })
    }
}

fn run(sql: &str, params: &[Value]) -> Result<QueryResult<MockResultSet>, MockError> {
    if sql.starts_with("INVALID") {
        return Err(MockError(format!("syntax error in {sql}")));
    }

    if sql.to_ascii_uppercase().starts_with("SELECT") {
        let rows = if params.is_empty() {
            vec![Value::Int(1)]
        } else {
            params.to_vec()
        };
        Ok(QueryResult::Rows(MockResultSet::new(rows)))
    } else {
        Ok(QueryResult::Command(CommandResult::new(1)))
    }
}

pub(crate) struct MockConnection {
    counters: Arc<Counters>,
    channels: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl Connection for MockConnection {
    type ResultSet = MockResultSet;
    type Statement = MockStatement;
    type Listener = MockListener;
    type Transaction = MockTransaction;
    type Error = MockError;

    async fn query(&self, sql: &str) -> Result<QueryResult<MockResultSet>, MockError> {
        tokio::task::yield_now().await;
        run(sql, &[])
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<MockResultSet>, MockError> {
        tokio::task::yield_now().await;
        run(sql, params)
    }

    async fn prepare(&self, sql: &str) -> Result<MockStatement, MockError> {
        if sql.starts_with("INVALID") {
            return Err(MockError(format!("syntax error in {sql}")));
        }
        self.counters.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(MockStatement {
            sql: sql.to_owned(),
            counters: self.counters.clone(),
        })
    }

    async fn notify(&self, channel: &str, payload: &str) -> Result<CommandResult, MockError> {
        self.counters.publish(channel, payload);
        Ok(CommandResult::new(1))
    }

    async fn listen(&self, channel: &str) -> Result<MockListener, MockError> {
        tokio::task::yield_now().await;
        if channel.starts_with("INVALID") {
            return Err(MockError(format!("cannot listen on channel {channel}")));
        }
        if !self.channels.lock().insert(channel.to_owned()) {
            return Err(MockError(format!("already listening on channel {channel}")));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.counters
            .subscribers
            .lock()
            .push((channel.to_owned(), sender));
        let (completer, completion) = completion();
        Ok(MockListener {
            channel: channel.to_owned(),
            channels: self.channels.clone(),
            notifications: receiver,
            completer: Some(completer),
            completion,
        })
    }

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<MockTransaction, MockError> {
        let (completer, completion) = completion();
        Ok(MockTransaction {
            isolation,
            completer: Some(completer),
            completion,
        })
    }
}

pub(crate) struct MockResultSet {
    rows: VecDeque<Value>,
    completer: Option<Completer>,
    completion: Completion,
}

impl MockResultSet {
    fn new(rows: Vec<Value>) -> Self {
        let (completer, completion) = completion();
        Self {
            rows: rows.into(),
            completer: Some(completer),
            completion,
        }
    }

    pub(crate) fn next_row(&mut self) -> Option<Value> {
        let row = self.rows.pop_front();
        if row.is_none() {
            if let Some(completer) = self.completer.take() {
                completer.complete();
            }
        }
        row
    }
}

impl Operation for MockResultSet {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

pub(crate) struct MockStatement {
    sql: String,
    counters: Arc<Counters>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    type ResultSet = MockResultSet;
    type Error = MockError;

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, params: &[Value]) -> Result<QueryResult<MockResultSet>, MockError> {
        run(&self.sql, params)
    }

    async fn deallocate(self) -> Result<(), MockError> {
        tokio::task::yield_now().await;
        self.counters.deallocated.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_deallocation.load(Ordering::SeqCst) {
            return Err(MockError(format!("cannot deallocate {}", self.sql)));
        }
        Ok(())
    }
}

pub(crate) struct MockListener {
    channel: String,
    channels: Arc<Mutex<HashSet<String>>>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    completer: Option<Completer>,
    completion: Completion,
}

impl Operation for MockListener {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

#[async_trait]
impl Listener for MockListener {
    type Error = MockError;

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

    async fn unlisten(&mut self) -> Result<(), MockError> {
        let Some(completer) = self.completer.take() else {
            return Err(MockError(format!("not listening on channel {}", self.channel)));
        };
        self.channels.lock().remove(&self.channel);
        completer.complete();
        Ok(())
    }
}

impl Drop for MockListener {
    fn drop(&mut self) {
        if self.completer.is_some() {
            self.channels.lock().remove(&self.channel);
        }
    }
}

pub(crate) struct MockTransaction {
    isolation: IsolationLevel,
    completer: Option<Completer>,
    completion: Completion,
}

impl MockTransaction {
    fn ensure_active(&self) -> Result<(), MockError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(MockError("transaction is no longer active".to_owned()))
        }
    }

    fn finish(&mut self) -> Result<(), MockError> {
        self.ensure_active()?;
        if let Some(completer) = self.completer.take() {
            completer.complete();
        }
        Ok(())
    }
}

impl Operation for MockTransaction {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    type ResultSet = MockResultSet;
    type Error = MockError;

    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn is_active(&self) -> bool {
        self.completer.is_some()
    }

    async fn query(&self, sql: &str) -> Result<QueryResult<MockResultSet>, MockError> {
        self.ensure_active()?;
        run(sql, &[])
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<MockResultSet>, MockError> {
        self.ensure_active()?;
        run(sql, params)
    }

    async fn commit(&mut self) -> Result<(), MockError> {
        self.finish()
    }

    async fn rollback(&mut self) -> Result<(), MockError> {
        self.finish()
    }

    async fn savepoint(&self, _name: &str) -> Result<(), MockError> {
        self.ensure_active()
    }

    async fn rollback_to(&self, _name: &str) -> Result<(), MockError> {
        self.ensure_active()
    }

    async fn release_savepoint(&self, _name: &str) -> Result<(), MockError> {
        self.ensure_active()
    }
}
