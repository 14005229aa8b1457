use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::common::config::PoolConfig;

use super::{
    backend::{
        Error,
        r#trait::{Connection, Connector, Operation},
        types::{CommandResult, IsolationLevel, QueryResult, Value},
    },
    completion::Completion,
    object_pool::{ObjectPool, Reusable},
    statement::Statement,
};

pub(super) type ConnectionOf<C> = <C as Connector>::Connection;
pub(super) type ResultSetOf<C> = <ConnectionOf<C> as Connection>::ResultSet;
pub(super) type StatementOf<C> = <ConnectionOf<C> as Connection>::Statement;
type ListenerOf<C> = <ConnectionOf<C> as Connection>::Listener;
type TransactionOf<C> = <ConnectionOf<C> as Connection>::Transaction;

/// Error returned by a [`ConnectionPool`] over connector `C`
pub type PoolError<C> = Error<<C as Connector>::Error, <ConnectionOf<C> as Connection>::Error>;

/// Connection leased from a [`ConnectionPool`]
///
/// Goes back to the pool that created it when dropped.
pub type PooledConnection<C> = Reusable<ConnectionOf<C>>;

struct ListenerSlot<T> {
    connection: Option<Reusable<T>>,
    count: usize,
}

struct Inner<C: Connector> {
    connections: ObjectPool<ConnectionOf<C>, C::Error>,
    listener: Mutex<ListenerSlot<ConnectionOf<C>>>,
    // serializes acquisition of the listener connection
    listener_acquire: tokio::sync::Mutex<()>,
}

impl<C: Connector> Inner<C> {
    fn unsubscribe(&self) {
        let released = {
            let mut slot = self.listener.lock();
            slot.count = slot.count.saturating_sub(1);
            if slot.count == 0 {
                slot.connection.take()
            } else {
                None
            }
        };

        if let Some(connection) = released {
            tracing::debug!(connection_id = %connection.id(), "unpinned listener connection");
        }
    }
}

/// Reference held by one active listener on the shared listener connection
struct Subscription<C: Connector> {
    inner: Weak<Inner<C>>,
}

impl<C: Connector> Drop for Subscription<C> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unsubscribe();
        }
    }
}

/// Keeps `guard` alive until `completion` fires
fn hold_until<G>(guard: G, completion: Completion)
where
    G: Send + 'static,
{
    if completion.is_complete() {
        return;
    }

    tokio::spawn(async move {
        completion.await;
        drop(guard);
    });
}

/// Pool of connections to a single database
///
/// Every operation leases a connection for as long as its outcome needs it:
/// one-shot statements release it right away, streamed results and
/// transactions once they complete, and listeners share a single pinned
/// connection until the last of them unsubscribes.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Creates a new connection pool
    ///
    /// No connection is opened until one is needed.
    #[must_use]
    pub fn new(connector: C, config: &PoolConfig) -> Self {
        let connector = Arc::new(connector);
        let connections = ObjectPool::new(config.max_connections, move || {
            let connector = connector.clone();
            Box::pin(async move { connector.connect().await })
        });

        Self {
            inner: Arc::new(Inner {
                connections,
                listener: Mutex::new(ListenerSlot {
                    connection: None,
                    count: 0,
                }),
                listener_acquire: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Number of connections opened by this pool
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Number of connections available for lease
    #[must_use]
    pub fn idle_connection_count(&self) -> usize {
        self.inner.connections.idle_len()
    }

    /// Number of connections currently leased, including the listener connection
    #[must_use]
    pub fn leased_connection_count(&self) -> usize {
        self.connection_count()
            .saturating_sub(self.idle_connection_count())
    }

    /// Maximum number of connections this pool opens
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.inner.connections.max_size()
    }

    /// Number of active listeners sharing the listener connection
    ///
    /// Includes listeners still waiting for the listener connection to be
    /// opened.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listener.lock().count
    }

    /// Leases a connection
    ///
    /// Waits while the pool is exhausted. A failure to open a new connection
    /// is only reported to the caller whose lease triggered it.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError<C>> {
        self.inner.connections.pull().await.map_err(Error::Connect)
    }

    /// Returns a leased connection to the pool
    ///
    /// Dropping the connection has the same effect. Fails if the connection
    /// was leased from another pool, in which case it goes back to that pool.
    pub fn release(&self, connection: PooledConnection<C>) -> Result<(), PoolError<C>> {
        self.inner
            .connections
            .release(connection)
            .map_err(Error::UnknownConnection)
    }

    /// Runs a statement without parameters
    ///
    /// The connection is released once the returned rows are consumed or
    /// dropped, or right away if the statement returned no rows.
    pub async fn query(&self, sql: &str) -> Result<QueryResult<ResultSetOf<C>>, PoolError<C>> {
        let connection = self.acquire().await?;
        let result = connection.query(sql).await;
        Self::release_with(connection, result)
    }

    /// Runs a statement with parameters
    ///
    /// Releases the connection like [`ConnectionPool::query`].
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<ResultSetOf<C>>, PoolError<C>> {
        let connection = self.acquire().await?;
        let result = connection.execute(sql, params).await;
        Self::release_with(connection, result)
    }

    /// Prepares a statement
    ///
    /// The connection is released as soon as the statement is prepared. The
    /// statement holds no lease: each execution acquires a connection from
    /// this pool.
    pub async fn prepare(&self, sql: &str) -> Result<Statement<C>, PoolError<C>> {
        let connection = self.acquire().await?;
        let id = connection.id();
        let prepared = connection.prepare(sql).await;
        drop(connection);
        prepared
            .map(|prepared| Statement::new(self.clone(), sql, id, prepared))
            .map_err(Error::Query)
    }

    /// Sends a notification on a channel
    pub async fn notify(&self, channel: &str, payload: &str) -> Result<CommandResult, PoolError<C>> {
        let connection = self.acquire().await?;
        let result = connection.notify(channel, payload).await;
        drop(connection);
        result.map_err(Error::Query)
    }

    /// Subscribes to a channel
    ///
    /// All listeners of a pool share one connection, which goes back to the
    /// pool once the last listener unsubscribes. Fails if the channel is
    /// already listened on through this pool.
    pub async fn listen(&self, channel: &str) -> Result<ListenerOf<C>, PoolError<C>> {
        let (connection, subscription) = self.subscribe().await?;

        match connection.listen(channel).await {
            Ok(listener) => {
                hold_until(subscription, listener.completion());
                Ok(listener)
            }
            Err(error) => {
                drop(subscription);
                Err(Error::Query(error))
            }
        }
    }

    async fn subscribe(&self) -> Result<(Arc<ConnectionOf<C>>, Subscription<C>), PoolError<C>> {
        let _acquiring = self.inner.listener_acquire.lock().await;

        let pinned = {
            let mut slot = self.inner.listener.lock();
            slot.count += 1;
            slot.connection.as_ref().map(Reusable::shared)
        };
        // rolls the count back if anything below fails
        let subscription = Subscription {
            inner: Arc::downgrade(&self.inner),
        };

        let connection = if let Some(connection) = pinned {
            connection
        } else {
            let leased = self.acquire().await?;
            let connection = leased.shared();
            tracing::debug!(connection_id = %leased.id(), "pinned listener connection");
            self.inner.listener.lock().connection = Some(leased);
            connection
        };

        Ok((connection, subscription))
    }

    /// Opens a transaction
    ///
    /// The connection is released once the transaction is committed, rolled
    /// back, or dropped.
    pub async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<TransactionOf<C>, PoolError<C>> {
        let connection = self.acquire().await?;
        let transaction = connection
            .begin_transaction(isolation)
            .await
            .map_err(Error::Query)?;
        hold_until(connection, transaction.completion());
        Ok(transaction)
    }

    pub(super) fn release_with(
        connection: PooledConnection<C>,
        result: Result<QueryResult<ResultSetOf<C>>, <ConnectionOf<C> as Connection>::Error>,
    ) -> Result<QueryResult<ResultSetOf<C>>, PoolError<C>> {
        match result {
            Ok(QueryResult::Rows(rows)) => {
                hold_until(connection, rows.completion());
                Ok(QueryResult::Rows(rows))
            }
            Ok(command @ QueryResult::Command(_)) => Ok(command),
            Err(error) => Err(Error::Query(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::{
        collections::HashSet,
        sync::{Arc, atomic::Ordering},
        time::Duration,
    };

    use futures::future::join_all;
    use tokio::{task::JoinHandle, time::timeout};

    use crate::common::config::PoolConfig;

    use super::{
        super::{
            backend::{
                Error,
                mock::{Counters, MockConnector, MockResultSet},
                r#trait::{Listener, Transaction},
                types::{CommandResult, IsolationLevel, QueryResult, Value},
            },
            builder::ConnectionPoolBuilder,
            failure::tests::{recorded_failures, wait_for_failure},
        },
        ConnectionPool,
    };

    fn create_pool(max_connections: usize) -> (ConnectionPool<MockConnector>, Arc<Counters>) {
        let (connector, counters) = MockConnector::new();
        let pool = ConnectionPool::new(
            connector,
            &PoolConfig::new().max_connections(max_connections),
        );
        (pool, counters)
    }

    async fn settle() {
        for _ in 0..256 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn builds_pool_from_connector() {
        let (connector, _) = MockConnector::new();
        let pool = connector.create_connection_pool(&PoolConfig::new().max_connections(3));
        assert_eq!(pool.max_connections(), 3);
        assert_eq!(pool.connection_count(), 0);
    }

    #[tokio::test]
    async fn creates_one_connection_per_concurrent_caller() {
        let (pool, counters) = create_pool(4);

        let leases = join_all((0..4).map(|_| pool.acquire())).await;
        let ids = leases
            .iter()
            .map(|lease| lease.as_ref().unwrap().id())
            .collect::<HashSet<_>>();

        assert_eq!(ids.len(), 4);
        assert_eq!(counters.created(), 4);
        assert_eq!(counters.peak_connecting.load(Ordering::SeqCst), 1);
        assert_eq!(pool.leased_connection_count(), 4);
        assert_eq!(pool.idle_connection_count(), 0);
    }

    #[tokio::test]
    async fn suspends_callers_beyond_capacity() {
        let (pool, counters) = create_pool(2);

        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();

        let waiting = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await.unwrap().id() }
        });
        settle().await;
        assert!(!waiting.is_finished());
        assert_eq!(counters.created(), 2);

        let id = first.id();
        drop(first);
        assert_eq!(waiting.await.unwrap(), id);
        assert_eq!(counters.created(), 2);
    }

    #[tokio::test]
    async fn releases_connection_explicitly() {
        let (pool, _) = create_pool(2);

        let connection = pool.acquire().await.unwrap();
        pool.release(connection).unwrap();

        assert_eq!(pool.idle_connection_count(), 1);
        assert_eq!(pool.leased_connection_count(), 0);
    }

    #[tokio::test]
    async fn rejects_connections_of_other_pools() {
        let (pool, _) = create_pool(1);
        let (other, _) = create_pool(1);

        let connection = other.acquire().await.unwrap();
        let id = connection.id();
        assert!(matches!(
            pool.release(connection),
            Err(Error::UnknownConnection(rejected)) if rejected == id
        ));
        assert_eq!(other.idle_connection_count(), 1);

        let _held = pool.acquire().await.unwrap();
        let connection = other.acquire().await.unwrap();
        assert!(matches!(
            pool.release(connection),
            Err(Error::UnknownConnection(rejected)) if rejected == id
        ));
        assert_eq!(other.idle_connection_count(), 1);
        assert_eq!(pool.connection_count(), 1);
        assert_eq!(other.connection_count(), 1);
    }

    #[tokio::test]
    async fn releases_connection_after_one_shot_operations() {
        let (pool, counters) = create_pool(2);

        let result = pool.query("UPDATE book SET title = 'Dune'").await.unwrap();
        assert_eq!(result.command().map(CommandResult::affected_rows), Some(1));
        assert_eq!(pool.idle_connection_count(), 1);

        assert!(matches!(
            pool.execute("INVALID", &[]).await,
            Err(Error::Query(_))
        ));
        assert_eq!(pool.idle_connection_count(), 1);

        pool.notify("jobs", "ready").await.unwrap();
        assert_eq!(pool.idle_connection_count(), 1);

        assert!(pool.prepare("INVALID").await.is_err());
        let statement = pool.prepare("SELECT 1").await.unwrap();
        assert_eq!(pool.idle_connection_count(), 1);
        assert_eq!(pool.leased_connection_count(), 0);

        statement.close().await.unwrap();
        assert_eq!(counters.deallocated.load(Ordering::SeqCst), 1);
        assert_eq!(counters.created(), 1);
    }

    #[tokio::test]
    async fn holds_connection_until_rows_are_consumed() {
        let (pool, _) = create_pool(2);

        let mut rows = pool
            .execute("SELECT $1", &[Value::Int(7)])
            .await
            .unwrap()
            .into_rows()
            .unwrap();
        settle().await;
        assert_eq!(pool.idle_connection_count(), 0);

        assert_eq!(rows.next_row(), Some(Value::Int(7)));
        settle().await;
        assert_eq!(pool.idle_connection_count(), 0);

        assert_eq!(rows.next_row(), None);
        settle().await;
        assert_eq!(pool.idle_connection_count(), 1);
    }

    #[tokio::test]
    async fn releases_connection_when_rows_are_dropped() {
        let (pool, _) = create_pool(2);

        let rows = pool.query("SELECT 1").await.unwrap().into_rows().unwrap();
        settle().await;
        assert_eq!(pool.leased_connection_count(), 1);

        drop(rows);
        settle().await;
        assert_eq!(pool.leased_connection_count(), 0);
    }

    #[tokio::test]
    async fn queues_third_query_until_a_connection_is_released() {
        let (pool, counters) = create_pool(2);

        let queries = (0..3)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.query("SELECT 1").await.unwrap() })
            })
            .collect::<Vec<_>>();
        settle().await;

        let (finished, pending): (Vec<_>, Vec<_>) =
            queries.into_iter().partition(JoinHandle::is_finished);
        assert_eq!(finished.len(), 2);
        assert_eq!(counters.created(), 2);

        let mut results = Vec::new();
        for query in finished {
            results.push(query.await.unwrap());
        }
        let mut rows: MockResultSet = results.pop().unwrap().into_rows().unwrap();
        while rows.next_row().is_some() {}

        for query in pending {
            assert!(matches!(query.await.unwrap(), QueryResult::Rows(_)));
        }
        assert_eq!(counters.created(), 2);
    }

    #[tokio::test]
    async fn waits_for_connection_to_execute_statement() {
        let (pool, counters) = create_pool(1);

        let statement = pool.prepare("SELECT $1").await.unwrap();
        let mut transaction = pool.begin_transaction(IsolationLevel::default()).await.unwrap();
        assert_eq!(pool.idle_connection_count(), 0);

        let params = [Value::from("Dune")];
        assert!(
            timeout(Duration::from_millis(50), statement.execute(&params))
                .await
                .is_err()
        );

        transaction.commit().await.unwrap();
        let mut rows = statement.execute(&params).await.unwrap().into_rows().unwrap();
        settle().await;
        assert_eq!(pool.leased_connection_count(), 1);

        assert_eq!(rows.next_row(), Some(Value::Text("Dune".to_owned())));
        assert_eq!(rows.next_row(), None);
        settle().await;
        assert_eq!(pool.idle_connection_count(), 1);
        assert_eq!(counters.prepared.load(Ordering::SeqCst), 1);

        statement.close().await.unwrap();
        assert_eq!(counters.deallocated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prepares_statement_again_on_other_connections() {
        let (pool, counters) = create_pool(2);

        let statement = pool.prepare("UPDATE book SET title = $1").await.unwrap();
        assert_eq!(statement.sql(), "UPDATE book SET title = $1");
        let held = pool.acquire().await.unwrap();

        let result = statement.execute(&[Value::from("Dune")]).await.unwrap();
        assert!(result.command().is_some());
        assert_eq!(counters.created(), 2);
        assert_eq!(counters.prepared.load(Ordering::SeqCst), 2);
        assert_eq!(pool.leased_connection_count(), 1);

        drop(held);
        statement.execute(&[Value::from("Emma")]).await.unwrap();
        statement.execute(&[Value::from("Emma")]).await.unwrap();
        assert_eq!(counters.prepared.load(Ordering::SeqCst), 2);

        statement.close().await.unwrap();
        assert_eq!(counters.deallocated.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn releases_connection_when_prepare_fails() {
        let (pool, _) = create_pool(1);

        let statement = pool.prepare("INVALID $1").await;
        assert!(matches!(statement, Err(Error::Query(_))));
        assert_eq!(pool.idle_connection_count(), 1);
    }

    #[tokio::test]
    async fn deallocates_dropped_statement_in_background() {
        let (pool, counters) = create_pool(1);

        let statement = pool.prepare("SELECT 1").await.unwrap();
        drop(statement);
        settle().await;

        assert_eq!(counters.deallocated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_failed_deallocation_of_dropped_statement() {
        recorded_failures();
        let (pool, counters) = create_pool(1);
        counters.fail_deallocation.store(true, Ordering::SeqCst);

        let statement = pool.prepare("SELECT 'abandoned'").await.unwrap();
        drop(statement);

        let failure = wait_for_failure("cannot deallocate SELECT 'abandoned'").await;
        assert_eq!(failure.origin(), "statement deallocation");
        assert_eq!(pool.idle_connection_count(), 1);
    }

    #[tokio::test]
    async fn reports_connect_failure_only_to_creator() {
        let (pool, counters) = create_pool(2);
        counters.refuse_next.store(true, Ordering::SeqCst);

        let results = join_all((0..2).map(|_| pool.acquire())).await;

        assert_eq!(
            results
                .iter()
                .filter(|result| matches!(result, Err(Error::Connect(_))))
                .count(),
            1
        );
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert_eq!(pool.connection_count(), 1);
    }

    #[tokio::test]
    async fn holds_connection_until_transaction_finishes() {
        let (pool, _) = create_pool(2);

        let mut transaction = pool
            .begin_transaction(IsolationLevel::Serializable)
            .await
            .unwrap();
        assert_eq!(transaction.isolation_level(), IsolationLevel::Serializable);

        transaction.savepoint("before").await.unwrap();
        transaction.query("UPDATE book SET title = 'Dune'").await.unwrap();
        transaction.rollback_to("before").await.unwrap();
        settle().await;
        assert_eq!(pool.leased_connection_count(), 1);

        transaction.commit().await.unwrap();
        settle().await;
        assert_eq!(pool.leased_connection_count(), 0);
        assert_eq!(pool.idle_connection_count(), 1);

        assert!(!transaction.is_active());
        assert!(transaction.query("SELECT 1").await.is_err());
        assert!(transaction.rollback().await.is_err());
    }

    #[tokio::test]
    async fn releases_connection_of_dropped_transaction() {
        let (pool, _) = create_pool(2);

        let transaction = pool.begin_transaction(IsolationLevel::default()).await.unwrap();
        settle().await;
        assert_eq!(pool.leased_connection_count(), 1);

        drop(transaction);
        settle().await;
        assert_eq!(pool.leased_connection_count(), 0);
    }

    #[tokio::test]
    async fn shares_one_connection_between_listeners() {
        let (pool, counters) = create_pool(4);

        let mut listeners = join_all(["a", "b", "c"].map(|channel| pool.listen(channel)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect::<Vec<_>>();
        assert_eq!(pool.listener_count(), 3);
        assert_eq!(counters.created(), 1);
        assert_eq!(pool.leased_connection_count(), 1);

        pool.notify("b", "hello").await.unwrap();
        let notification = listeners[1].next().await.unwrap();
        assert_eq!(notification.channel, "b");
        assert_eq!(notification.payload, "hello");

        listeners[0].unlisten().await.unwrap();
        assert!(!listeners[0].is_listening());
        assert!(listeners[0].next().await.is_none());
        settle().await;
        assert_eq!(pool.listener_count(), 2);
        assert_eq!(pool.leased_connection_count(), 1);

        drop(listeners);
        settle().await;
        assert_eq!(pool.listener_count(), 0);
        assert_eq!(pool.leased_connection_count(), 0);
        assert_eq!(pool.idle_connection_count(), pool.connection_count());
    }

    #[tokio::test]
    async fn rolls_back_duplicate_listen() {
        let (pool, _) = create_pool(2);

        let listener = pool.listen("jobs").await.unwrap();
        assert!(matches!(pool.listen("jobs").await, Err(Error::Query(_))));
        assert_eq!(pool.listener_count(), 1);
        assert_eq!(listener.channel(), "jobs");

        drop(listener);
        settle().await;
        assert_eq!(pool.listener_count(), 0);
        assert_eq!(pool.idle_connection_count(), 1);
    }

    #[tokio::test]
    async fn rolls_back_listen_when_listener_connection_cannot_be_opened() {
        let (pool, counters) = create_pool(2);
        counters.refuse_next.store(true, Ordering::SeqCst);

        assert!(matches!(pool.listen("jobs").await, Err(Error::Connect(_))));
        assert_eq!(pool.listener_count(), 0);
        assert_eq!(pool.connection_count(), 0);

        let listener = pool.listen("jobs").await.unwrap();
        assert_eq!(pool.listener_count(), 1);
        assert_eq!(pool.leased_connection_count(), 1);
        drop(listener);
    }

    #[tokio::test]
    async fn counts_listener_while_its_connection_is_opened() {
        let (pool, _) = create_pool(1);
        let held = pool.acquire().await.unwrap();

        let listening = tokio::spawn({
            let pool = pool.clone();
            async move { pool.listen("jobs").await.map(|listener| listener.channel().to_owned()) }
        });
        settle().await;
        assert_eq!(pool.listener_count(), 1);

        drop(held);
        assert_eq!(listening.await.unwrap().unwrap(), "jobs");
        settle().await;
        assert_eq!(pool.listener_count(), 0);
    }

    #[tokio::test]
    async fn unpins_listener_connection_after_failed_first_listen() {
        let (pool, _) = create_pool(2);

        assert!(pool.listen("INVALID").await.is_err());

        assert_eq!(pool.listener_count(), 0);
        assert_eq!(pool.leased_connection_count(), 0);
        assert_eq!(pool.idle_connection_count(), 1);
    }
}
