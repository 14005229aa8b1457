use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;

use super::{
    backend::{
        Error,
        r#trait::{Connection, Connector, PreparedStatement},
        types::{QueryResult, Value},
    },
    conn_pool::{ConnectionPool, PoolError, ResultSetOf, StatementOf},
    failure,
    object_pool::ConnectionId,
};

/// Prepared statement returned by [`ConnectionPool::prepare`](super::ConnectionPool::prepare)
///
/// The statement holds no connection. Every execution leases one from the
/// pool and prepares the statement on it the first time that connection is
/// used.
///
/// Server-side handles are deallocated by [`Statement::close`] or, failing
/// that, in the background once the statement is dropped. Failures of
/// background deallocation go to the
/// [unhandled failure handler](super::set_unhandled_failure_handler).
pub struct Statement<C: Connector> {
    pool: ConnectionPool<C>,
    sql: String,
    prepared: Mutex<HashMap<ConnectionId, Arc<StatementOf<C>>>>,
}

impl<C: Connector> Statement<C> {
    pub(crate) fn new(
        pool: ConnectionPool<C>,
        sql: &str,
        connection_id: ConnectionId,
        prepared: StatementOf<C>,
    ) -> Self {
        Self {
            pool,
            sql: sql.to_owned(),
            prepared: Mutex::new(HashMap::from([(connection_id, Arc::new(prepared))])),
        }
    }

    /// SQL text the statement was prepared from
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Executes the statement on a leased connection
    ///
    /// Waits while the pool is exhausted. The connection is released like
    /// [`ConnectionPool::query`](super::ConnectionPool::query).
    pub async fn execute(&self, params: &[Value]) -> Result<QueryResult<ResultSetOf<C>>, PoolError<C>> {
        let connection = self.pool.acquire().await?;
        let id = connection.id();

        let cached = self.prepared.lock().get(&id).cloned();
        let prepared = if let Some(prepared) = cached {
            prepared
        } else {
            let prepared = Arc::new(connection.prepare(&self.sql).await.map_err(Error::Query)?);
            self.prepared.lock().insert(id, prepared.clone());
            prepared
        };

        let result = prepared.execute(params).await;
        ConnectionPool::<C>::release_with(connection, result)
    }

    /// Deallocates the statement on every connection it was prepared on
    ///
    /// Returns the first failure after attempting all of them.
    pub async fn close(self) -> Result<(), PoolError<C>> {
        let mut outcome = Ok(());
        for prepared in self.take_handles() {
            if let Err(error) = prepared.deallocate().await {
                if outcome.is_ok() {
                    outcome = Err(Error::Query(error));
                }
            }
        }
        outcome
    }

    fn take_handles(&self) -> Vec<StatementOf<C>> {
        self.prepared
            .lock()
            .drain()
            .filter_map(|(_, prepared)| Arc::into_inner(prepared))
            .collect()
    }
}

impl<C: Connector> fmt::Debug for Statement<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("prepared_on", &self.prepared.lock().len())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for Statement<C> {
    fn drop(&mut self) {
        for prepared in self.take_handles() {
            failure::spawn_detached("statement deallocation", prepared.deallocate());
        }
    }
}
