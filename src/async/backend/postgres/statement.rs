use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio_postgres::Client;

use super::{
    super::{
        common::error::tokio_postgres::QueryError,
        r#trait::PreparedStatement,
        types::{QueryResult, Value},
    },
    connection::run_prepared,
    result_set::PgResultSet,
};

/// Statement prepared on a ``tokio-postgres`` connection
///
/// Executes on the connection that prepared it.
pub struct PgStatement {
    client: Arc<Client>,
    statement: tokio_postgres::Statement,
    sql: String,
}

impl PgStatement {
    pub(super) fn new(client: Arc<Client>, statement: tokio_postgres::Statement, sql: &str) -> Self {
        Self {
            client,
            statement,
            sql: sql.to_owned(),
        }
    }
}

impl fmt::Debug for PgStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStatement")
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PreparedStatement for PgStatement {
    type ResultSet = PgResultSet;
    type Error = QueryError;

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn execute(&self, params: &[Value]) -> Result<QueryResult<PgResultSet>, QueryError> {
        run_prepared(&self.client, &self.statement, params).await
    }

    async fn deallocate(self) -> Result<(), QueryError> {
        if self.client.is_closed() {
            return Err(QueryError::ConnectionClosed);
        }
        // the driver closes the statement once its last handle is dropped
        drop(self.statement);
        Ok(())
    }
}
