#[cfg(feature = "tokio-postgres")]
mod common;
mod error;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "tokio-postgres")]
mod postgres;
pub(crate) mod r#trait;
pub(crate) mod types;

#[cfg(feature = "tokio-postgres")]
pub use common::error::tokio_postgres::{ConnectionError, QueryError};
pub use error::Error;
#[cfg(feature = "tokio-postgres")]
pub use postgres::{
    PgListener, PgResultSet, PgStatement, PgTransaction, TokioPostgresConnection,
    TokioPostgresConnector,
};
pub use r#trait::{Connection, Connector, Listener, Operation, PreparedStatement, Transaction};
pub use types::{CommandResult, IsolationLevel, Notification, QueryResult, Value};
