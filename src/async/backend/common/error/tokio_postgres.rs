use std::ops::Deref;

use tokio_postgres::Error;

/// Failure to establish a ``tokio-postgres`` connection
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ConnectionError(#[from] Error);

impl Deref for ConnectionError {
    type Target = Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Failure of an operation on a ``tokio-postgres`` connection
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Error reported by the driver or the server
    #[error(transparent)]
    Postgres(#[from] Error),
    /// Channel is already listened on through this connection
    #[error("already listening on channel {0}")]
    AlreadyListening(String),
    /// Listener was already unsubscribed
    #[error("not listening on channel {0}")]
    NotListening(String),
    /// Transaction was already committed or rolled back
    #[error("transaction is no longer active")]
    TransactionInactive,
    /// Connection to the server was closed
    #[error("connection is closed")]
    ConnectionClosed,
}
