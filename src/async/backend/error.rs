use crate::r#async::object_pool::ConnectionId;

/// Connection pool error
#[derive(Debug, thiserror::Error)]
pub enum Error<C, Q> {
    /// Connection could not be established
    #[error("failed to establish connection: {0}")]
    Connect(C),
    /// Connection was not created by this pool
    #[error("connection {0} is not part of this pool")]
    UnknownConnection(ConnectionId),
    /// Delegated operation failed
    #[error("{0}")]
    Query(Q),
}
