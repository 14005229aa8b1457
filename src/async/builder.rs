use crate::common::config::PoolConfig;

use super::{backend::r#trait::Connector, conn_pool::ConnectionPool};

/// Connection pool builder trait implemented for all connectors
pub trait ConnectionPoolBuilder: Connector + Sized {
    /// Creates a connection pool opening connections through this connector
    fn create_connection_pool(self, config: &PoolConfig) -> ConnectionPool<Self> {
        ConnectionPool::new(self, config)
    }
}

impl<C> ConnectionPoolBuilder for C where C: Connector {}
