pub(crate) mod pool;
pub(crate) mod postgres;

pub use pool::{Error as PoolConfigError, PoolConfig};
pub use postgres::{Error as PostgresConfigError, PostgresConfig};
