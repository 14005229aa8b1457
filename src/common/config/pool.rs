use std::num::ParseIntError;

/// Connection pool configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub(crate) max_connections: usize,
}

impl PoolConfig {
    /// Maximum number of connections used when none is configured
    pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

    /// Creates a new pool configuration with defaults
    /// # Example
    /// ```
    /// # use db_conn_pool::PoolConfig;
    /// #
    /// let config = PoolConfig::new();
    /// assert_eq!(config.get_max_connections(), PoolConfig::DEFAULT_MAX_CONNECTIONS);
    /// ```
    /// # Defaults
    /// - Max connections: 100
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Creates a new pool configuration from environment variables
    /// # Environment variables
    /// - `POOL_MAX_CONNECTIONS`
    /// # Defaults
    /// - Max connections: 100
    pub fn from_env() -> Result<Self, Error> {
        use std::env;

        let max_connections = env::var("POOL_MAX_CONNECTIONS").ok();
        Self::parse(max_connections.as_deref())
    }

    fn parse(max_connections: Option<&str>) -> Result<Self, Error> {
        let max_connections = max_connections
            .map_or(Ok(Self::DEFAULT_MAX_CONNECTIONS), str::parse)
            .map_err(Error::InvalidMaxConnections)?;

        if max_connections == 0 {
            return Err(Error::ZeroMaxConnections);
        }

        Ok(Self { max_connections })
    }

    /// Sets a new maximum number of connections, raising values below one to one
    /// # Example
    /// ```
    /// # use db_conn_pool::PoolConfig;
    /// #
    /// let config = PoolConfig::new().max_connections(10);
    /// assert_eq!(config.get_max_connections(), 10);
    /// ```
    #[must_use]
    pub fn max_connections(self, value: usize) -> Self {
        Self {
            max_connections: value.max(1),
        }
    }

    /// Maximum number of connections the pool may open
    #[must_use]
    pub fn get_max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool configuration error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `POOL_MAX_CONNECTIONS` is not a number
    #[error("invalid maximum connection count: {0}")]
    InvalidMaxConnections(ParseIntError),
    /// `POOL_MAX_CONNECTIONS` is zero
    #[error("maximum connection count must be at least one")]
    ZeroMaxConnections,
}
