/// Target database of a ``Postgres`` connection pool
///
/// Every connection the pool opens logs in with the same role and attaches to
/// the same database. Without a database name the server picks the one named
/// after the role.
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub(crate) username: String,
    pub(crate) password: Option<String>,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) dbname: Option<String>,
}

impl PostgresConfig {
    const DEFAULT_USERNAME: &'static str = "postgres";
    const DEFAULT_PASSWORD: Option<String> = None;
    const DEFAULT_HOST: &'static str = "localhost";
    const DEFAULT_PORT: u16 = 5432;
    const DEFAULT_DBNAME: Option<String> = None;

    /// Targets the role's default database on a local server
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new();
    /// ```
    /// # Defaults
    /// - Username: postgres
    /// - Password: {blank}
    /// - Host: localhost
    /// - Port: 5432
    /// - Database: {blank}
    #[must_use]
    pub fn new() -> Self {
        Self {
            username: Self::DEFAULT_USERNAME.to_owned(),
            password: Self::DEFAULT_PASSWORD,
            host: Self::DEFAULT_HOST.to_owned(),
            port: Self::DEFAULT_PORT,
            dbname: Self::DEFAULT_DBNAME,
        }
    }

    /// Reads the target database from environment variables
    ///
    /// Fails only if `POSTGRES_PORT` is set but is not a port number.
    /// # Environment variables
    /// - `POSTGRES_USERNAME`
    /// - `POSTGRES_PASSWORD`
    /// - `POSTGRES_HOST`
    /// - `POSTGRES_PORT`
    /// - `POSTGRES_DATABASE`
    /// # Defaults
    /// - Username: postgres
    /// - Password: {blank}
    /// - Host: localhost
    /// - Port: 5432
    /// - Database: {blank}
    pub fn from_env() -> Result<Self, Error> {
        use std::env;

        let username = env::var("POSTGRES_USERNAME").unwrap_or(Self::DEFAULT_USERNAME.to_owned());
        let password = env::var("POSTGRES_PASSWORD").ok();
        let host = env::var("POSTGRES_HOST").unwrap_or(Self::DEFAULT_HOST.to_owned());
        let port = env::var("POSTGRES_PORT")
            .map_or(Ok(Self::DEFAULT_PORT), |port| port.parse())
            .map_err(Error::InvalidPort)?;
        let dbname = env::var("POSTGRES_DATABASE").ok();

        Ok(Self {
            username,
            password,
            host,
            port,
            dbname,
        })
    }

    /// Role the pooled connections log in as
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().username("app".to_owned());
    /// ```
    #[must_use]
    pub fn username(self, value: String) -> Self {
        Self {
            username: value,
            ..self
        }
    }

    /// Password of the role, if the server asks for one
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().password(Some("postgres".to_owned()));
    /// ```
    #[must_use]
    pub fn password(self, value: Option<String>) -> Self {
        Self {
            password: value,
            ..self
        }
    }

    /// Host name or address of the server
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().host("localhost".to_owned());
    /// ```
    #[must_use]
    pub fn host(self, value: String) -> Self {
        Self {
            host: value,
            ..self
        }
    }

    /// TCP port the server accepts connections on
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().port(5432);
    /// ```
    #[must_use]
    pub fn port(self, value: u16) -> Self {
        Self {
            port: value,
            ..self
        }
    }

    /// Database the pooled connections attach to
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().dbname(Some("app".to_owned()));
    /// ```
    #[must_use]
    pub fn dbname(self, value: Option<String>) -> Self {
        Self {
            dbname: value,
            ..self
        }
    }

    /// URL of the target database, including the password if one is set
    /// # Example
    /// ```
    /// # use db_conn_pool::PostgresConfig;
    /// #
    /// let config = PostgresConfig::new().dbname(Some("app".to_owned()));
    /// assert_eq!(config.connection_url(), "postgres://postgres@localhost:5432/app");
    /// ```
    #[must_use]
    pub fn connection_url(&self) -> String {
        let Self {
            username,
            password,
            host,
            port,
            dbname,
        } = self;
        let credentials = if let Some(password) = password {
            format!("{username}:{password}")
        } else {
            username.clone()
        };
        if let Some(dbname) = dbname {
            format!("postgres://{credentials}@{host}:{port}/{dbname}")
        } else {
            format!("postgres://{credentials}@{host}:{port}")
        }
    }
}

/// ``Postgres`` configuration error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `POSTGRES_PORT` is not a valid port number
    #[error("invalid port: {0}")]
    InvalidPort(std::num::ParseIntError),
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tokio-postgres")]
impl From<PostgresConfig> for tokio_postgres::Config {
    fn from(value: PostgresConfig) -> Self {
        let PostgresConfig {
            username,
            password,
            host,
            port,
            dbname,
        } = value;

        let mut config = Self::new();

        config
            .user(username.as_str())
            .host(host.as_str())
            .port(port);

        if let Some(password) = password {
            config.password(password.as_str());
        }

        if let Some(dbname) = dbname {
            config.dbname(dbname.as_str());
        }

        config
    }
}
