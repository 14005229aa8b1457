use std::{collections::HashMap, fmt, pin::pin, sync::Arc};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, Client, Config, NoTls, types::ToSql};

use crate::common::{config::PostgresConfig, statement::postgres};

use super::{
    super::{
        common::error::tokio_postgres::{ConnectionError, QueryError},
        r#trait::{Connection, Connector},
        types::{CommandResult, IsolationLevel, Notification, QueryResult, Value},
    },
    listener::PgListener,
    result_set::PgResultSet,
    statement::PgStatement,
    transaction::PgTransaction,
};

/// Notification senders of a connection, keyed by channel
pub(super) type Subscribers = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Notification>>>>;

fn params(values: &[Value]) -> impl ExactSizeIterator<Item = &(dyn ToSql + Sync)> {
    values.iter().map(|value| value as &(dyn ToSql + Sync))
}

pub(super) async fn run(
    client: &Client,
    sql: &str,
    values: &[Value],
) -> Result<QueryResult<PgResultSet>, QueryError> {
    let statement = client.prepare(sql).await?;
    run_prepared(client, &statement, values).await
}

pub(super) async fn run_prepared(
    client: &Client,
    statement: &tokio_postgres::Statement,
    values: &[Value],
) -> Result<QueryResult<PgResultSet>, QueryError> {
    if statement.columns().is_empty() {
        let affected = client.execute_raw(statement, params(values)).await?;
        Ok(QueryResult::Command(CommandResult::new(affected)))
    } else {
        let rows = client.query_raw(statement, params(values)).await?;
        Ok(QueryResult::Rows(PgResultSet::new(rows)))
    }
}

fn route(subscribers: &Subscribers, notification: &tokio_postgres::Notification) {
    let mut subscribers = subscribers.lock();
    let Some(sender) = subscribers.get(notification.channel()) else {
        return;
    };

    let delivered = sender.send(Notification {
        channel: notification.channel().to_owned(),
        process_id: notification.process_id(),
        payload: notification.payload().to_owned(),
    });
    if delivered.is_err() {
        subscribers.remove(notification.channel());
    }
}

/// ``tokio-postgres`` connection factory
///
/// # Example
/// ```
/// use db_conn_pool::{PoolConfig, PostgresConfig, r#async::{ConnectionPool, TokioPostgresConnector}};
/// use dotenvy::dotenv;
///
/// async fn f() {
///     dotenv().ok();
///
///     let config = PostgresConfig::from_env().unwrap();
///     let pool = ConnectionPool::new(TokioPostgresConnector::new(config), &PoolConfig::new());
///
///     pool.execute("CREATE TABLE IF NOT EXISTS book(id SERIAL PRIMARY KEY, title TEXT NOT NULL)", &[])
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Clone, Debug)]
pub struct TokioPostgresConnector {
    config: Config,
}

impl TokioPostgresConnector {
    /// Creates a new ``tokio-postgres`` connector
    #[must_use]
    pub fn new(config: impl Into<Config>) -> Self {
        Self {
            config: config.into(),
        }
    }
}

impl From<PostgresConfig> for TokioPostgresConnector {
    fn from(value: PostgresConfig) -> Self {
        Self::new(value)
    }
}

#[async_trait]
impl Connector for TokioPostgresConnector {
    type Connection = TokioPostgresConnection;
    type Error = ConnectionError;

    async fn connect(&self) -> Result<TokioPostgresConnection, ConnectionError> {
        let (client, mut connection) = self.config.connect(NoTls).await?;

        let subscribers = Subscribers::default();
        let routes = subscribers.clone();
        tokio::spawn(async move {
            let mut messages = pin!(stream::poll_fn(move |cx| connection.poll_message(cx)));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        route(&routes, &notification);
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        tracing::info!(%notice, "server notice");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::error!(%error, "connection driver terminated");
                        break;
                    }
                }
            }
        });

        Ok(TokioPostgresConnection {
            client: Arc::new(client),
            subscribers,
        })
    }
}

/// ``tokio-postgres`` connection
pub struct TokioPostgresConnection {
    client: Arc<Client>,
    subscribers: Subscribers,
}

impl TokioPostgresConnection {
    /// Underlying client
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl fmt::Debug for TokioPostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioPostgresConnection")
            .field("closed", &self.client.is_closed())
            .field("channels", &self.subscribers.lock().len())
            .finish()
    }
}

#[async_trait]
impl Connection for TokioPostgresConnection {
    type ResultSet = PgResultSet;
    type Statement = PgStatement;
    type Listener = PgListener;
    type Transaction = PgTransaction;
    type Error = QueryError;

    async fn query(&self, sql: &str) -> Result<QueryResult<PgResultSet>, QueryError> {
        run(&self.client, sql, &[]).await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<PgResultSet>, QueryError> {
        run(&self.client, sql, params).await
    }

    async fn prepare(&self, sql: &str) -> Result<PgStatement, QueryError> {
        let statement = self.client.prepare(sql).await?;
        Ok(PgStatement::new(self.client.clone(), statement, sql))
    }

    async fn notify(&self, channel: &str, payload: &str) -> Result<CommandResult, QueryError> {
        self.client
            .execute(postgres::NOTIFY, &[&channel, &payload])
            .await
            .map(CommandResult::new)
            .map_err(Into::into)
    }

    async fn listen(&self, channel: &str) -> Result<PgListener, QueryError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut subscribers = self.subscribers.lock();
            if subscribers.contains_key(channel) {
                return Err(QueryError::AlreadyListening(channel.to_owned()));
            }
            subscribers.insert(channel.to_owned(), sender);
        }

        if let Err(error) = self.client.batch_execute(&postgres::listen(channel)).await {
            self.subscribers.lock().remove(channel);
            return Err(error.into());
        }

        Ok(PgListener::new(
            self.client.clone(),
            self.subscribers.clone(),
            channel,
            receiver,
        ))
    }

    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<PgTransaction, QueryError> {
        self.client
            .batch_execute(&postgres::begin_transaction(isolation))
            .await?;
        Ok(PgTransaction::new(self.client.clone(), isolation))
    }
}
