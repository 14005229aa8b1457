use std::fmt::{Debug, Display};

use async_trait::async_trait;

use super::{
    super::completion::Completion,
    types::{CommandResult, IsolationLevel, Notification, QueryResult, Value},
};

/// Factory for physical connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced
    type Connection: Connection;
    /// Connection establishment error
    type Error: Debug + Display + Send + Sync + 'static;

    /// Establishes a new connection
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;
}

/// Physical link to the database
///
/// Operations take `&self`; the connection serializes its own requests.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Streamed rows returned by queries
    type ResultSet: Operation + Send + 'static;
    /// Server-side prepared statement
    type Statement: PreparedStatement<ResultSet = Self::ResultSet, Error = Self::Error>;
    /// Notification subscription
    type Listener: Listener<Error = Self::Error>;
    /// Open transaction
    type Transaction: Transaction<ResultSet = Self::ResultSet, Error = Self::Error>;
    /// Operation error
    type Error: Debug + Display + Send + Sync + 'static;

    /// Runs a statement without parameters
    async fn query(&self, sql: &str) -> Result<QueryResult<Self::ResultSet>, Self::Error>;

    /// Runs a statement with parameters
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<Self::ResultSet>, Self::Error>;

    /// Prepares a statement on the server
    async fn prepare(&self, sql: &str) -> Result<Self::Statement, Self::Error>;

    /// Sends a notification on a channel
    async fn notify(&self, channel: &str, payload: &str) -> Result<CommandResult, Self::Error>;

    /// Subscribes to a channel, failing if this connection already listens on it
    async fn listen(&self, channel: &str) -> Result<Self::Listener, Self::Error>;

    /// Opens a transaction
    async fn begin_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Self::Transaction, Self::Error>;
}

/// Long-lived handle that signals when it is finished
pub trait Operation {
    /// Signal fired once the operation is fully finished
    fn completion(&self) -> Completion;
}

/// Server-side prepared statement bound to the connection that prepared it
#[async_trait]
pub trait PreparedStatement: Sized + Send + Sync + 'static {
    /// Streamed rows returned by executions
    type ResultSet: Operation + Send + 'static;
    /// Execution error
    type Error: Debug + Display + Send + Sync + 'static;

    /// SQL text the statement was prepared from
    fn sql(&self) -> &str;

    /// Executes the statement
    async fn execute(&self, params: &[Value]) -> Result<QueryResult<Self::ResultSet>, Self::Error>;

    /// Deallocates the statement on the server
    async fn deallocate(self) -> Result<(), Self::Error>;
}

/// Subscription to a notification channel
///
/// Completes once unsubscribed, either through [`Listener::unlisten`] or by
/// being dropped.
#[async_trait]
pub trait Listener: Operation + Send + 'static {
    /// Unsubscription error
    type Error: Debug + Display + Send + Sync + 'static;

    /// Channel listened on
    fn channel(&self) -> &str;

    /// Whether the subscription is still active
    fn is_listening(&self) -> bool;

    /// Waits for the next notification, or [`None`] once unsubscribed
    async fn next(&mut self) -> Option<Notification>;

    /// Unsubscribes from the channel
    async fn unlisten(&mut self) -> Result<(), Self::Error>;
}

/// Open transaction
///
/// Completes once committed, rolled back, or dropped.
#[async_trait]
pub trait Transaction: Operation + Send + Sync + 'static {
    /// Streamed rows returned by queries
    type ResultSet: Operation + Send + 'static;
    /// Operation error
    type Error: Debug + Display + Send + Sync + 'static;

    /// Isolation level the transaction was opened with
    fn isolation_level(&self) -> IsolationLevel;

    /// Whether the transaction is neither committed nor rolled back
    fn is_active(&self) -> bool;

    /// Runs a statement without parameters inside the transaction
    async fn query(&self, sql: &str) -> Result<QueryResult<Self::ResultSet>, Self::Error>;

    /// Runs a statement with parameters inside the transaction
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<Self::ResultSet>, Self::Error>;

    /// Commits the transaction
    async fn commit(&mut self) -> Result<(), Self::Error>;

    /// Rolls the transaction back
    async fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Creates a savepoint
    async fn savepoint(&self, name: &str) -> Result<(), Self::Error>;

    /// Rolls back to a savepoint
    async fn rollback_to(&self, name: &str) -> Result<(), Self::Error>;

    /// Releases a savepoint
    async fn release_savepoint(&self, name: &str) -> Result<(), Self::Error>;
}
