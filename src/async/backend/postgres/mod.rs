mod connection;
mod listener;
mod result_set;
mod statement;
mod transaction;
mod value;

pub use connection::{TokioPostgresConnection, TokioPostgresConnector};
pub use listener::PgListener;
pub use result_set::PgResultSet;
pub use statement::PgStatement;
pub use transaction::PgTransaction;
