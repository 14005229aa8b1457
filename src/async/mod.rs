mod backend;
mod builder;
mod completion;
mod conn_pool;
mod failure;
mod object_pool;
mod statement;

pub use backend::*;
pub use builder::ConnectionPoolBuilder as ConnectionPoolBuilderTrait;
pub use completion::{Completer, Completion, completion};
pub use conn_pool::{ConnectionPool, PoolError, PooledConnection};
pub use failure::{UnhandledFailure, clear_unhandled_failure_handler, set_unhandled_failure_handler};
pub use object_pool::{ConnectionId, Reusable};
pub use statement::Statement;
