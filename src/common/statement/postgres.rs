use crate::{r#async::IsolationLevel, util::quote_identifier};

pub const COMMIT: &str = "COMMIT";

pub const ROLLBACK: &str = "ROLLBACK";

pub const NOTIFY: &str = "SELECT pg_notify($1, $2)";

pub fn begin_transaction(isolation: IsolationLevel) -> String {
    let level = match isolation {
        IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        IsolationLevel::ReadCommitted => "READ COMMITTED",
        IsolationLevel::RepeatableRead => "REPEATABLE READ",
        IsolationLevel::Serializable => "SERIALIZABLE",
    };
    format!("BEGIN ISOLATION LEVEL {level}")
}

pub fn savepoint(name: &str) -> String {
    format!("SAVEPOINT {}", quote_identifier(name))
}

pub fn rollback_to_savepoint(name: &str) -> String {
    format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name))
}

pub fn release_savepoint(name: &str) -> String {
    format!("RELEASE SAVEPOINT {}", quote_identifier(name))
}

pub fn listen(channel: &str) -> String {
    format!("LISTEN {}", quote_identifier(channel))
}

pub fn unlisten(channel: &str) -> String {
    format!("UNLISTEN {}", quote_identifier(channel))
}
