/// Owned query parameter
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL `NULL`
    Null,
    /// Boolean
    Bool(bool),
    /// Integer, narrowed to the parameter type by the backend
    Int(i64),
    /// Floating point number, narrowed to the parameter type by the backend
    Float(f64),
    /// Text
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Self::Int(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Acknowledgement of a statement that returns no rows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandResult {
    affected_rows: u64,
}

impl CommandResult {
    /// Creates a new command result
    #[must_use]
    pub fn new(affected_rows: u64) -> Self {
        Self { affected_rows }
    }

    /// Number of rows inserted, updated or deleted
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }
}

/// Outcome of a query
#[derive(Debug)]
pub enum QueryResult<R> {
    /// Statement returned no rows
    Command(CommandResult),
    /// Statement returns rows, streamed through a long-lived result set
    Rows(R),
}

impl<R> QueryResult<R> {
    /// Command result, if the statement returned no rows
    pub fn command(&self) -> Option<&CommandResult> {
        match self {
            Self::Command(result) => Some(result),
            Self::Rows(_) => None,
        }
    }

    /// Result set, if the statement returns rows
    pub fn into_rows(self) -> Option<R> {
        match self {
            Self::Command(_) => None,
            Self::Rows(rows) => Some(rows),
        }
    }
}

/// Notification received on a listened channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Channel the notification was sent on
    pub channel: String,
    /// Process ID of the notifying server session
    pub process_id: i32,
    /// Payload
    pub payload: String,
}

/// Transaction isolation level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Dirty reads are allowed
    ReadUncommitted,
    /// Each statement sees data committed before it began
    #[default]
    ReadCommitted,
    /// Each statement sees data committed before the transaction began
    RepeatableRead,
    /// Transactions behave as if run one after another
    Serializable,
}
