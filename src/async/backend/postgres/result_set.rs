use std::{fmt, pin::Pin};

use futures::StreamExt;
use tokio_postgres::{Row, RowStream};

use super::super::{
    super::completion::{Completer, Completion, completion},
    common::error::tokio_postgres::QueryError,
    r#trait::Operation,
};

/// Rows streamed from the server
///
/// Completes once the stream is exhausted, fails, or is dropped.
pub struct PgResultSet {
    rows: Pin<Box<RowStream>>,
    completer: Option<Completer>,
    completion: Completion,
}

impl PgResultSet {
    pub(super) fn new(rows: RowStream) -> Self {
        let (completer, completion) = completion();
        Self {
            rows: Box::pin(rows),
            completer: Some(completer),
            completion,
        }
    }

    /// Receives the next row, or [`None`] once the stream is finished
    pub async fn next_row(&mut self) -> Option<Result<Row, QueryError>> {
        self.completer.as_ref()?;

        match self.rows.next().await {
            Some(Ok(row)) => Some(Ok(row)),
            Some(Err(error)) => {
                self.finish();
                Some(Err(error.into()))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    /// Receives all remaining rows
    pub async fn collect(mut self) -> Result<Vec<Row>, QueryError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Number of rows affected, known once the stream is finished
    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows.rows_affected()
    }

    fn finish(&mut self) {
        if let Some(completer) = self.completer.take() {
            completer.complete();
        }
    }
}

impl Operation for PgResultSet {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

impl fmt::Debug for PgResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgResultSet")
            .field("finished", &self.completer.is_none())
            .finish_non_exhaustive()
    }
}
