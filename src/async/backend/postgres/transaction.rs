use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio_postgres::Client;

use crate::common::statement::postgres;

use super::{
    super::{
        super::{
            completion::{Completer, Completion, completion},
            failure,
        },
        common::error::tokio_postgres::QueryError,
        r#trait::{Operation, Transaction},
        types::{IsolationLevel, QueryResult, Value},
    },
    connection::run,
    result_set::PgResultSet,
};

/// Transaction open on a ``tokio-postgres`` connection
///
/// Dropping an active transaction rolls it back in the background, on the
/// runtime the transaction was begun on. The connection is released only
/// after the rollback has run.
pub struct PgTransaction {
    client: Arc<Client>,
    runtime: Handle,
    isolation: IsolationLevel,
    completer: Option<Completer>,
    completion: Completion,
}

impl PgTransaction {
    pub(super) fn new(client: Arc<Client>, isolation: IsolationLevel) -> Self {
        let (completer, completion) = completion();
        Self {
            client,
            runtime: Handle::current(),
            isolation,
            completer: Some(completer),
            completion,
        }
    }

    fn ensure_active(&self) -> Result<(), QueryError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(QueryError::TransactionInactive)
        }
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), QueryError> {
        self.ensure_active()?;
        self.client.batch_execute(sql).await.map_err(Into::into)
    }

    async fn finish(&mut self, sql: &str) -> Result<(), QueryError> {
        let completer = self.completer.take().ok_or(QueryError::TransactionInactive)?;
        let result = self.client.batch_execute(sql).await;
        completer.complete();
        result.map_err(Into::into)
    }
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction")
            .field("isolation", &self.isolation)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Operation for PgTransaction {
    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    type ResultSet = PgResultSet;
    type Error = QueryError;

    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn is_active(&self) -> bool {
        self.completer.is_some()
    }

    async fn query(&self, sql: &str) -> Result<QueryResult<PgResultSet>, QueryError> {
        self.ensure_active()?;
        run(&self.client, sql, &[]).await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult<PgResultSet>, QueryError> {
        self.ensure_active()?;
        run(&self.client, sql, params).await
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        self.finish(postgres::COMMIT).await
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        self.finish(postgres::ROLLBACK).await
    }

    async fn savepoint(&self, name: &str) -> Result<(), QueryError> {
        self.batch_execute(&postgres::savepoint(name)).await
    }

    async fn rollback_to(&self, name: &str) -> Result<(), QueryError> {
        self.batch_execute(&postgres::rollback_to_savepoint(name))
            .await
    }

    async fn release_savepoint(&self, name: &str) -> Result<(), QueryError> {
        self.batch_execute(&postgres::release_savepoint(name)).await
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(completer) = self.completer.take() else {
            return;
        };

        let client = self.client.clone();
        failure::complete_after(&self.runtime, "transaction rollback", completer, async move {
            client
                .batch_execute(postgres::ROLLBACK)
                .await
                .map_err(QueryError::from)
        });
    }
}
