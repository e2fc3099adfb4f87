// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction scoping, batched DML, and `IN(...)` query partitioning over
//! a Postgres connection pool.

use std::future::Future;

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Connection, PgConnection, PgPool};

use crate::error::RdbmsError;
use crate::partition::partition;

/// Acquires a connection, opens a transaction, and runs `f` inside it.
/// Commits on success; rolls back and wraps the error on failure.
pub async fn execute_and_return<F, Fut, T>(pool: &PgPool, f: F) -> Result<T, RdbmsError>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut conn = pool.acquire().await.map_err(RdbmsError::Query)?;
    let mut tx = conn.begin().await.map_err(RdbmsError::Query)?;

    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(RdbmsError::Query)?;
            Ok(value)
        }
        Err(e) => {
            // Best-effort: the connection may already be unusable after the
            // original failure, in which case the rollback itself errors
            // and is dropped in favor of the original cause.
            let _ = tx.rollback().await;
            Err(RdbmsError::Query(e))
        }
    }
}

/// The per-parameter result of a batched DML execution: either the number
/// of rows the statement affected, or `Rejected` if `bind` refused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied(u64),
    Rejected,
}

/// Executes `sql` once per accepted element of `params`, flushing every
/// `batch_size` accepted elements. `bind` receives a fresh [`PgArguments`]
/// per parameter and returns `None` to reject it (recorded as
/// [`BatchOutcome::Rejected`] without touching the database). The returned
/// `Vec` has the same length and order as `params`.
pub async fn execute_batch<P>(
    conn: &mut PgConnection,
    sql: &str,
    batch_size: usize,
    params: &[P],
    bind: impl Fn(PgArguments, &P) -> Option<PgArguments>,
) -> Result<Vec<BatchOutcome>, RdbmsError> {
    let mut results: Vec<Option<BatchOutcome>> = vec![None; params.len()];
    let mut pending: Vec<(usize, PgArguments)> = Vec::with_capacity(batch_size.max(1));

    for (idx, p) in params.iter().enumerate() {
        match bind(PgArguments::default(), p) {
            Some(args) => pending.push((idx, args)),
            None => results[idx] = Some(BatchOutcome::Rejected),
        }
        if pending.len() == batch_size {
            flush_pending(conn, sql, &mut pending, &mut results).await?;
        }
    }
    if !pending.is_empty() {
        flush_pending(conn, sql, &mut pending, &mut results).await?;
    }

    Ok(results
        .into_iter()
        .map(|r| r.expect("every parameter is either bound or rejected"))
        .collect())
}

async fn flush_pending(
    conn: &mut PgConnection,
    sql: &str,
    pending: &mut Vec<(usize, PgArguments)>,
    results: &mut [Option<BatchOutcome>],
) -> Result<(), RdbmsError> {
    for (idx, args) in pending.drain(..) {
        let outcome = sqlx::query_with(sql, args)
            .execute(&mut *conn)
            .await
            .map_err(RdbmsError::Query)?;
        results[idx] = Some(BatchOutcome::Applied(outcome.rows_affected()));
    }
    Ok(())
}

/// Partitions `items` into sublists of at most `max_size`, and for each
/// sublist calls `sql_supplier(chunk_len)` to build a parameterized
/// `IN($1, $2, ...)` statement of matching arity, `binder` to bind the
/// chunk's values, and `row_mapper` to decode each returned row. Results
/// from every partition are concatenated in partition order.
pub async fn execute_query_with_in_clause<T, P>(
    conn: &mut PgConnection,
    max_size: usize,
    items: Vec<P>,
    sql_supplier: impl Fn(usize) -> String,
    binder: impl Fn(PgArguments, &[P]) -> PgArguments,
    row_mapper: impl Fn(PgRow) -> Result<T, sqlx::Error>,
) -> Result<Vec<T>, RdbmsError> {
    let chunks = partition(items, max_size)?;
    let mut out = Vec::new();

    for chunk in chunks {
        let sql = sql_supplier(chunk.len());
        let args = binder(PgArguments::default(), &chunk);
        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&mut *conn)
            .await
            .map_err(RdbmsError::Query)?;
        for row in rows {
            out.push(row_mapper(row).map_err(RdbmsError::Query)?);
        }
    }

    Ok(out)
}
