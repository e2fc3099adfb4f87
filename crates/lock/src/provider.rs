// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LockError;
use crate::lease::LockLease;

/// Backing store for lock leases. Contention is `Ok(None)`, never an
/// error; only genuine store failures raise [`LockError`].
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Atomically inserts a lease for `lock_name`, or replaces an already
    /// expired one. Returns `None` if an unexpired lease is already held.
    async fn acquire(
        &self,
        lock_name: &str,
        execution_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<LockLease>, LockError>;

    /// Renews the subset of `leases` whose `(lock_name, execution_id)`
    /// still match an unexpired row at the store. Leases that lost the
    /// race (renewed by nobody, or taken over) are simply absent from the
    /// result, not errored.
    async fn renew(
        &self,
        leases: &[LockLease],
        lease_duration: Duration,
    ) -> Result<Vec<LockLease>, LockError>;

    /// Deletes rows matching `(lock_name, execution_id)`. Idempotent:
    /// unknown or already-expired leases are silently ignored.
    async fn release(&self, leases: &[LockLease]) -> Result<(), LockError>;
}

fn expiry_from(now: DateTime<Utc>, lease_duration: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease_duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Reference relational implementation backed by `lock.obj_lock_lease`.
/// `expires_at` is always computed as `now() + lease_duration` inside the
/// database, never from the application's wall clock, so it stays an
/// absolute timestamp on the store's own clock regardless of skew between
/// the process and the database host.
pub struct PgLockProvider {
    pool: sqlx::PgPool,
}

impl PgLockProvider {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockProvider for PgLockProvider {
    async fn acquire(
        &self,
        lock_name: &str,
        execution_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<LockLease>, LockError> {
        let lease_duration_secs = lease_duration.as_secs_f64();

        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            INSERT INTO lock.obj_lock_lease (lock_name, execution_id, expires_at)
            VALUES ($1, $2, now() + ($3 || ' seconds')::interval)
            ON CONFLICT (lock_name) DO UPDATE
              SET execution_id = EXCLUDED.execution_id, expires_at = EXCLUDED.expires_at
              WHERE lock.obj_lock_lease.expires_at <= now()
            RETURNING lock_name, execution_id, expires_at
            "#,
        )
        .bind(lock_name)
        .bind(execution_id)
        .bind(lease_duration_secs)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Provider(e.into()))?;

        Ok(row.map(|(lock_name, execution_id, expires_at)| LockLease {
            lock_name,
            execution_id,
            expires_at,
        }))
    }

    async fn renew(
        &self,
        leases: &[LockLease],
        lease_duration: Duration,
    ) -> Result<Vec<LockLease>, LockError> {
        let partitions =
            concord_rdbms::partition(leases.to_vec(), 100).map_err(LockError::Provider)?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LockError::Provider(e.into()))?;
        let mut renewed = Vec::with_capacity(leases.len());

        let lease_duration_secs = lease_duration.as_secs_f64();

        for chunk in partitions {
            for lease in chunk {
                let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
                    r#"
                    UPDATE lock.obj_lock_lease
                    SET expires_at = now() + ($3 || ' seconds')::interval
                    WHERE lock_name = $1 AND execution_id = $2 AND expires_at > now()
                    RETURNING lock_name, execution_id, expires_at
                    "#,
                )
                .bind(&lease.lock_name)
                .bind(&lease.execution_id)
                .bind(lease_duration_secs)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| LockError::Provider(e.into()))?;

                if let Some((lock_name, execution_id, expires_at)) = row {
                    renewed.push(LockLease {
                        lock_name,
                        execution_id,
                        expires_at,
                    });
                }
            }
        }

        Ok(renewed)
    }

    async fn release(&self, leases: &[LockLease]) -> Result<(), LockError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LockError::Provider(e.into()))?;

        for lease in leases {
            sqlx::query("DELETE FROM lock.obj_lock_lease WHERE lock_name = $1 AND execution_id = $2")
                .bind(&lease.lock_name)
                .bind(&lease.execution_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| LockError::Provider(e.into()))?;
        }

        Ok(())
    }
}

/// In-memory [`LockProvider`] for tests. Matches `PgLockProvider`'s
/// `expires_at = now + ttl` renewal semantics exactly (see DESIGN.md).
#[cfg(any(test, feature = "test-support"))]
pub struct FakeLockProvider {
    clock: std::sync::Arc<dyn concord_core::Clock>,
    rows: parking_lot::Mutex<std::collections::HashMap<String, (String, DateTime<Utc>)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeLockProvider {
    pub fn new(clock: std::sync::Arc<dyn concord_core::Clock>) -> Self {
        Self {
            clock,
            rows: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl LockProvider for FakeLockProvider {
    async fn acquire(
        &self,
        lock_name: &str,
        execution_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<LockLease>, LockError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock();

        let unexpired = rows
            .get(lock_name)
            .map(|(_, expires_at)| *expires_at > now)
            .unwrap_or(false);
        if unexpired {
            return Ok(None);
        }

        let expires_at = expiry_from(now, lease_duration);
        rows.insert(lock_name.to_string(), (execution_id.to_string(), expires_at));
        Ok(Some(LockLease {
            lock_name: lock_name.to_string(),
            execution_id: execution_id.to_string(),
            expires_at,
        }))
    }

    async fn renew(
        &self,
        leases: &[LockLease],
        lease_duration: Duration,
    ) -> Result<Vec<LockLease>, LockError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock();
        let mut renewed = Vec::new();

        for lease in leases {
            let matches = rows
                .get(&lease.lock_name)
                .map(|(execution_id, expires_at)| {
                    *execution_id == lease.execution_id && *expires_at > now
                })
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let expires_at = expiry_from(now, lease_duration);
            rows.insert(
                lease.lock_name.clone(),
                (lease.execution_id.clone(), expires_at),
            );
            renewed.push(LockLease {
                lock_name: lease.lock_name.clone(),
                execution_id: lease.execution_id.clone(),
                expires_at,
            });
        }

        Ok(renewed)
    }

    async fn release(&self, leases: &[LockLease]) -> Result<(), LockError> {
        let mut rows = self.rows.lock();
        for lease in leases {
            let matches = rows
                .get(&lease.lock_name)
                .map(|(execution_id, _)| *execution_id == lease.execution_id)
                .unwrap_or(false);
            if matches {
                rows.remove(&lease.lock_name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::FakeClock;
    use std::sync::Arc;

    fn clock() -> Arc<FakeClock> {
        Arc::new(FakeClock::new(Utc::now()))
    }

    #[tokio::test]
    async fn acquire_succeeds_when_absent_then_blocks_contention() {
        let provider = FakeLockProvider::new(clock());
        let first = provider
            .acquire("payments", "exec-1", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = provider
            .acquire("payments", "exec-2", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn acquire_succeeds_again_once_the_prior_lease_expires() {
        let clock = clock();
        let provider = FakeLockProvider::new(Arc::clone(&clock) as Arc<dyn concord_core::Clock>);
        provider
            .acquire("payments", "exec-1", Duration::from_secs(10))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(11));

        let second = provider
            .acquire("payments", "exec-2", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn renew_only_affects_matching_unexpired_rows() {
        let clock = clock();
        let provider = FakeLockProvider::new(Arc::clone(&clock) as Arc<dyn concord_core::Clock>);
        let lease = provider
            .acquire("payments", "exec-1", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        let stale = LockLease {
            lock_name: "unknown".to_string(),
            execution_id: "exec-404".to_string(),
            expires_at: clock.now(),
        };

        let renewed = provider
            .renew(&[lease.clone(), stale], Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(renewed.len(), 1);
        assert_eq!(renewed[0].execution_id, "exec-1");
        assert!(renewed[0].expires_at > lease.expires_at);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let provider = FakeLockProvider::new(clock());
        let lease = provider
            .acquire("payments", "exec-1", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        provider.release(&[lease.clone()]).await.unwrap();
        provider.release(&[lease]).await.unwrap(); // no-op, must not error
    }
}
