// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use concord_core::{Clock, IdGen, Lifecycle, SystemClock, UuidV7Gen};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{LockError, TryLockError};
use crate::lease::{LockExecutionResult, LockLease};
use crate::provider::LockProvider;

/// Renewal poll period.
pub const RENEWAL_PERIOD: Duration = Duration::from_secs(3);
/// Renew leases expiring within this window of the next poll.
pub const RENEWAL_THRESHOLD: Duration = Duration::from_secs(9);
/// Default lease duration handed to `provider.acquire`.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Acquires leases through a [`LockProvider`], runs a caller-supplied body
/// while holding one, and keeps active leases renewed in the background
/// for as long as the manager is started.
pub struct LockManager {
    provider: Arc<dyn LockProvider>,
    id_gen: Arc<dyn IdGen>,
    clock: Arc<dyn Clock>,
    active: Mutex<HashMap<String, LockLease>>,
    lifecycle: Lifecycle,
    lease_duration: Duration,
    renewal_period: Duration,
    renewal_threshold: Duration,
}

impl LockManager {
    pub fn new(provider: Arc<dyn LockProvider>) -> Arc<Self> {
        Self::with_config(
            provider,
            Arc::new(UuidV7Gen),
            Arc::new(SystemClock),
            DEFAULT_LEASE_DURATION,
            RENEWAL_PERIOD,
            RENEWAL_THRESHOLD,
        )
    }

    pub fn with_config(
        provider: Arc<dyn LockProvider>,
        id_gen: Arc<dyn IdGen>,
        clock: Arc<dyn Clock>,
        lease_duration: Duration,
        renewal_period: Duration,
        renewal_threshold: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            id_gen,
            clock,
            active: Mutex::new(HashMap::new()),
            lifecycle: Lifecycle::new(),
            lease_duration,
            renewal_period,
            renewal_threshold,
        })
    }

    /// Starts the background renewer. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<(), LockError> {
        let manager = Arc::clone(self);
        self.lifecycle
            .start(move || async move {
                tokio::spawn(Self::run_renewal_loop(manager));
                Ok::<(), std::convert::Infallible>(())
            })
            .await
            .map_err(LockError::Lifecycle)
    }

    /// Stops the background renewer. Idempotent. Does not release
    /// currently active leases — in-flight `try_lock` calls clean up
    /// their own lease on return.
    pub async fn stop(self: &Arc<Self>) {
        self.lifecycle
            .stop(|| async { Ok::<(), std::convert::Infallible>(()) })
            .await;
    }

    /// Attempts to acquire `lock_name` and, if successful, runs `body`
    /// while holding it, renewing automatically in the background. The
    /// lease is always released (and deregistered from the renewer) when
    /// `body` returns or errors, regardless of outcome.
    pub async fn try_lock<F, Fut, T, E>(
        &self,
        lock_name: &str,
        body: F,
    ) -> Result<LockExecutionResult<T>, TryLockError<E>>
    where
        F: FnOnce(&LockLease) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let execution_id = self.id_gen.next();

        let lease = self
            .provider
            .acquire(lock_name, &execution_id, self.lease_duration)
            .await
            .map_err(TryLockError::Lock)?;

        let lease = match lease {
            Some(lease) => lease,
            None => return Ok(LockExecutionResult::Contended { execution_id }),
        };

        self.active.lock().insert(execution_id.clone(), lease.clone());
        let body_result = body(&lease).await;
        self.active.lock().remove(&execution_id);

        if let Err(e) = self.provider.release(std::slice::from_ref(&lease)).await {
            warn!(error = %e, lock_name, "failed to release lock lease; it will expire naturally");
        }

        match body_result {
            Ok(value) => Ok(LockExecutionResult::Acquired(value)),
            Err(e) => Err(TryLockError::Body(e)),
        }
    }

    async fn run_renewal_loop(self: Arc<Self>) {
        let period = self.renewal_period;
        let manager = Arc::clone(&self);
        self.lifecycle
            .run_while_up(
                move || {
                    let manager = Arc::clone(&manager);
                    async move { manager.renew_once().await }
                },
                period,
            )
            .await;
    }

    async fn renew_once(&self) -> Result<(), LockError> {
        let snapshot: Vec<LockLease> = self.active.lock().values().cloned().collect();

        let threshold = chrono::Duration::from_std(self.renewal_threshold)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let now = self.clock.now();
        let due: Vec<LockLease> = snapshot
            .into_iter()
            .filter(|lease| lease.expires_at - now <= threshold)
            .collect();

        if due.is_empty() {
            return Ok(());
        }

        let renewed = self.provider.renew(&due, self.lease_duration).await?;

        let renewed_ids: std::collections::HashSet<&str> =
            renewed.iter().map(|l| l.execution_id.as_str()).collect();

        let mut active = self.active.lock();
        for lease in renewed {
            active.insert(lease.execution_id.clone(), lease);
        }
        for lease in &due {
            if !renewed_ids.contains(lease.execution_id.as_str()) {
                active.remove(&lease.execution_id);
            }
        }

        Ok(())
    }
}
