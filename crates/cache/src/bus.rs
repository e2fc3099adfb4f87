// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CacheError;
use crate::event::EvictionEvent;

/// Append-only eviction log shared across nodes. `now()` is the bus's own
/// clock; callers must seed their replay cursor from it, never from a
/// local clock, or they risk skipping events recorded between their local
/// "now" and the bus actually persisting them.
#[async_trait]
pub trait CacheBus: Send + Sync {
    async fn publish_eviction(&self, events: Vec<EvictionEvent>) -> Result<(), CacheError>;

    /// Events strictly after `since` for any of `cache_names`, ascending by
    /// `recorded_at`. Ties at equal timestamps are ordered deterministically
    /// per call but not meaningfully across calls.
    async fn poll_events(
        &self,
        cache_names: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<EvictionEvent>, CacheError>;

    async fn now(&self) -> Result<DateTime<Utc>, CacheError>;
}

/// Reference relational implementation backed by
/// `cache_inv_bus.obj_evict_event`.
pub struct PgCacheBus {
    pool: sqlx::PgPool,
}

impl PgCacheBus {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBus for PgCacheBus {
    async fn publish_eviction(&self, events: Vec<EvictionEvent>) -> Result<(), CacheError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut query_builder =
            sqlx::QueryBuilder::new("INSERT INTO cache_inv_bus.obj_evict_event (cache_name, cache_key) ");
        query_builder.push_values(events, |mut row, event| {
            row.push_bind(event.cache_name).push_bind(event.key);
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::Bus(Box::new(e)))?;

        Ok(())
    }

    async fn poll_events(
        &self,
        cache_names: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<EvictionEvent>, CacheError> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT cache_name, cache_key, recorded_at
            FROM cache_inv_bus.obj_evict_event
            WHERE cache_name = ANY($1) AND recorded_at > $2
            ORDER BY recorded_at
            "#,
        )
        .bind(cache_names)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CacheError::Bus(Box::new(e)))?;

        Ok(rows
            .into_iter()
            .map(|(cache_name, key, recorded_at)| EvictionEvent { cache_name, key, recorded_at })
            .collect())
    }

    async fn now(&self) -> Result<DateTime<Utc>, CacheError> {
        let (now,): (DateTime<Utc>,) = sqlx::query_as("SELECT now()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CacheError::Bus(Box::new(e)))?;
        Ok(now)
    }
}

/// In-memory [`CacheBus`] for tests, driven by an injected
/// [`concord_core::Clock`] so event ordering and poll-cursor behavior can
/// be made deterministic.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeCacheBus {
    clock: std::sync::Arc<dyn concord_core::Clock>,
    events: parking_lot::Mutex<Vec<EvictionEvent>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeCacheBus {
    pub fn new(clock: std::sync::Arc<dyn concord_core::Clock>) -> Self {
        Self { clock, events: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl CacheBus for FakeCacheBus {
    async fn publish_eviction(&self, events: Vec<EvictionEvent>) -> Result<(), CacheError> {
        self.events.lock().extend(events);
        Ok(())
    }

    async fn poll_events(
        &self,
        cache_names: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<EvictionEvent>, CacheError> {
        let mut matching: Vec<EvictionEvent> = self
            .events
            .lock()
            .iter()
            .filter(|e| cache_names.iter().any(|n| n == &e.cache_name) && e.recorded_at > since)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.recorded_at);
        Ok(matching)
    }

    async fn now(&self) -> Result<DateTime<Utc>, CacheError> {
        Ok(self.clock.now())
    }
}
