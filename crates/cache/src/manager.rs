// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use concord_core::{Clock, Codec, Lifecycle, TypeTag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::bus::CacheBus;
use crate::error::CacheError;
use crate::event::EvictionEvent;
use crate::local::{Cache, DynCache, LocalCache};

/// Background loop period for both the publish and poll loops.
pub const LOOP_PERIOD: Duration = Duration::from_secs(2);

/// Owns a registry of named local caches and, when a [`CacheBus`] is
/// configured, two background loops that publish local evictions and apply
/// remote ones. Caches with no bus configured just never propagate.
pub struct CacheManager {
    clock: Arc<dyn Clock>,
    bus: Option<Arc<dyn CacheBus>>,
    caches: Mutex<HashMap<String, Arc<dyn DynCache>>>,
    outbound: Arc<Mutex<VecDeque<(String, String)>>>,
    last_poll_at: Mutex<DateTime<Utc>>,
    lifecycle: Lifecycle,
}

impl CacheManager {
    /// Creates a manager with no bus configured; caches registered on it
    /// work locally but never propagate evictions.
    pub fn new_local_only(clock: Arc<dyn Clock>) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            clock,
            bus: None,
            caches: Mutex::new(HashMap::new()),
            outbound: Arc::new(Mutex::new(VecDeque::new())),
            last_poll_at: Mutex::new(now),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Creates a manager backed by `bus`. `last_poll_at` is seeded from the
    /// bus's own clock, per its authoritative-clock contract.
    pub async fn new(clock: Arc<dyn Clock>, bus: Arc<dyn CacheBus>) -> Result<Arc<Self>, CacheError> {
        let last_poll_at = bus.now().await?;
        Ok(Arc::new(Self {
            clock,
            bus: Some(bus),
            caches: Mutex::new(HashMap::new()),
            outbound: Arc::new(Mutex::new(VecDeque::new())),
            last_poll_at: Mutex::new(last_poll_at),
            lifecycle: Lifecycle::new(),
        }))
    }

    /// Registers a new named local cache. Fails if the name is already
    /// taken.
    pub fn register<K, V, C>(
        &self,
        name: impl Into<String>,
        key_type_tag: TypeTag,
        ttl: Duration,
        max_size: usize,
        codec: C,
    ) -> Result<Arc<LocalCache<K, V, C>>, CacheError>
    where
        K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        C: Codec + Send + Sync + 'static,
    {
        let name = name.into();
        let mut caches = self.caches.lock();
        if caches.contains_key(&name) {
            return Err(CacheError::InvalidConfig(format!("cache '{name}' is already registered")));
        }

        let cache = LocalCache::new(
            name.clone(),
            key_type_tag,
            ttl,
            max_size,
            codec,
            Arc::clone(&self.clock),
            Arc::clone(&self.outbound),
        )?;
        caches.insert(name, Arc::clone(&cache) as Arc<dyn DynCache>);
        Ok(cache)
    }

    /// Starts the publish and poll loops. A no-op (but still transitions
    /// to `Up`) if no bus is configured. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<(), CacheError> {
        let has_bus = self.bus.is_some();
        let publish_mgr = Arc::clone(self);
        let poll_mgr = Arc::clone(self);
        self.lifecycle
            .start(move || async move {
                if has_bus {
                    tokio::spawn(Self::run_publish_loop(publish_mgr));
                    tokio::spawn(Self::run_poll_loop(poll_mgr));
                }
                Ok::<(), std::convert::Infallible>(())
            })
            .await
            .map_err(CacheError::Lifecycle)
    }

    pub async fn stop(self: &Arc<Self>) {
        self.lifecycle
            .stop(|| async { Ok::<(), std::convert::Infallible>(()) })
            .await;
    }

    async fn run_publish_loop(self: Arc<Self>) {
        let mgr = Arc::clone(&self);
        self.lifecycle
            .run_while_up(
                move || {
                    let mgr = Arc::clone(&mgr);
                    async move { mgr.publish_once().await }
                },
                LOOP_PERIOD,
            )
            .await;
    }

    async fn publish_once(&self) -> Result<(), CacheError> {
        let Some(bus) = &self.bus else { return Ok(()) };

        let drained: Vec<(String, String)> = {
            let mut outbound = self.outbound.lock();
            outbound.drain(..).collect()
        };
        if drained.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let events: Vec<EvictionEvent> = drained
            .iter()
            .map(|(cache_name, key)| EvictionEvent {
                cache_name: cache_name.clone(),
                key: key.clone(),
                recorded_at: now,
            })
            .collect();

        if let Err(e) = bus.publish_eviction(events).await {
            warn!(error = %e, "failed to publish evictions, re-queuing for retry");
            self.outbound.lock().extend(drained);
            return Err(e);
        }
        Ok(())
    }

    async fn run_poll_loop(self: Arc<Self>) {
        let mgr = Arc::clone(&self);
        self.lifecycle
            .run_while_up(
                move || {
                    let mgr = Arc::clone(&mgr);
                    async move { mgr.poll_once().await }
                },
                LOOP_PERIOD,
            )
            .await;
    }

    async fn poll_once(&self) -> Result<(), CacheError> {
        let Some(bus) = &self.bus else { return Ok(()) };

        let names: Vec<String> = self.caches.lock().keys().cloned().collect();
        if names.is_empty() {
            return Ok(());
        }

        let since = *self.last_poll_at.lock();
        let events = bus.poll_events(&names, since).await?;
        if events.is_empty() {
            return Ok(());
        }

        let mut max_seen = since;
        let caches = self.caches.lock();
        for event in &events {
            if let Some(cache) = caches.get(&event.cache_name) {
                if let Err(e) = cache.remove_encoded(&event.key) {
                    warn!(
                        cache = %event.cache_name,
                        error = %e,
                        "failed to apply remote eviction, skipping",
                    );
                }
            }
            if event.recorded_at > max_seen {
                max_seen = event.recorded_at;
            }
        }
        drop(caches);

        *self.last_poll_at.lock() = max_seen;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FakeCacheBus;
    use concord_core::{FakeClock, JsonCodec, TypeTag};

    #[tokio::test]
    async fn two_managers_converge_on_a_shared_bus_after_one_drain() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let bus: Arc<dyn CacheBus> =
            Arc::new(FakeCacheBus::new(Arc::clone(&clock) as Arc<dyn Clock>));

        let mgr1 = CacheManager::new(Arc::clone(&clock) as Arc<dyn Clock>, Arc::clone(&bus))
            .await
            .unwrap();
        let cache1 = mgr1
            .register::<String, String, JsonCodec>("test-cache", TypeTag::Str, Duration::from_secs(300), 5, JsonCodec)
            .unwrap();

        let mgr2 = CacheManager::new(Arc::clone(&clock) as Arc<dyn Clock>, Arc::clone(&bus))
            .await
            .unwrap();
        let cache2 = mgr2
            .register::<String, String, JsonCodec>("test-cache", TypeTag::Str, Duration::from_secs(300), 5, JsonCodec)
            .unwrap();

        cache1.put("k".to_string(), "v".to_string());
        cache2.put("k".to_string(), "v".to_string());
        cache1.evict(&"k".to_string());

        mgr1.publish_once().await.unwrap();
        clock.advance(chrono::Duration::milliseconds(1));
        mgr2.poll_once().await.unwrap();

        assert_eq!(cache2.get(&"k".to_string()), None);
    }

    #[tokio::test]
    async fn failed_publish_requeues_drained_entries() {
        struct AlwaysFailBus;
        #[async_trait::async_trait]
        impl CacheBus for AlwaysFailBus {
            async fn publish_eviction(&self, _events: Vec<EvictionEvent>) -> Result<(), CacheError> {
                Err(CacheError::InvalidConfig("down".into()))
            }
            async fn poll_events(
                &self,
                _cache_names: &[String],
                _since: DateTime<Utc>,
            ) -> Result<Vec<EvictionEvent>, CacheError> {
                Ok(vec![])
            }
            async fn now(&self) -> Result<DateTime<Utc>, CacheError> {
                Ok(Utc::now())
            }
        }

        let clock = Arc::new(FakeClock::new(Utc::now())) as Arc<dyn Clock>;
        let bus: Arc<dyn CacheBus> = Arc::new(AlwaysFailBus);
        let mgr = CacheManager::new(Arc::clone(&clock), bus).await.unwrap();
        let cache = mgr
            .register::<String, String, JsonCodec>("c", TypeTag::Str, Duration::from_secs(300), 5, JsonCodec)
            .unwrap();

        cache.put("k".to_string(), "v".to_string());
        cache.evict(&"k".to_string());

        assert!(mgr.publish_once().await.is_err());
        assert_eq!(mgr.outbound.lock().len(), 1);
    }
}
