// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use concord_core::{Clock, Codec, TypeTag};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_SIZE: usize = 5000;
pub const MAX_SIZE_LIMIT: usize = 100_000;

/// A caller-facing, typed view over a local cache.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    /// Removes locally and records an eviction intent for propagation.
    fn evict(&self, key: &K);
}

/// Type-erased view used by [`crate::CacheManager`] to apply remote
/// eviction events without knowing a cache's concrete `K`/`V` types.
pub trait DynCache: Send + Sync {
    fn name(&self) -> &str;
    fn key_type_tag(&self) -> &TypeTag;
    /// Removes by a base64-encoded, codec-encoded key, without recording a
    /// new eviction intent. This is the path remote invalidations take.
    fn remove_encoded(&self, encoded_key: &str) -> Result<(), CacheError>;
}

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// In-process bounded cache with per-entry TTL, backed by a single
/// `parking_lot::Mutex<HashMap<_>>` with lazy expiry checked on access.
pub struct LocalCache<K, V, C> {
    name: String,
    codec: C,
    key_type_tag: TypeTag,
    ttl: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
    store: Mutex<HashMap<K, Entry<V>>>,
    outbound: Arc<Mutex<VecDeque<(String, String)>>>,
}

impl<K, V, C> LocalCache<K, V, C>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Codec + Send + Sync,
{
    pub(crate) fn new(
        name: impl Into<String>,
        key_type_tag: TypeTag,
        ttl: Duration,
        max_size: usize,
        codec: C,
        clock: Arc<dyn Clock>,
        outbound: Arc<Mutex<VecDeque<(String, String)>>>,
    ) -> Result<Arc<Self>, CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidConfig("ttl must be positive".into()));
        }
        if !(1..=MAX_SIZE_LIMIT).contains(&max_size) {
            return Err(CacheError::InvalidConfig(format!(
                "max_size must be in 1..={MAX_SIZE_LIMIT}"
            )));
        }

        Ok(Arc::new(Self {
            name: name.into(),
            codec,
            key_type_tag,
            ttl,
            max_size,
            clock,
            store: Mutex::new(HashMap::new()),
            outbound,
        }))
    }

    fn encode_key(&self, key: &K) -> Result<String, CacheError> {
        let bytes = self.codec.encode(key).map_err(CacheError::Codec)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    fn decode_key(&self, encoded: &str) -> Result<K, CacheError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                CacheError::InvalidConfig(format!("cache key was not valid base64: {e}"))
            })?;
        self.codec.decode(&bytes, &self.key_type_tag).map_err(CacheError::Codec)
    }

    /// Removes locally only; never records an eviction intent. This is the
    /// path both `evict()` and remote-invalidation application share, so
    /// remote removals never feed back into the outbound buffer.
    fn remove_local(&self, key: &K) {
        self.store.lock().remove(key);
    }
}

impl<K, V, C> Cache<K, V> for LocalCache<K, V, C>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Codec + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut store = self.store.lock();
        let expired = store.get(key).map(|e| e.expires_at <= now).unwrap_or(false);
        if expired {
            store.remove(key);
            return None;
        }
        store.get(key).map(|e| e.value.clone())
    }

    fn put(&self, key: K, value: V) {
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let mut store = self.store.lock();

        if store.len() >= self.max_size && !store.contains_key(&key) {
            if let Some(evict_key) = store.keys().next().cloned() {
                store.remove(&evict_key);
            }
        }
        store.insert(key, Entry { value, expires_at });
    }

    fn evict(&self, key: &K) {
        self.remove_local(key);
        if let Ok(encoded) = self.encode_key(key) {
            self.outbound.lock().push_back((self.name.clone(), encoded));
        }
    }
}

impl<K, V, C> DynCache for LocalCache<K, V, C>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Codec + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn key_type_tag(&self) -> &TypeTag {
        &self.key_type_tag
    }

    fn remove_encoded(&self, encoded_key: &str) -> Result<(), CacheError> {
        let key = self.decode_key(encoded_key)?;
        self.remove_local(&key);
        Ok(())
    }
}
