// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

/// An authoritative eviction, as seen by the bus. `key` is the
/// base64-encoded form of whatever bytes the owning cache's codec
/// produced — opaque to the bus, meaningful only to the cache that
/// published it and any cache sharing the same name and codec.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionEvent {
    pub cache_name: String,
    pub key: String,
    pub recorded_at: DateTime<Utc>,
}
