// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache bus error: {0}")]
    Bus(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid cache config: {0}")]
    InvalidConfig(String),
    #[error("cache key codec error: {0}")]
    Codec(#[from] concord_core::CodecError),
    #[error("cache manager lifecycle error: {0}")]
    Lifecycle(#[from] concord_core::LifecycleError),
}
