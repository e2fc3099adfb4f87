// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster coordinator error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("invalid cluster node config: {0}")]
    InvalidConfig(String),
    #[error("cluster node lifecycle error: {0}")]
    Lifecycle(#[source] concord_core::LifecycleError),
}
