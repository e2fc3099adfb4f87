// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use concord_core::{IdGen, Lifecycle, UuidV7Gen};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::coordinator::ClusterCoordinator;
use crate::error::ClusterError;
use crate::state::ClusterState;

/// Whether a listener failure should just be logged, or should bring the
/// node down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerErrorKind {
    Recoverable,
    Fatal,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListenerError {
    pub kind: ListenerErrorKind,
    pub message: String,
}

impl ListenerError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self { kind: ListenerErrorKind::Recoverable, message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { kind: ListenerErrorKind::Fatal, message: message.into() }
    }
}

/// A membership transition delivered to a [`ClusterStateListener`]: the
/// previously delivered snapshot (`None` on first delivery) and the new one
/// that replaces it.
#[derive(Debug, Clone)]
pub struct ClusterStateChangeEvent {
    pub cluster_name: String,
    pub node_id: String,
    pub session_id: String,
    pub new_state: ClusterState,
    pub old_state: Option<ClusterState>,
}

/// Receives coalesced, level-triggered membership snapshots from a
/// [`ClusterNode`]'s state-delivery loop. Delivery is skipped whenever the
/// new snapshot equals the last delivered one, so listeners never see
/// redundant no-op transitions.
#[async_trait]
pub trait ClusterStateListener: Send + Sync {
    async fn on_change(&self, event: ClusterStateChangeEvent) -> Result<(), ListenerError>;
}

/// One process's participation in a named cluster: a heartbeat loop that
/// keeps `participate_and_observe` calls flowing (rotating to a fresh
/// session id if heartbeats fail for longer than `heartbeat_timeout`), and
/// a state-delivery loop that hands coalesced snapshots to a listener.
pub struct ClusterNode {
    coordinator: Arc<dyn ClusterCoordinator>,
    listener: Arc<dyn ClusterStateListener>,
    node_id: String,
    cluster_name: String,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    metadata: Option<String>,
    current_session_id: Mutex<String>,
    last_success_at: Mutex<chrono::DateTime<Utc>>,
    last_known_state: Mutex<Option<ClusterState>>,
    last_known_session_id: Mutex<String>,
    last_delivered: Mutex<Option<ClusterState>>,
    healthy: AtomicBool,
    lifecycle: Lifecycle,
}

impl ClusterNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: impl Into<String>,
        cluster_name: impl Into<String>,
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
        metadata: Option<String>,
        coordinator: Arc<dyn ClusterCoordinator>,
        listener: Arc<dyn ClusterStateListener>,
    ) -> Result<Arc<Self>, ClusterError> {
        let node_id = node_id.into();
        let cluster_name = cluster_name.into();

        if node_id.trim().is_empty() {
            return Err(ClusterError::InvalidConfig("node_id must not be blank".into()));
        }
        if cluster_name.trim().is_empty() {
            return Err(ClusterError::InvalidConfig("cluster_name must not be blank".into()));
        }
        if heartbeat_interval < Duration::from_secs(1) {
            return Err(ClusterError::InvalidConfig("heartbeat_interval must be >= 1s".into()));
        }
        if heartbeat_timeout < heartbeat_interval * 3 {
            return Err(ClusterError::InvalidConfig(
                "heartbeat_timeout must be at least 3x heartbeat_interval".into(),
            ));
        }

        let session_id = UuidV7Gen.next();
        let now = Utc::now();

        Ok(Arc::new(Self {
            coordinator,
            listener,
            node_id,
            cluster_name,
            heartbeat_interval,
            heartbeat_timeout,
            metadata,
            current_session_id: Mutex::new(session_id.clone()),
            last_success_at: Mutex::new(now),
            last_known_state: Mutex::new(None),
            last_known_session_id: Mutex::new(session_id),
            last_delivered: Mutex::new(None),
            healthy: AtomicBool::new(true),
            lifecycle: Lifecycle::new(),
        }))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn current_session_id(&self) -> String {
        self.current_session_id.lock().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Starts the heartbeat and state-delivery loops. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<(), ClusterError> {
        let heartbeat_node = Arc::clone(self);
        let delivery_node = Arc::clone(self);
        self.lifecycle
            .start(move || async move {
                tokio::spawn(Self::run_heartbeat_loop(heartbeat_node));
                tokio::spawn(Self::run_state_delivery_loop(delivery_node));
                Ok::<(), std::convert::Infallible>(())
            })
            .await
            .map_err(ClusterError::Lifecycle)
    }

    /// Stops both loops. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        self.lifecycle
            .stop(|| async { Ok::<(), std::convert::Infallible>(()) })
            .await;
    }

    async fn run_heartbeat_loop(self: Arc<Self>) {
        let interval = self.heartbeat_interval;
        let node = Arc::clone(&self);
        self.lifecycle
            .run_while_up(
                move || {
                    let node = Arc::clone(&node);
                    async move { node.heartbeat_tick().await }
                },
                interval,
            )
            .await;
    }

    async fn heartbeat_tick(&self) -> Result<(), ClusterError> {
        let session_id = self.current_session_id.lock().clone();
        let result = self
            .coordinator
            .participate_and_observe(
                &self.cluster_name,
                &session_id,
                self.metadata.as_deref(),
                self.heartbeat_timeout,
            )
            .await;

        match result {
            Ok(state) => {
                *self.last_known_state.lock() = Some(state);
                *self.last_known_session_id.lock() = session_id;
                *self.last_success_at.lock() = Utc::now();
            }
            Err(e) => {
                let elapsed = Utc::now() - *self.last_success_at.lock();
                let timeout = chrono::Duration::from_std(self.heartbeat_timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                if elapsed >= timeout {
                    let new_session_id = UuidV7Gen.next();
                    warn!(
                        node_id = %self.node_id,
                        cluster_name = %self.cluster_name,
                        error = %e,
                        "heartbeat failed past timeout, rotating session id",
                    );
                    *self.current_session_id.lock() = new_session_id;
                    *self.last_success_at.lock() = Utc::now();
                } else {
                    warn!(node_id = %self.node_id, error = %e, "heartbeat failed, will retry");
                }
            }
        }
        Ok(())
    }

    async fn run_state_delivery_loop(self: Arc<Self>) {
        let interval = self.heartbeat_interval;
        let node = Arc::clone(&self);
        self.lifecycle
            .run_while_up(
                move || {
                    let node = Arc::clone(&node);
                    async move { Self::state_delivery_tick(node).await }
                },
                interval,
            )
            .await;
    }

    async fn state_delivery_tick(self: Arc<Self>) -> Result<(), ClusterError> {
        let Some(new_state) = self.last_known_state.lock().clone() else {
            return Ok(());
        };

        let old_state = {
            let mut delivered = self.last_delivered.lock();
            if delivered.as_ref() == Some(&new_state) {
                return Ok(());
            }
            let old = delivered.clone();
            *delivered = Some(new_state.clone());
            old
        };

        let session_id = self.last_known_session_id.lock().clone();
        let event = ClusterStateChangeEvent {
            cluster_name: self.cluster_name.clone(),
            node_id: self.node_id.clone(),
            session_id,
            new_state,
            old_state,
        };

        if let Err(e) = self.listener.on_change(event).await {
            match e.kind {
                ListenerErrorKind::Recoverable => {
                    warn!(node_id = %self.node_id, error = %e.message, "listener error, continuing");
                }
                ListenerErrorKind::Fatal => {
                    warn!(node_id = %self.node_id, error = %e.message, "fatal listener error, stopping node");
                    self.healthy.store(false, Ordering::SeqCst);
                    self.stop().await;
                }
            }
        }
        Ok(())
    }
}
