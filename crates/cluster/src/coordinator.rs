// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ClusterError;
use crate::state::{ClusterNodeState, ClusterState};

/// Records a heartbeat for `(cluster_name, session_id)` and returns the
/// resulting membership snapshot: all rows in `cluster_name` whose
/// `recorded_at` falls within `heartbeat_timeout` of this call, self
/// included. Each call both writes and reads, so the returned state is
/// linearizable with respect to the write it just performed.
#[async_trait]
pub trait ClusterCoordinator: Send + Sync {
    async fn participate_and_observe(
        &self,
        cluster_name: &str,
        session_id: &str,
        metadata: Option<&str>,
        heartbeat_timeout: Duration,
    ) -> Result<ClusterState, ClusterError>;
}

/// Reference relational implementation backed by `cluster.obj_heartbeat`.
/// The upsert and peer scan run as one statement via a CTE, so there is no
/// window between recording this node's heartbeat and reading peers in
/// which a stale snapshot could be observed.
pub struct PgClusterCoordinator {
    pool: sqlx::PgPool,
}

impl PgClusterCoordinator {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClusterCoordinator for PgClusterCoordinator {
    async fn participate_and_observe(
        &self,
        cluster_name: &str,
        session_id: &str,
        metadata: Option<&str>,
        heartbeat_timeout: Duration,
    ) -> Result<ClusterState, ClusterError> {
        let timeout_secs = heartbeat_timeout.as_secs_f64();

        let rows: Vec<(String, DateTime<Utc>, Option<String>)> = sqlx::query_as(
            r#"
            WITH upsert AS (
                INSERT INTO cluster.obj_heartbeat (cluster_name, session_id, recorded_at, metadata)
                VALUES ($1, $2, now(), $3)
                ON CONFLICT (cluster_name, session_id) DO UPDATE
                  SET recorded_at = EXCLUDED.recorded_at, metadata = EXCLUDED.metadata
                RETURNING cluster_name, session_id, recorded_at
            )
            SELECT h.session_id, h.recorded_at, h.metadata
            FROM cluster.obj_heartbeat h
            JOIN upsert ON upsert.cluster_name = h.cluster_name
            WHERE h.cluster_name = $1
              AND h.recorded_at >= upsert.recorded_at - ($4 || ' seconds')::interval
            "#,
        )
        .bind(cluster_name)
        .bind(session_id)
        .bind(metadata)
        .bind(timeout_secs)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ClusterError::Provider(Box::new(e)))?;

        let nodes = rows
            .into_iter()
            .map(|(session_id, recorded_at, metadata)| ClusterNodeState {
                session_id,
                recorded_at,
                metadata,
            })
            .collect();

        Ok(ClusterState {
            cluster_name: cluster_name.to_string(),
            self_session_id: session_id.to_string(),
            nodes,
        })
    }
}

/// etcd-backed implementation. Heartbeats are lease-attached keys under
/// `heartbeat/{cluster}/{session}`; the lease TTL is the heartbeat interval
/// padded by `lease_ttl_padding_factor` so a single missed renewal never
/// drops a live node, while a genuinely dead node's key disappears on its
/// own without a reaper.
#[cfg(feature = "etcd")]
pub struct EtcdClusterCoordinator {
    client: tokio::sync::Mutex<etcd_client::Client>,
    heartbeat_interval: Duration,
    lease_ttl_padding_factor: u32,
}

#[cfg(feature = "etcd")]
impl EtcdClusterCoordinator {
    pub fn new(client: etcd_client::Client, heartbeat_interval: Duration) -> Self {
        Self {
            client: tokio::sync::Mutex::new(client),
            heartbeat_interval,
            lease_ttl_padding_factor: 7,
        }
    }

    fn lease_ttl_secs(&self) -> i64 {
        (self.heartbeat_interval.as_secs() as i64 * self.lease_ttl_padding_factor as i64).max(1)
    }
}

#[cfg(feature = "etcd")]
#[async_trait]
impl ClusterCoordinator for EtcdClusterCoordinator {
    async fn participate_and_observe(
        &self,
        cluster_name: &str,
        session_id: &str,
        metadata: Option<&str>,
        heartbeat_timeout: Duration,
    ) -> Result<ClusterState, ClusterError> {
        let mut client = self.client.lock().await;
        let now = Utc::now();

        let lease = client
            .lease_grant(self.lease_ttl_secs(), None)
            .await
            .map_err(|e| ClusterError::Provider(Box::new(e)))?;

        let heartbeat_key = format!("heartbeat/{cluster_name}/{session_id}");
        let value = format!("{}|{}", now.to_rfc3339(), metadata.unwrap_or_default());
        client
            .put(
                heartbeat_key,
                value,
                Some(etcd_client::PutOptions::new().with_lease(lease.id())),
            )
            .await
            .map_err(|e| ClusterError::Provider(Box::new(e)))?;

        let prefix = format!("heartbeat/{cluster_name}/");
        let resp = client
            .get(prefix, Some(etcd_client::GetOptions::new().with_prefix()))
            .await
            .map_err(|e| ClusterError::Provider(Box::new(e)))?;

        let liveness_window =
            chrono::Duration::from_std(heartbeat_timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let mut nodes = Vec::new();
        for kv in resp.kvs() {
            let key = kv.key_str().map_err(|e| ClusterError::Provider(Box::new(e)))?;
            let Some(peer_session_id) = key.rsplit('/').next() else {
                continue;
            };
            let value = kv.value_str().map_err(|e| ClusterError::Provider(Box::new(e)))?;
            let (ts, meta) = value.split_once('|').unwrap_or((value, ""));
            let recorded_at = DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);
            if now - recorded_at <= liveness_window {
                nodes.push(ClusterNodeState {
                    session_id: peer_session_id.to_string(),
                    recorded_at,
                    metadata: if meta.is_empty() { None } else { Some(meta.to_string()) },
                });
            }
        }

        Ok(ClusterState {
            cluster_name: cluster_name.to_string(),
            self_session_id: session_id.to_string(),
            nodes,
        })
    }
}

/// In-memory [`ClusterCoordinator`] for tests: a shared heartbeat table
/// behind a mutex, so multiple [`crate::ClusterNode`]s in the same test
/// process can observe each other exactly as independent processes sharing
/// one store would.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeClusterCoordinator {
    clock: std::sync::Arc<dyn concord_core::Clock>,
    rows: parking_lot::Mutex<std::collections::HashMap<(String, String), (DateTime<Utc>, Option<String>)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClusterCoordinator {
    pub fn new(clock: std::sync::Arc<dyn concord_core::Clock>) -> Self {
        Self {
            clock,
            rows: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ClusterCoordinator for FakeClusterCoordinator {
    async fn participate_and_observe(
        &self,
        cluster_name: &str,
        session_id: &str,
        metadata: Option<&str>,
        heartbeat_timeout: Duration,
    ) -> Result<ClusterState, ClusterError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock();
        rows.insert(
            (cluster_name.to_string(), session_id.to_string()),
            (now, metadata.map(str::to_string)),
        );

        let timeout = chrono::Duration::from_std(heartbeat_timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let nodes = rows
            .iter()
            .filter(|((cn, _), _)| cn == cluster_name)
            .filter(|(_, (recorded_at, _))| now - *recorded_at <= timeout)
            .map(|((_, sid), (recorded_at, metadata))| ClusterNodeState {
                session_id: sid.clone(),
                recorded_at: *recorded_at,
                metadata: metadata.clone(),
            })
            .collect();

        Ok(ClusterState {
            cluster_name: cluster_name.to_string(),
            self_session_id: session_id.to_string(),
            nodes,
        })
    }
}
