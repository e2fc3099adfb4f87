// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use std::hash::{Hash, Hasher};

/// One member's heartbeat row as observed by the coordinator. Equality and
/// hashing are keyed on `session_id` alone: `recorded_at` and `metadata` are
/// observational, not identity.
#[derive(Debug, Clone)]
pub struct ClusterNodeState {
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
    pub metadata: Option<String>,
}

impl PartialEq for ClusterNodeState {
    fn eq(&self, other: &Self) -> bool {
        self.session_id == other.session_id
    }
}

impl Eq for ClusterNodeState {}

impl Hash for ClusterNodeState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session_id.hash(state);
    }
}

/// A snapshot of cluster membership as observed by one node's heartbeat,
/// scoped to the members whose last heartbeat fell inside the liveness
/// window at observation time.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub cluster_name: String,
    pub self_session_id: String,
    pub nodes: Vec<ClusterNodeState>,
}

/// Equality treats `nodes` as a set keyed on `session_id`, not a sequence:
/// nothing guarantees a coordinator returns rows in a stable order, and a
/// re-ordered-but-identical snapshot must still compare equal so the
/// level-triggered delivery loop doesn't fire a spurious redundant
/// transition.
impl PartialEq for ClusterState {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_name == other.cluster_name
            && self.self_session_id == other.self_session_id
            && self.nodes.len() == other.nodes.len()
            && self.nodes.iter().all(|n| other.nodes.contains(n))
    }
}

impl ClusterState {
    pub fn self_node(&self) -> Option<&ClusterNodeState> {
        self.nodes.iter().find(|n| n.session_id == self.self_session_id)
    }

    pub fn remote_nodes(&self) -> impl Iterator<Item = &ClusterNodeState> {
        let self_session_id = self.self_session_id.as_str();
        self.nodes.iter().filter(move |n| n.session_id != self_session_id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
