// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;

use crate::node::{ClusterStateChangeEvent, ClusterStateListener, ListenerError};

/// Deterministic leader election over a [`crate::ClusterNode`]'s delivered
/// membership snapshots: the leader is whichever live session id sorts
/// lowest lexicographically. Because session ids are UUIDv7 (time-ordered),
/// this also means the longest-lived live session wins, with no
/// coordination beyond the membership snapshot itself.
pub struct LeaderElector {
    is_leader: AtomicBool,
    leader_session_id: ArcSwapOption<String>,
}

impl LeaderElector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            is_leader: AtomicBool::new(false),
            leader_session_id: ArcSwapOption::from(None),
        })
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    pub fn leader_session_id(&self) -> Option<Arc<String>> {
        self.leader_session_id.load_full()
    }
}

#[async_trait]
impl ClusterStateListener for LeaderElector {
    async fn on_change(&self, event: ClusterStateChangeEvent) -> Result<(), ListenerError> {
        let leader = event.new_state.nodes.iter().map(|n| n.session_id.clone()).min();

        match leader {
            Some(leader_session_id) => {
                self.is_leader
                    .store(leader_session_id == event.session_id, Ordering::SeqCst);
                self.leader_session_id.store(Some(Arc::new(leader_session_id)));
            }
            None => {
                self.is_leader.store(false, Ordering::SeqCst);
                self.leader_session_id.store(None);
            }
        }
        Ok(())
    }
}
