use chrono::Utc;
use concord_cluster::{ClusterState, ClusterStateChangeEvent, ClusterStateListener, ClusterNodeState, LeaderElector};

fn node(session_id: &str) -> ClusterNodeState {
    ClusterNodeState { session_id: session_id.to_string(), recorded_at: Utc::now(), metadata: None }
}

fn event_for(observer_session_id: &str, nodes: Vec<ClusterNodeState>) -> ClusterStateChangeEvent {
    ClusterStateChangeEvent {
        cluster_name: "demo".to_string(),
        node_id: "node".to_string(),
        session_id: observer_session_id.to_string(),
        new_state: ClusterState {
            cluster_name: "demo".to_string(),
            self_session_id: observer_session_id.to_string(),
            nodes,
        },
        old_state: None,
    }
}

/// Cluster state `S1 = {n1:sid1, n2:sid2}` with `sid1 < sid2`: the node
/// reporting as `sid1` becomes leader. Once membership empties to `S2 =
/// {}`, leadership clears entirely.
#[tokio::test]
async fn leader_tracks_membership_as_it_changes() {
    let elector = LeaderElector::new();

    elector
        .on_change(event_for("sid1", vec![node("sid1"), node("sid2")]))
        .await
        .unwrap();
    assert!(elector.is_leader());
    assert_eq!(elector.leader_session_id().as_deref().map(String::as_str), Some("sid1"));

    elector.on_change(event_for("sid1", vec![])).await.unwrap();
    assert!(!elector.is_leader());
    assert!(elector.leader_session_id().is_none());
}
