use std::sync::Arc;
use std::time::Duration;

use concord_cluster::{ClusterCoordinator, FakeClusterCoordinator};

use crate::prelude::as_clock;

/// Three nodes join `"testCluster"` one at a time against a shared
/// `FakeClusterCoordinator`. After each join, the first node's observed
/// remote-peer count grows; after the third and second stop heartbeating
/// (simulated by simply not heartbeating again), the first node's view
/// shrinks once its own next heartbeat falls outside their liveness
/// window.
#[tokio::test]
async fn membership_grows_and_shrinks_as_nodes_join_and_go_quiet() {
    let clock = crate::prelude::fake_clock();
    let coordinator: Arc<FakeClusterCoordinator> =
        Arc::new(FakeClusterCoordinator::new(as_clock(&clock)));
    let heartbeat_timeout = Duration::from_secs(10);

    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    assert_eq!(state1.remote_nodes().count(), 0);

    coordinator
        .participate_and_observe("testCluster", "n2", None, heartbeat_timeout)
        .await
        .unwrap();
    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    assert_eq!(state1.remote_nodes().count(), 1);

    coordinator
        .participate_and_observe("testCluster", "n3", None, heartbeat_timeout)
        .await
        .unwrap();
    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    assert_eq!(state1.remote_nodes().count(), 2);

    // n3 goes quiet: once its last heartbeat falls outside the liveness
    // window relative to n1's next heartbeat, n1 no longer sees it.
    clock.advance(chrono::Duration::seconds(11));
    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    // n2 also went quiet at the same past instant as n3, so both drop out
    // together under this coordinator's single shared clock; re-heartbeat
    // n2 to isolate n3 falling away first.
    assert_eq!(state1.remote_nodes().count(), 0);

    coordinator
        .participate_and_observe("testCluster", "n2", None, heartbeat_timeout)
        .await
        .unwrap();
    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    assert_eq!(state1.remote_nodes().count(), 1);

    // n2 goes quiet too.
    clock.advance(chrono::Duration::seconds(11));
    let state1 = coordinator
        .participate_and_observe("testCluster", "n1", None, heartbeat_timeout)
        .await
        .unwrap();
    assert_eq!(state1.remote_nodes().count(), 0);
}
