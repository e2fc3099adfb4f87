use std::sync::Arc;
use std::time::Duration;

use concord_cache::{Cache, CacheBus, CacheManager, FakeCacheBus};
use concord_core::{Clock, JsonCodec, TypeTag};

use crate::prelude::{as_clock, fake_clock};

/// Nodes N1, N2 share a cache named `"test-cache"` over a `FakeCacheBus`.
/// N1 puts then evicts a key; after draining both managers' loops once,
/// N2 no longer has it.
#[tokio::test]
async fn eviction_on_one_node_propagates_to_the_other() {
    let clock = fake_clock();
    let bus: Arc<dyn CacheBus> = Arc::new(FakeCacheBus::new(as_clock(&clock)));

    let manager1 = CacheManager::new(as_clock(&clock), Arc::clone(&bus)).await.unwrap();
    let cache1 = manager1
        .register::<String, String, JsonCodec>(
            "test-cache",
            TypeTag::Str,
            Duration::from_secs(300),
            5,
            JsonCodec,
        )
        .unwrap();

    let manager2 = CacheManager::new(as_clock(&clock), Arc::clone(&bus)).await.unwrap();
    let cache2 = manager2
        .register::<String, String, JsonCodec>(
            "test-cache",
            TypeTag::Str,
            Duration::from_secs(300),
            5,
            JsonCodec,
        )
        .unwrap();

    cache1.put("k".to_string(), "v".to_string());
    cache2.put("k".to_string(), "v".to_string());
    assert_eq!(cache2.get(&"k".to_string()), Some("v".to_string()));

    cache1.evict(&"k".to_string());

    manager1.start().await.unwrap();
    manager2.start().await.unwrap();

    // Let both the publish loop (N1) and poll loop (N2) get at least one
    // tick in; the bus clock also needs to move past N1's publish so N2's
    // `poll_events(since)` (strictly-after semantics) actually sees it.
    clock.advance(chrono::Duration::milliseconds(1));
    crate::prelude::settle(3_500).await;

    manager1.stop().await;
    manager2.stop().await;

    assert_eq!(cache2.get(&"k".to_string()), None);
}
