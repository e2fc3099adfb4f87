use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concord_lock::{FakeLockProvider, LockExecutionResult, LockManager, TryLockError};

use crate::prelude::{as_clock, fake_clock};

/// Two workers call `try_lock("payments", body)` against a shared
/// `FakeLockProvider` with a slow body. Exactly one body runs to
/// completion; the other observes contention.
#[tokio::test]
async fn exactly_one_worker_runs_the_body() {
    let clock = fake_clock();
    let provider = Arc::new(FakeLockProvider::new(as_clock(&clock)));
    let manager = LockManager::new(provider);

    let counter = Arc::new(AtomicI64::new(0));
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));

    let worker1_counter = Arc::clone(&counter);
    let worker1_manager = Arc::clone(&manager);
    let worker1_release = Arc::clone(&release_rx);
    let worker1 = tokio::spawn(async move {
        worker1_manager
            .try_lock("payments", |_lease| async move {
                worker1_counter.fetch_add(5, Ordering::SeqCst);
                if let Some(rx) = worker1_release.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<(), std::convert::Infallible>(())
            })
            .await
    });

    // Give worker1 a chance to acquire before worker2 contends.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let worker2_counter = Arc::clone(&counter);
    let worker2_result = manager
        .try_lock("payments", |_lease| async move {
            worker2_counter.fetch_add(5, Ordering::SeqCst);
            Ok::<(), std::convert::Infallible>(())
        })
        .await;

    assert!(matches!(
        worker2_result,
        Ok(LockExecutionResult::Contended { .. })
    ));

    let _ = release_tx.send(());
    let worker1_result: Result<_, TryLockError<std::convert::Infallible>> =
        worker1.await.unwrap();
    assert_eq!(worker1_result.unwrap(), LockExecutionResult::Acquired(()));

    assert_eq!(counter.load(Ordering::SeqCst), 5);
}
