//! Shared helpers for end-to-end behavioral specifications.
//!
//! Unlike component-level unit tests (which live next to the code they
//! cover), these exercise a full manager/node/writer against the
//! in-memory fake of its durable port, matching the literal scenarios in
//! SPEC_FULL.md section 8.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use concord_core::{Clock, FakeClock};

pub fn fake_clock() -> Arc<FakeClock> {
    Arc::new(FakeClock::new(chrono::Utc::now()))
}

pub fn as_clock(clock: &Arc<FakeClock>) -> Arc<dyn Clock> {
    Arc::clone(clock) as Arc<dyn Clock>
}

/// Lets a background loop's already-scheduled ticks land before asserting
/// on their effect. Loops under test use short periods, so a modest sleep
/// is enough for at least one full iteration.
pub async fn settle(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
