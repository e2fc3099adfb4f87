// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle scaffold: a `{Down, Up}` state machine with idempotent
//! start/stop and a helper for running a periodic background loop that
//! observes cooperative cancellation.
//!
//! This is deliberately a struct every coordination component embeds
//! (`LockManager`, `ClusterNode`, `CacheManager`) rather than a base class
//! to inherit from — composition over the source toolkit's abstract base.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Down,
    Up,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("startup failed: {0}")]
    StartupFailed(String),
}

/// Mutex-guarded `{Down, Up}` state plus a broadcast signal background
/// loops poll for cooperative cancellation.
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    run_tx: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (run_tx, _run_rx) = watch::channel(false);
        Self {
            state: Mutex::new(LifecycleState::Down),
            run_tx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_up(&self) -> bool {
        self.state() == LifecycleState::Up
    }

    /// Subscribe to the running signal; `*receiver.borrow()` is `true` while up.
    pub fn running_signal(&self) -> watch::Receiver<bool> {
        self.run_tx.subscribe()
    }

    /// Run `on_start` if currently `Down`, flipping to `Up` first so that
    /// loops spawned from within `on_start` immediately observe the new
    /// state. A duplicate `start` while already `Up` is a no-op. If
    /// `on_start` fails, the component is flipped back to `Down` and the
    /// failure is surfaced as [`LifecycleError::StartupFailed`].
    pub async fn start<F, Fut, E>(&self, on_start: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Up {
                return Ok(());
            }
            *state = LifecycleState::Up;
            let _ = self.run_tx.send(true);
        }

        if let Err(e) = on_start().await {
            let mut state = self.state.lock();
            *state = LifecycleState::Down;
            let _ = self.run_tx.send(false);
            return Err(LifecycleError::StartupFailed(e.to_string()));
        }

        Ok(())
    }

    /// Run `on_stop` if currently `Up`, flipping to `Down` first. A
    /// duplicate `stop` while already `Down` is a no-op. `on_stop` failures
    /// are logged and never propagated.
    pub async fn stop<F, Fut, E>(&self, on_stop: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Down {
                return;
            }
            *state = LifecycleState::Down;
            let _ = self.run_tx.send(false);
        }

        if let Err(e) = on_stop().await {
            warn!(error = %e, "on_stop hook failed; continuing shutdown");
        }
    }

    /// Repeatedly invoke `body` while up, sleeping `period` between
    /// iterations. Cancellation is cooperative: the loop checks the
    /// running signal at each iteration boundary and exits promptly once
    /// `stop()` has flipped it, tolerating at most one in-flight
    /// iteration. Body errors are logged and the loop continues.
    pub async fn run_while_up<F, Fut, E>(&self, mut body: F, period: Duration)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut running = self.running_signal();
        if !*running.borrow() {
            return;
        }
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately; consume it

        loop {
            if !*running.borrow() {
                return;
            }
            if let Err(e) = body().await {
                warn!(error = %e, "background loop iteration failed, continuing");
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = running.changed() => {
                    if changed.is_err() || !*running.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
