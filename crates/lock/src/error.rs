// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock provider error: {0}")]
    Provider(#[source] concord_rdbms::RdbmsError),

    #[error("lock manager lifecycle error: {0}")]
    Lifecycle(#[source] concord_core::LifecycleError),
}

/// The outcome of a [`crate::LockManager::try_lock`] call: either the
/// body ran to completion and produced `T`, or the body's own error `E`
/// propagated unchanged after lease cleanup.
#[derive(Debug, Error)]
pub enum TryLockError<E>
where
    E: std::error::Error + 'static,
{
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("lock body failed: {0}")]
    Body(#[source] E),
}
