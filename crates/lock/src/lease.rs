// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

/// A lease on a named lock. `execution_id` is a correlation id, not a
/// fencing token — holding a `LockLease` past its `expires_at` proves
/// nothing by itself; `is_valid` is advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub lock_name: String,
    pub execution_id: String,
    pub expires_at: DateTime<Utc>,
}

impl LockLease {
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// The outcome of a contested `try_lock` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockExecutionResult<T> {
    Acquired(T),
    Contended { execution_id: String },
}
