// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure partitioning of a list into bounded sublists. No store dependency;
//! callers use this to keep `IN(...)` clauses and batched DML under
//! Postgres's parameter-count limits.

use crate::error::RdbmsError;

/// Splits `items` into consecutive sublists of at most `max_size` elements
/// each, preserving order. `max_size` must be greater than zero.
pub fn partition<T>(items: Vec<T>, max_size: usize) -> Result<Vec<Vec<T>>, RdbmsError> {
    if max_size == 0 {
        return Err(RdbmsError::InvalidPartition(max_size));
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(items.len().div_ceil(max_size));
    let mut current = Vec::with_capacity(max_size);
    for item in items {
        current.push(item);
        if current.len() == max_size {
            out.push(std::mem::replace(&mut current, Vec::with_capacity(max_size)));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    Ok(out)
}
