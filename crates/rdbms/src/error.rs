// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RdbmsError {
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("invalid partition size {0}, must be > 0")]
    InvalidPartition(usize),
}

impl From<sqlx::Error> for RdbmsError {
    fn from(e: sqlx::Error) -> Self {
        RdbmsError::Query(e)
    }
}
