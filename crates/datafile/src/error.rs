// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("checksum mismatch at offset {offset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        offset: u64,
        expected: i64,
        actual: i64,
    },

    #[error("record truncated mid-field: {expected} more bytes expected, none available")]
    UnexpectedEof { expected: usize },

    #[error("invalid batch size {0}, must be in [100, 500)")]
    InvalidBatchSize(usize),

    #[error("failed to acquire WAL lock after {attempts} attempts")]
    LockTimeout { attempts: u32 },

    #[error("codec error: {0}")]
    Codec(#[from] concord_core::CodecError),
}
