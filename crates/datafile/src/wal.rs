// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-file batched commit protocol: a header-framed WAL that is either
//! fully replayed into the main file or fully discarded on recovery,
//! never left half-applied.
//!
//! WAL layout: `[i8 marker][i64 target_offset][u32 record_count][record]*`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;

use fs2::FileExt;
use tracing::warn;

use crate::error::DataFileError;
use crate::record;

pub const MARKER_IN_PROGRESS: i8 = 0;
pub const MARKER_COMMITTED: i8 = 1;

pub const HEADER_LEN: u64 = 1 + 8 + 4;

const MAX_LOCK_ATTEMPTS: u32 = 25;
const LOCK_RETRY_PAUSE: Duration = Duration::from_millis(10);

pub struct WalHeader {
    pub marker: i8,
    pub target_offset: u64,
    pub record_count: u32,
}

/// Blocks until an OS-level exclusive lock on `file` is held, retrying on
/// contention up to [`MAX_LOCK_ATTEMPTS`] times with a short pause between
/// attempts before giving up with [`DataFileError::LockTimeout`].
pub fn acquire_exclusive_with_retry(file: &File) -> Result<(), DataFileError> {
    for attempt in 1..=MAX_LOCK_ATTEMPTS {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if is_lock_contention(&e) && attempt < MAX_LOCK_ATTEMPTS => {
                std::thread::sleep(LOCK_RETRY_PAUSE);
            }
            Err(e) if is_lock_contention(&e) => break,
            Err(e) => return Err(DataFileError::Io(e)),
        }
    }
    Err(DataFileError::LockTimeout {
        attempts: MAX_LOCK_ATTEMPTS,
    })
}

fn is_lock_contention(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

/// Writes `header` at offset 0, then positions the cursor right after it
/// so records can be appended sequentially.
pub fn write_header(wal_file: &mut File, header: &WalHeader) -> Result<(), DataFileError> {
    wal_file.seek(SeekFrom::Start(0))?;
    wal_file.write_all(&header.marker.to_be_bytes())?;
    wal_file.write_all(&header.target_offset.to_be_bytes())?;
    wal_file.write_all(&header.record_count.to_be_bytes())?;
    Ok(())
}

fn read_header(wal_file: &mut File) -> Result<WalHeader, DataFileError> {
    wal_file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; HEADER_LEN as usize];
    wal_file.read_exact(&mut buf)?;
    Ok(WalHeader {
        marker: buf[0] as i8,
        target_offset: u64::from_be_bytes(buf[1..9].try_into().expect("8 header bytes")),
        record_count: u32::from_be_bytes(buf[9..13].try_into().expect("4 header bytes")),
    })
}

/// Overwrites just the marker byte with [`MARKER_COMMITTED`] and fsyncs —
/// the single byte write that makes the pending batch durable.
pub fn mark_committed(wal_file: &mut File) -> Result<(), DataFileError> {
    wal_file.seek(SeekFrom::Start(0))?;
    wal_file.write_all(&MARKER_COMMITTED.to_be_bytes())?;
    wal_file.sync_all()?;
    Ok(())
}

/// Idempotent WAL recovery: a no-op if the WAL is empty. If the header
/// marker is `Committed`, replays `record_count` records starting right
/// after the header into `main_file` at `target_offset` and fsyncs it. An
/// `InProgress` marker means the batch never finished; its records are
/// discarded. Either way the WAL is truncated to zero length and synced,
/// so a crash anywhere in this function simply re-runs it on next open.
pub fn recover(main_file: &mut File, wal_file: &mut File) -> Result<(), DataFileError> {
    let wal_len = wal_file.metadata()?.len();
    if wal_len == 0 {
        return Ok(());
    }
    if wal_len < HEADER_LEN {
        warn!(wal_len, "WAL shorter than its header, discarding");
        wal_file.set_len(0)?;
        wal_file.sync_all()?;
        return Ok(());
    }

    let header = read_header(wal_file)?;

    if header.marker == MARKER_COMMITTED {
        main_file.seek(SeekFrom::Start(header.target_offset))?;
        for _ in 0..header.record_count {
            let offset = wal_file.stream_position()?;
            match record::read_record(wal_file, offset)? {
                Some(payload) => record::write_record(main_file, &payload)?,
                None => {
                    warn!("WAL batch shorter than its recorded count, replaying partial batch");
                    break;
                }
            }
        }
        main_file.sync_all()?;
    }

    wal_file.set_len(0)?;
    wal_file.seek(SeekFrom::Start(0))?;
    wal_file.sync_all()?;
    Ok(())
}
