// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batched, crash-safe append writer. Records accumulate in memory until
//! `batch_size` is reached, at which point they commit as a single atomic
//! batch through the WAL.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use concord_core::Codec;
use fs2::FileExt;
use serde::Serialize;

use crate::error::DataFileError;
use crate::record;
use crate::wal::{self, WalHeader, MARKER_IN_PROGRESS};

const MIN_BATCH_SIZE: usize = 100;
const MAX_BATCH_SIZE: usize = 500;

pub struct DataFileWriter {
    main_path: PathBuf,
    wal_path: PathBuf,
    batch_size: usize,
    pending: Vec<Vec<u8>>,
}

impl DataFileWriter {
    /// Opens (creating if absent) the `data.ds` / `wal.log` pair under
    /// `home`. `batch_size` must fall in `[100, 500)`.
    pub fn open(home: impl AsRef<Path>, batch_size: usize) -> Result<Self, DataFileError> {
        if !(MIN_BATCH_SIZE..MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(DataFileError::InvalidBatchSize(batch_size));
        }
        let home = home.as_ref();
        std::fs::create_dir_all(home)?;
        let main_path = home.join("data.ds");
        let wal_path = home.join("wal.log");

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&main_path)?;
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&wal_path)?;

        Ok(Self {
            main_path,
            wal_path,
            batch_size,
            pending: Vec::new(),
        })
    }

    /// Encodes each item with `codec` and buffers it, committing a full
    /// batch every time `batch_size` accumulates.
    pub fn append<T, C>(&mut self, items: &[T], codec: &C) -> Result<(), DataFileError>
    where
        T: Serialize,
        C: Codec,
    {
        for item in items {
            let bytes = codec.encode(item)?;
            self.pending.push(bytes);
            if self.pending.len() >= self.batch_size {
                self.commit_batch()?;
            }
        }
        Ok(())
    }

    /// Commits any partial batch smaller than `batch_size`. Call before
    /// dropping the writer or before a reader needs to observe what was
    /// just appended.
    pub fn flush(&mut self) -> Result<(), DataFileError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.commit_batch()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn commit_batch(&mut self) -> Result<(), DataFileError> {
        let wal_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.wal_path)?;
        wal::acquire_exclusive_with_retry(&wal_file)?;
        let result = self.commit_batch_locked(wal_file.try_clone()?);
        let _ = FileExt::unlock(&wal_file);
        result
    }

    fn commit_batch_locked(&mut self, mut wal_file: std::fs::File) -> Result<(), DataFileError> {
        let mut main_file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.main_path)?;

        // Step 1: drain any batch left behind by a prior crash before this one starts.
        wal::recover(&mut main_file, &mut wal_file)?;

        // Step 2: note the offset this batch will land at.
        let target_offset = main_file.metadata()?.len();

        let batch = std::mem::take(&mut self.pending);
        let record_count =
            u32::try_from(batch.len()).expect("batch_size < 500 always fits in u32");

        // Step 3: write the header as IN_PROGRESS, then the records.
        wal_file.set_len(0)?;
        wal::write_header(
            &mut wal_file,
            &WalHeader {
                marker: MARKER_IN_PROGRESS,
                target_offset,
                record_count,
            },
        )?;
        wal_file.seek(SeekFrom::End(0))?;
        for payload in &batch {
            record::write_record(&mut wal_file, payload)?;
        }
        wal_file.sync_all()?;

        // Step 4: flip the marker byte to COMMITTED — the durability point.
        wal::mark_committed(&mut wal_file)?;

        // Step 5: replay into the main file and discard the WAL.
        wal::recover(&mut main_file, &mut wal_file)?;

        Ok(())
    }
}
