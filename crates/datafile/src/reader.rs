// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-side of the data file. Recovery runs before any read so a reader
//! opened against a crashed writer's directory always sees a consistent,
//! fully-replayed-or-fully-discarded main file.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use concord_core::{Codec, TypeTag};
use fs2::FileExt;
use serde::de::DeserializeOwned;

use crate::error::DataFileError;
use crate::record;
use crate::wal;

pub struct DataFileReader {
    main_path: PathBuf,
    wal_path: PathBuf,
    main_file: std::fs::File,
    offset: u64,
}

impl DataFileReader {
    pub fn open(home: impl AsRef<Path>) -> Result<Self, DataFileError> {
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

        let main_file = OpenOptions::new().read(true).open(&main_path)?;
        let mut reader = Self {
            main_path,
            wal_path,
            main_file,
            offset: 0,
        };
        reader.recover_if_needed()?;
        Ok(reader)
    }

    fn recover_if_needed(&mut self) -> Result<(), DataFileError> {
        let mut wal_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.wal_path)?;
        if wal_file.metadata()?.len() == 0 {
            return Ok(());
        }
        wal::acquire_exclusive_with_retry(&wal_file)?;
        let mut main_writer = OpenOptions::new().append(true).open(&self.main_path)?;
        let result = wal::recover(&mut main_writer, &mut wal_file);
        let _ = FileExt::unlock(&wal_file);
        result
    }

    /// Reads the next record after the reader's current position, or
    /// `None` at EOF. Advances the position past the record on success.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>, DataFileError> {
        self.recover_if_needed()?;
        let offset = self.offset;
        self.main_file.seek(SeekFrom::Start(offset))?;
        match record::read_record(&mut self.main_file, offset)? {
            Some(payload) => {
                self.offset = self.main_file.stream_position()?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    /// Reads the record starting at `offset` without moving the reader's
    /// own position.
    pub fn read_at(&mut self, offset: u64) -> Result<Option<Vec<u8>>, DataFileError> {
        self.recover_if_needed()?;
        let saved = self.offset;
        self.main_file.seek(SeekFrom::Start(offset))?;
        let result = record::read_record(&mut self.main_file, offset);
        self.main_file.seek(SeekFrom::Start(saved))?;
        result
    }

    /// Reads every record from the start, resetting the reader's position.
    pub fn read_all(&mut self) -> Result<Vec<Vec<u8>>, DataFileError> {
        self.offset = 0;
        let mut out = Vec::new();
        while let Some(payload) = self.read_next()? {
            out.push(payload);
        }
        Ok(out)
    }

    /// Like `read_next`, decoding the record with `codec` against `hint`.
    pub fn decode_next<T, C>(
        &mut self,
        codec: &C,
        hint: &TypeTag,
    ) -> Result<Option<T>, DataFileError>
    where
        T: DeserializeOwned,
        C: Codec,
    {
        match self.read_next()? {
            Some(bytes) => Ok(Some(codec.decode(&bytes, hint)?)),
            None => Ok(None),
        }
    }
}
