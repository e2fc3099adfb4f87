// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk record format shared by the main data file and the WAL:
//! `[u32 length][payload][i64 crc32c(payload)]`, all big-endian.

use std::io::{self, Read, Write};

use crate::error::DataFileError;

const LENGTH_PREFIX_BYTES: usize = 4;
const CHECKSUM_BYTES: usize = 8;

/// Writes one length-prefixed, checksummed record.
pub fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), DataFileError> {
    let len = u32::try_from(payload.len()).expect("record payload exceeds u32::MAX bytes");
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    let checksum = crc32c::crc32c(payload) as i64;
    writer.write_all(&checksum.to_be_bytes())?;
    Ok(())
}

/// Reads one record at the given `offset` (used only to annotate a
/// [`DataFileError::ChecksumMismatch`]). Returns `None` on a clean EOF —
/// zero bytes available where the length prefix was expected. Any other
/// short read is reported as [`DataFileError::UnexpectedEof`], since it
/// indicates a record that started but never finished writing, distinct
/// from a genuine I/O failure.
pub fn read_record<R: Read>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<Vec<u8>>, DataFileError> {
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    read_exact_mapped(reader, &mut payload)?;

    let mut checksum_buf = [0u8; CHECKSUM_BYTES];
    read_exact_mapped(reader, &mut checksum_buf)?;
    let expected = i64::from_be_bytes(checksum_buf);
    let actual = crc32c::crc32c(&payload) as i64;
    if actual != expected {
        return Err(DataFileError::ChecksumMismatch {
            offset,
            expected,
            actual,
        });
    }

    Ok(Some(payload))
}

/// Like `read_exact`, but a zero-byte read before any byte has been
/// consumed is reported as `Ok(false)` (clean EOF) rather than an error.
/// Any other short read is [`DataFileError::UnexpectedEof`].
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, DataFileError> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) if total == 0 => return Ok(false),
            Ok(0) => {
                return Err(DataFileError::UnexpectedEof {
                    expected: buf.len() - total,
                })
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DataFileError::Io(e)),
        }
    }
    Ok(true)
}

/// `read_exact`, mapping a short read to [`DataFileError::UnexpectedEof`]
/// instead of folding it into the generic [`DataFileError::Io`] variant.
fn read_exact_mapped<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DataFileError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DataFileError::UnexpectedEof { expected: buf.len() }
        } else {
            DataFileError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_record() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"hello world").unwrap();

        let mut cursor = Cursor::new(buf);
        let payload = read_record(&mut cursor, 0).unwrap().unwrap();
        assert_eq!(payload, b"hello world");
    }

    #[test]
    fn round_trips_an_empty_payload() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"").unwrap();

        let mut cursor = Cursor::new(buf);
        let payload = read_record(&mut cursor, 0).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn clean_eof_at_record_boundary_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_record(&mut cursor, 0).unwrap().is_none());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"original").unwrap();
        buf[6] = b'X'; // flip a payload byte without touching the checksum

        let mut cursor = Cursor::new(buf);
        let err = read_record(&mut cursor, 42).unwrap_err();
        match err {
            DataFileError::ChecksumMismatch { offset, .. } => assert_eq!(offset, 42),
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn mid_record_truncation_is_distinguished_from_a_clean_eof() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"hello world").unwrap();
        buf.truncate(buf.len() - 3); // cut off partway through the checksum

        let mut cursor = Cursor::new(buf);
        let err = read_record(&mut cursor, 0).unwrap_err();
        assert!(matches!(err, DataFileError::UnexpectedEof { .. }));
    }

    #[test]
    fn multiple_records_read_back_in_order() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"one").unwrap();
        write_record(&mut buf, b"two").unwrap();
        write_record(&mut buf, b"three").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_record(&mut cursor, 0).unwrap().unwrap(), b"one");
        assert_eq!(read_record(&mut cursor, 0).unwrap().unwrap(), b"two");
        assert_eq!(read_record(&mut cursor, 0).unwrap().unwrap(), b"three");
        assert!(read_record(&mut cursor, 0).unwrap().is_none());
    }
}
