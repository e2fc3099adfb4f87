use std::io::{Seek, SeekFrom};

use concord_core::{Codec, JsonCodec};
use concord_datafile::{testkit, DataFileReader, DataFileWriter};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    seq: u32,
}

/// A crash is simulated right after a batch's WAL marker flips to
/// `Committed` but before the replay-into-main-file step runs: a reader
/// opened against that directory still recovers the full batch, and the
/// WAL is left empty.
#[tokio::test]
async fn committed_but_unreplayed_batch_is_recovered_on_next_open() {
    let dir = tempdir().unwrap();
    let codec = JsonCodec;

    let pre_crash_total: u32 = 150;
    {
        let mut writer = DataFileWriter::open(dir.path(), 100).unwrap();
        let items: Vec<Event> = (0..pre_crash_total).map(|seq| Event { seq }).collect();
        writer.append(&items, &codec).unwrap();
        writer.flush().unwrap();
    }

    let batch_len: u32 = 7;
    let main_len_before_crash = std::fs::metadata(dir.path().join("data.ds")).unwrap().len();

    // Hand-assemble a WAL batch that reached Committed but was never
    // replayed: this is the exact window a real commit leaves between
    // flipping the marker and replaying it into the main file.
    let wal_path = dir.path().join("wal.log");
    let mut wal_file = std::fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
    testkit::write_header(
        &mut wal_file,
        testkit::MARKER_COMMITTED,
        main_len_before_crash,
        batch_len,
    )
    .unwrap();
    wal_file.seek(SeekFrom::End(0)).unwrap();
    for seq in 0..batch_len {
        let payload = codec.encode(&Event { seq: pre_crash_total + seq }).unwrap();
        testkit::write_record(&mut wal_file, &payload).unwrap();
    }
    wal_file.sync_all().unwrap();
    drop(wal_file);

    let mut reader = DataFileReader::open(dir.path()).unwrap();
    let all = reader.read_all().unwrap();

    assert_eq!(all.len(), (pre_crash_total + batch_len) as usize);

    let wal_len = std::fs::metadata(&wal_path).unwrap().len();
    assert_eq!(wal_len, 0);
}
