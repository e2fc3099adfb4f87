use concord_core::{JsonCodec, TypeTag};
use concord_datafile::{DataFileReader, DataFileWriter};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payment {
    id: u64,
    amount_cents: i64,
}

fn payment(id: u64) -> Payment {
    Payment { id, amount_cents: 100 + id as i64 }
}

/// A writer appends 1000 records at `batch_size=400` (so three commits:
/// 400, 400, 200 left pending until flush); a reader opened afterwards
/// sees all 1000 in order, then `None`.
#[tokio::test]
async fn writer_appends_and_reader_sees_everything_in_order() {
    let dir = tempdir().unwrap();
    let codec = JsonCodec;

    {
        let mut writer = DataFileWriter::open(dir.path(), 400).unwrap();
        let items: Vec<Payment> = (0..1000).map(payment).collect();
        writer.append(&items, &codec).unwrap();
        writer.flush().unwrap();
    }

    let mut reader = DataFileReader::open(dir.path()).unwrap();
    let hint = TypeTag::Struct("Payment");
    let mut seen = Vec::new();
    while let Some(item) = reader.decode_next::<Payment, _>(&codec, &hint).unwrap() {
        seen.push(item);
    }

    assert_eq!(seen.len(), 1000);
    assert_eq!(seen, (0..1000).map(payment).collect::<Vec<_>>());
    assert_eq!(reader.decode_next::<Payment, _>(&codec, &hint).unwrap(), None);
}
