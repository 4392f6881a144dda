//! Tests for WAL Writer
//!
//! These tests verify:
//! - Appending entries under caller-assigned sequence numbers
//! - Offset tracking
//! - Sync strategies (`EveryWrite` syncs on every append, others defer to a
//!   manual `sync()`)
//! - Rotation to a new epoch file
//! - Integration with the reader

use std::path::PathBuf;

use atlaskv::config::WalSyncStrategy;
use atlaskv::wal::{Operation, WalReader, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("wal-0.log");
    (temp_dir, wal_path)
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_append_returns_prior_offset() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let offset = writer
        .append(1, Operation::Put { key: b"key1".to_vec(), value: b"value1".to_vec() })
        .unwrap();

    assert_eq!(offset, 0);
    assert!(writer.offset() > 0);
}

#[test]
fn test_append_multiple_entries_advances_offset() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    let off1 = writer
        .append(1, Operation::Put { key: b"a".to_vec(), value: b"1".to_vec() })
        .unwrap();
    let off2 = writer
        .append(2, Operation::Put { key: b"b".to_vec(), value: b"2".to_vec() })
        .unwrap();
    let off3 = writer.append(3, Operation::Delete { key: b"a".to_vec() }).unwrap();

    assert_eq!(off1, 0);
    assert!(off2 > off1);
    assert!(off3 > off2);
    assert_eq!(writer.offset(), writer.offset()); // monotonic, sanity check below
}

#[test]
fn test_caller_assigned_sequence_numbers_preserved() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..100u64 {
        writer
            .append(
                i,
                Operation::Put {
                    key: format!("key{}", i).into_bytes(),
                    value: format!("val{}", i).into_bytes(),
                },
            )
            .unwrap();
    }
    writer.sync().unwrap();

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().map(|e| e.unwrap()).collect();
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64);
    }
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write_leaves_nothing_dirty() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(1, Operation::Put { key: b"k1".to_vec(), value: b"v1".to_vec() }).unwrap();

    // A second sync after an EveryWrite append is a no-op (nothing buffered).
    writer.sync().unwrap();
}

#[test]
fn test_manual_sync_with_deferred_strategy() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::IntervalMs(60_000)).unwrap();

    for i in 0..10 {
        writer
            .append(i, Operation::Put { key: format!("k{}", i).into_bytes(), value: b"v".to_vec() })
            .unwrap();
    }

    writer.sync().unwrap();

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 10);
}

#[test]
fn test_sync_strategy_accessor() {
    let (_temp, wal_path) = setup_temp_wal();
    let writer = WalWriter::create(&wal_path, WalSyncStrategy::Never).unwrap();
    assert_eq!(writer.sync_strategy(), WalSyncStrategy::Never);
}

// =============================================================================
// Write + Read Integration Tests
// =============================================================================

#[test]
fn test_write_then_read() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(1, Operation::Put { key: b"key1".to_vec(), value: b"value1".to_vec() }).unwrap();
        writer.append(2, Operation::Put { key: b"key2".to_vec(), value: b"value2".to_vec() }).unwrap();
        writer.append(3, Operation::Delete { key: b"key1".to_vec() }).unwrap();
    } // Writer dropped, file closed

    let mut reader = WalReader::open(&wal_path).unwrap();

    let entry1 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry1.seq, 1);
    assert!(matches!(entry1.operation, Operation::Put { .. }));

    let entry2 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry2.seq, 2);

    let entry3 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry3.seq, 3);
    assert!(matches!(entry3.operation, Operation::Delete { .. }));

    // EOF
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_write_read_many_entries() {
    let (_temp, wal_path) = setup_temp_wal();

    let entry_count: u64 = 1000;

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::IntervalMs(60_000)).unwrap();
        for i in 0..entry_count {
            writer
                .append(
                    i,
                    Operation::Put {
                        key: format!("key{}", i).into_bytes(),
                        value: format!("value{}", i).into_bytes(),
                    },
                )
                .unwrap();
        }
        writer.sync().unwrap();
    }

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(entries.len(), entry_count as usize);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64);
    }
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotate_starts_fresh_epoch_file() {
    let temp_dir = TempDir::new().unwrap();
    let old_path = temp_dir.path().join("wal-0.log");
    let new_path = temp_dir.path().join("wal-1.log");

    let mut writer = WalWriter::create(&old_path, WalSyncStrategy::EveryWrite).unwrap();
    writer.append(1, Operation::Put { key: b"old".to_vec(), value: b"data".to_vec() }).unwrap();

    writer.rotate(&new_path).unwrap();
    assert_eq!(writer.path(), new_path);
    assert_eq!(writer.offset(), 0);

    writer.append(2, Operation::Put { key: b"new".to_vec(), value: b"data".to_vec() }).unwrap();

    // Old epoch retains its own entry.
    let old_reader = WalReader::open(&old_path).unwrap();
    let old_entries: Vec<_> = old_reader.entries().map(|e| e.unwrap()).collect();
    assert_eq!(old_entries.len(), 1);
    assert_eq!(old_entries[0].operation.key(), b"old");

    // New epoch only has the post-rotation entry.
    let new_reader = WalReader::open(&new_path).unwrap();
    let new_entries: Vec<_> = new_reader.entries().map(|e| e.unwrap()).collect();
    assert_eq!(new_entries.len(), 1);
    assert_eq!(new_entries[0].operation.key(), b"new");
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_large_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let large_value = vec![0xAB; 1024 * 1024]; // 1 MB

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .append(1, Operation::Put { key: b"big_key".to_vec(), value: large_value.clone() })
            .unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();

    if let Operation::Put { value, .. } = entry.operation {
        assert_eq!(value.len(), 1024 * 1024);
        assert_eq!(value, large_value);
    } else {
        panic!("Expected Put operation");
    }
}

#[test]
fn test_delete_operation() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(1, Operation::Delete { key: b"deleted_key".to_vec() }).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();

    match entry.operation {
        Operation::Delete { key } => assert_eq!(key, b"deleted_key"),
        _ => panic!("Expected Delete operation"),
    }
}

#[test]
fn test_mixed_operations() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::IntervalMs(60_000)).unwrap();
        writer.append(1, Operation::Put { key: b"k1".to_vec(), value: b"v1".to_vec() }).unwrap();
        writer.append(2, Operation::Put { key: b"k2".to_vec(), value: b"v2".to_vec() }).unwrap();
        writer.append(3, Operation::Delete { key: b"k1".to_vec() }).unwrap();
        writer.append(4, Operation::Put { key: b"k3".to_vec(), value: b"v3".to_vec() }).unwrap();
        writer.sync().unwrap();
    }

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(entries.len(), 4);
    assert!(matches!(entries[0].operation, Operation::Put { .. }));
    assert!(matches!(entries[1].operation, Operation::Put { .. }));
    assert!(matches!(entries[2].operation, Operation::Delete { .. }));
    assert!(matches!(entries[3].operation, Operation::Put { .. }));
}
