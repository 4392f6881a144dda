//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL (no corruption)
//! - Recovery from an empty WAL
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch) — both are reported as
//!   a clean stop plus `was_truncated`, since a torn write and a CRC
//!   mismatch are indistinguishable from "the process crashed mid-append"
//! - Verify mode (stats only, no entries returned, file left untouched)

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use atlaskv::codec::Record;
use atlaskv::config::WalSyncStrategy;
use atlaskv::wal::{Operation, WalRecovery, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("wal-0.log");
    (temp_dir, wal_path)
}

/// Write entries using WalWriter (produces a well-formed WAL).
fn write_entries_via_writer(path: &PathBuf, count: u64) {
    let mut writer = WalWriter::create(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(
                i + 1,
                Operation::Put {
                    key: format!("key{}", i).into_bytes(),
                    value: format!("value{}", i).into_bytes(),
                },
            )
            .unwrap();
    }
}

/// Write raw frames directly to a file (for crafting corruption/truncation).
fn write_raw_records(path: &PathBuf, records: &[Record]) {
    let mut file = File::create(path).unwrap();
    for record in records {
        file.write_all(&record.encode()).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.max_seq, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.max_seq, 1);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.max_seq, 10);
    assert!(!result.was_truncated);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, (i + 1) as u64);
    }
}

#[test]
fn test_recover_preserves_operations() {
    let (_temp, wal_path) = setup_temp_wal();

    {
        let mut writer = WalWriter::create(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(1, Operation::Put { key: b"k1".to_vec(), value: b"v1".to_vec() }).unwrap();
        writer.append(2, Operation::Delete { key: b"k1".to_vec() }).unwrap();
        writer.append(3, Operation::Put { key: b"k2".to_vec(), value: b"v2".to_vec() }).unwrap();
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(matches!(entries[0].operation, Operation::Put { .. }));
    assert!(matches!(entries[1].operation, Operation::Delete { .. }));
    assert!(matches!(entries[2].operation, Operation::Put { .. }));
}

// =============================================================================
// Recover: Partial Write Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_recover_partial_header_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = Record::put(1, b"k".to_vec(), b"v".to_vec());
    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.encode()).unwrap();
    file.write_all(&[0u8; 2]).unwrap(); // torn length prefix
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.max_seq, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_partial_data_at_tail() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = Record::put(1, b"k".to_vec(), b"v".to_vec());
    let second = Record::put(2, b"k2".to_vec(), b"v2".to_vec());
    let second_bytes = second.encode();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.encode()).unwrap();
    file.write_all(&second_bytes[..second_bytes.len() - 3]).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    // Only the first entry should be recovered.
    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert!(result.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests (CRC mismatch)
// =============================================================================

#[test]
fn test_recover_corrupted_entry_stops_replay() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = Record::put(1, b"k1".to_vec(), b"v1".to_vec());
    let bad = Record::put(2, b"k2".to_vec(), b"v2".to_vec());
    let mut bad_bytes = bad.encode();
    let last = bad_bytes.len() - 1;
    bad_bytes[last] ^= 0xFF;

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.encode()).unwrap();
    file.write_all(&bad_bytes).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    // Only the first entry survives — the corrupted record stops replay,
    // same as a torn write would.
    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.max_seq, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_corruption_at_first_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let record = Record::put(1, b"k".to_vec(), b"v".to_vec());
    write_raw_records(&wal_path, &[record]);

    // Corrupt a data byte well past the length/crc header.
    let mut bytes = std::fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.max_seq, 0);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_truncates_file_to_valid_prefix() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = Record::put(1, b"k".to_vec(), b"v".to_vec());
    let good_len = good.encode().len();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.encode()).unwrap();
    file.write_all(&[0xFF; 7]).unwrap(); // torn tail
    file.sync_all().unwrap();

    WalRecovery::recover(&wal_path).unwrap();

    let on_disk_len = std::fs::metadata(&wal_path).unwrap().len();
    assert_eq!(on_disk_len, good_len as u64);
}

// =============================================================================
// Verify Tests (stats only, same logic as recover, no file mutation)
// =============================================================================

#[test]
fn test_verify_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.max_seq, 5);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_empty_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();

    let good = Record::put(1, b"k".to_vec(), b"v".to_vec());
    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&good.encode()).unwrap();
    file.write_all(&[0u8; 5]).unwrap(); // trailing junk
    file.sync_all().unwrap();

    let before = std::fs::metadata(&wal_path).unwrap().len();
    let result = WalRecovery::verify(&wal_path).unwrap();
    let after = std::fs::metadata(&wal_path).unwrap().len();

    assert_eq!(result.entries_recovered, 1);
    assert!(result.was_truncated);
    assert_eq!(before, after, "verify must not truncate the file");
}

// =============================================================================
// Recover + Verify Consistency Test
// =============================================================================

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 20);

    let (entries, recover_result) = WalRecovery::recover(&wal_path).unwrap();
    let verify_result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(entries.len(), recover_result.entries_recovered as usize);
    assert_eq!(recover_result.entries_recovered, verify_result.entries_recovered);
    assert_eq!(recover_result.max_seq, verify_result.max_seq);
    assert_eq!(recover_result.was_truncated, verify_result.was_truncated);
}
