use super::test_helpers::{FlakyStorage, ManualClock, memory_store};
use super::*;
use serde_json::json;
use std::sync::atomic::Ordering;

// =============================================================================
// is_fresh
// =============================================================================

#[test]
fn is_fresh_includes_boundary() {
    assert!(is_fresh(1000, 1010, 10));
    assert!(!is_fresh(1000, 1011, 10));
}

#[test]
fn is_fresh_accepts_future_timestamps() {
    assert!(is_fresh(2000, 1000, 10));
}

#[test]
fn is_fresh_does_not_overflow_on_extreme_values() {
    assert!(!is_fresh(i64::MIN, i64::MAX, 10));
    assert!(is_fresh(i64::MAX, i64::MIN, 10));
}

// =============================================================================
// put / get_fresh
// =============================================================================

#[test]
fn get_fresh_is_none_before_any_put() {
    let (store, _clock) = memory_store(1000);
    assert!(store.get_fresh().is_none());
}

#[test]
fn put_then_get_fresh_returns_inputs() {
    let (store, _clock) = memory_store(1000);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();

    let record = store.get_fresh().expect("record should be fresh");
    assert_eq!(record.stream_id, "cam1");
    assert_eq!(record.frame, json!("AAAA"));
    assert_eq!(record.client_timestamp, 1000);
    assert_eq!(record.server_receive_time, 1000);
}

#[test]
fn put_keeps_structured_frame_untouched() {
    let (store, _clock) = memory_store(50);
    let frame = json!({"jpeg": "/9j/4AAQ", "w": 640, "h": 480, "tags": [1, null, "x"]});
    store.put("cam1", frame.clone(), None).unwrap();
    assert_eq!(store.get_fresh().unwrap().frame, frame);
}

#[test]
fn missing_timestamp_defaults_to_server_time() {
    let (store, clock) = memory_store(1234);
    let record = store.put("cam1", json!("AAAA"), None).unwrap();
    assert_eq!(record.client_timestamp, 1234);

    clock.set(1244);
    assert!(store.get_fresh().is_some());
    clock.set(1245);
    assert!(store.get_fresh().is_none());
}

#[test]
fn server_receive_time_ignores_client_timestamp() {
    let (store, _clock) = memory_store(500);
    let record = store.put("cam1", json!("AAAA"), Some(495)).unwrap();
    assert_eq!(record.client_timestamp, 495);
    assert_eq!(record.server_receive_time, 500);
}

#[test]
fn stale_record_is_absent_but_still_stored() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new(1000));
    let store = RelayStore::new(storage.clone(), clock.clone(), DEFAULT_MAX_FRAME_AGE_SECS);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();

    clock.set(1015);
    assert!(store.get_fresh().is_none());
    assert!(storage.load().unwrap().is_some(), "stale bytes must not be deleted");

    // Rewinding the clock brings it back: staleness is evaluated per read.
    clock.set(1005);
    assert!(store.get_fresh().is_some());
}

#[test]
fn last_put_wins_regardless_of_timestamp_order() {
    let (store, _clock) = memory_store(1000);
    store.put("cam1", json!("first"), Some(1000)).unwrap();
    store.put("cam2", json!("second"), Some(995)).unwrap();

    let record = store.get_fresh().unwrap();
    assert_eq!(record.stream_id, "cam2");
    assert_eq!(record.frame, json!("second"));
    assert_eq!(record.client_timestamp, 995);
}

#[test]
fn repeated_identical_puts_match_single_put() {
    let (store, clock) = memory_store(1000);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();
    let once = store.get_fresh().unwrap();

    for t in 1001..1004 {
        clock.set(t);
        store.put("cam1", json!("AAAA"), Some(1000)).unwrap();
    }
    let many = store.get_fresh().unwrap();

    assert_eq!(many.stream_id, once.stream_id);
    assert_eq!(many.frame, once.frame);
    assert_eq!(many.client_timestamp, once.client_timestamp);
    assert_eq!(many.server_receive_time, 1003);
}

#[test]
fn corrupt_bytes_read_as_absent() {
    let storage = Arc::new(MemoryStorage::new());
    storage.save(b"{\"stream_id\":\"cam1\",\"fra").unwrap();
    let store = RelayStore::new(storage, Arc::new(ManualClock::new(0)), DEFAULT_MAX_FRAME_AGE_SECS);
    assert!(store.get_fresh().is_none());
}

#[test]
fn record_missing_timestamp_reads_as_absent() {
    let storage = Arc::new(MemoryStorage::new());
    storage.save(br#"{"stream_id":"cam1","frame":"AAAA","server_time":0}"#).unwrap();
    let store = RelayStore::new(storage, Arc::new(ManualClock::new(0)), DEFAULT_MAX_FRAME_AGE_SECS);
    assert!(store.get_fresh().is_none());
}

#[test]
fn failed_write_keeps_previous_record() {
    let storage = Arc::new(FlakyStorage::default());
    let store = RelayStore::new(storage.clone(), Arc::new(ManualClock::new(1000)), DEFAULT_MAX_FRAME_AGE_SECS);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();

    storage.fail_writes.store(true, Ordering::SeqCst);
    let err = store.put("cam2", json!("BBBB"), Some(1000)).unwrap_err();
    assert!(matches!(err, StoreError::Write(_)));

    let record = store.get_fresh().unwrap();
    assert_eq!(record.stream_id, "cam1");
}

#[test]
fn persisted_layout_uses_wire_field_names() {
    let storage = Arc::new(MemoryStorage::new());
    let store = RelayStore::new(storage.clone(), Arc::new(ManualClock::new(1001)), DEFAULT_MAX_FRAME_AGE_SECS);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();

    let bytes = storage.load().unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        value,
        json!({"stream_id": "cam1", "frame": "AAAA", "timestamp": 1000, "server_time": 1001})
    );
}

#[test]
fn concurrent_puts_leave_one_whole_record() {
    let (store, _clock) = memory_store(1000);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    store.put(format!("cam{i}"), json!(format!("frame{i}")), Some(1000)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = store.get_fresh().unwrap();
    let suffix = record.stream_id.trim_start_matches("cam");
    assert_eq!(record.frame, json!(format!("frame{suffix}")));
}

#[test]
fn get_fresh_at_ignores_the_clock() {
    let (store, _clock) = memory_store(5000);
    store.put("cam1", json!("AAAA"), Some(1000)).unwrap();
    assert!(store.get_fresh().is_none());
    assert!(store.get_fresh_at(1010).is_some());
    assert!(store.get_fresh_at(1011).is_none());
}

#[test]
fn ticking_clock_advances_per_reading() {
    let clock = ManualClock::ticking(10, 1);
    assert_eq!(clock.now(), 10);
    assert_eq!(clock.now(), 11);
}

// =============================================================================
// FileStorage
// =============================================================================

#[test]
fn file_storage_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("stream_data.json"));
    assert!(storage.load().unwrap().is_none());
}

#[test]
fn file_storage_overwrites_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("stream_data.json"));
    storage.save(b"a much longer first record").unwrap();
    storage.save(b"short").unwrap();
    assert_eq!(storage.load().unwrap().unwrap(), b"short");
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1, "temp files must not be left behind");
}

#[test]
fn file_storage_concurrent_puts_never_fail() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().join("stream_data.json")));
    let store = RelayStore::new(storage, Arc::new(ManualClock::new(1000)), DEFAULT_MAX_FRAME_AGE_SECS);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                let mut errors = 0;
                let mut absent = 0;
                for _ in 0..200 {
                    if store.put(format!("cam{i}"), json!(format!("frame{i}")), Some(1000)).is_err() {
                        errors += 1;
                    }
                    if store.get_fresh().is_none() {
                        absent += 1;
                    }
                }
                (errors, absent)
            })
        })
        .collect();
    let (errors, absent) = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |(e, a), (de, da)| (e + de, a + da));

    assert_eq!(errors, 0);
    assert_eq!(absent, 0, "readers must always see a whole record");

    let record = store.get_fresh().unwrap();
    let suffix = record.stream_id.trim_start_matches("cam");
    assert_eq!(record.frame, json!(format!("frame{suffix}")));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn file_storage_relative_path_writes_in_current_dir() {
    let storage = FileStorage::new("stream_data.json");
    assert_eq!(storage.dir(), Path::new("."));
}

#[test]
fn file_storage_survives_store_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream_data.json");
    let clock = Arc::new(ManualClock::new(1000));

    let first = RelayStore::new(Arc::new(FileStorage::new(&path)), clock.clone(), DEFAULT_MAX_FRAME_AGE_SECS);
    first.put("cam1", json!("AAAA"), Some(1000)).unwrap();
    drop(first);

    let second = RelayStore::new(Arc::new(FileStorage::new(&path)), clock, DEFAULT_MAX_FRAME_AGE_SECS);
    assert_eq!(second.get_fresh().unwrap().stream_id, "cam1");
}

#[test]
fn file_storage_write_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("missing").join("stream_data.json"));
    let store = RelayStore::new(Arc::new(storage), Arc::new(ManualClock::new(0)), DEFAULT_MAX_FRAME_AGE_SECS);
    assert!(matches!(store.put("cam1", json!("AAAA"), None), Err(StoreError::Write(_))));
}
