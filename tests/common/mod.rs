#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chess_core::{BoardEngine, ShakmatyEngine};
use record_store::{InstanceId, RecordStore, SqliteStorage};

/// Generate a unique suffix based on timestamp + pid to avoid collisions.
pub fn unique_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", std::process::id(), ts % 1_000_000_000)
}

/// Path for a throwaway database file in the temp dir.
pub fn temp_db(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("chess-history-{name}-{}.db", unique_suffix()))
}

/// Freshly loaded store over an in-memory database.
pub fn memory_store() -> RecordStore<ShakmatyEngine> {
    let storage = SqliteStorage::open_in_memory(InstanceId::new(0)).unwrap();
    RecordStore::open(ShakmatyEngine::new(), storage).unwrap()
}

/// Play `from -> to` (square names) on the live engine and record it.
pub fn play(store: &mut RecordStore<ShakmatyEngine>, from: &str, to: &str) -> String {
    let from = chess_core::snapshot::parse_square(from).unwrap();
    let to = chess_core::snapshot::parse_square(to).unwrap();
    let played = store.engine_mut().play(from, to, None, true, true).unwrap();
    assert_eq!(store.record_game_state(0, 0, Some(&played.san)).unwrap(), 1);
    played.san
}

/// Ids held in storage must be exactly 1..=max.
pub fn assert_contiguous(store: &RecordStore<ShakmatyEngine>) {
    let ids = store.all_record_ids().unwrap();
    let expected: Vec<i64> = (1..=ids.len() as i64).collect();
    assert_eq!(ids, expected, "record ids have a gap");
    let cached: Vec<i64> = store.game_history().map(|r| r.id).collect();
    assert_eq!(cached, expected, "cache and storage disagree");
}
