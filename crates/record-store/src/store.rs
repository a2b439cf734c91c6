//! The record store: an in-memory cache over `SqliteStorage` plus the live
//! engine position at the head of the history.

use std::collections::BTreeMap;
use std::io::Write;

use chess_core::{diff, pgn, AnimationInstruction, Bitboard, BoardEngine};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::record::{check_contiguous, Record};
use crate::storage::SqliteStorage;
use crate::xml;

/// Single-writer history of one game. Not synchronised; callers serialise
/// access per instance.
pub struct RecordStore<E: BoardEngine> {
    engine: E,
    storage: SqliteStorage,
    cache: BTreeMap<i64, Record>,
}

impl<E: BoardEngine> RecordStore<E> {
    /// Wrap storage without reading it. Call `load` before use.
    pub fn new(engine: E, storage: SqliteStorage) -> Self {
        Self {
            engine,
            storage,
            cache: BTreeMap::new(),
        }
    }

    pub fn open(engine: E, storage: SqliteStorage) -> Result<Self, StoreError> {
        let mut store = Self::new(engine, storage);
        store.load()?;
        Ok(store)
    }

    /// Re-read every persisted record. An empty table is healed with a fresh
    /// starting record; the engine is left on the highest id.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let records = self.storage.load_all()?;
        if !records.is_empty() {
            check_contiguous(&records)?;
        }
        self.cache = records.into_iter().map(|r| (r.id, r)).collect();

        match self.cache.values().next_back().map(|r| r.snapshot) {
            Some(head) => self.engine.restore(&head)?,
            None => {
                info!(table = %self.storage.table(), "Empty record table, starting a new game");
                self.reset(0, 0)?;
            }
        }
        info!(table = %self.storage.table(), records = self.cache.len(), "Loaded records");
        Ok(())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The live position. Moves played here become history through
    /// `record_game_state`.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn get(&self, id: i64) -> Option<&Record> {
        self.cache.get(&id)
    }

    pub fn latest(&self) -> Option<&Record> {
        self.cache.values().next_back()
    }

    /// Append the live engine position with the given clock offsets.
    /// Returns rows written; 0 means the id was already taken and nothing
    /// changed.
    pub fn record_game_state(
        &mut self,
        white_clock: i32,
        black_clock: i32,
        move_san: Option<&str>,
    ) -> Result<usize, StoreError> {
        let id = self.storage.max_id()?.unwrap_or(0) + 1;
        if self.cache.contains_key(&id) {
            warn!(id, "Record id already cached, refusing to overwrite");
            return Ok(0);
        }

        let record = Record::new(
            id,
            self.engine.snapshot().with_clocks(white_clock, black_clock),
            move_san.map(String::from),
        );
        let rows = self.storage.insert(&record)?;
        if rows == 0 {
            warn!(id, "Record id already stored, refusing to overwrite");
            return Ok(0);
        }
        debug!(id, san = ?record.move_san, "Recorded game state");
        self.cache.insert(id, record);
        Ok(rows)
    }

    /// Overwrite an existing record in place. The move SAN is cleared since
    /// the position no longer follows from it. Editing the head also moves
    /// the live engine position.
    pub fn update_game_state(&mut self, record: Record) -> Result<usize, StoreError> {
        if !self.cache.contains_key(&record.id) {
            warn!(id = record.id, "Update of missing record ignored");
            return Ok(0);
        }
        let record = Record {
            move_san: None,
            ..record
        };

        let rows = self.storage.update(&record)?;
        if rows == 0 {
            warn!(id = record.id, "Record vanished from storage, update ignored");
            return Ok(0);
        }

        let is_head = self.cache.keys().next_back() == Some(&record.id);
        if is_head {
            self.engine.restore(&record.snapshot)?;
        }
        self.cache.insert(record.id, record);
        Ok(rows)
    }

    /// Drop all history and start again from the standard position.
    pub fn reset(&mut self, white_clock: i32, black_clock: i32) -> Result<(), StoreError> {
        let removed = self.storage.clear()?;
        self.cache.clear();
        self.engine.reset();
        self.record_game_state(white_clock, black_clock, None)?;
        info!(table = %self.storage.table(), removed, "Reset game");
        Ok(())
    }

    /// Remove the latest record and restore the one before it. Returns
    /// `false` when already at the starting record.
    pub fn undo(&mut self) -> Result<bool, StoreError> {
        let Some(last) = self.storage.max_id()? else {
            return Ok(false);
        };
        let Some(previous) = self.cache.get(&(last - 1)).map(|r| r.snapshot) else {
            debug!(id = last, "Nothing to undo");
            return Ok(false);
        };

        self.storage.delete_from(last)?;
        self.cache.split_off(&last);
        self.engine.restore(&previous)?;
        info!(id = last, "Undid record");
        Ok(true)
    }

    /// Load any record into the engine without touching history.
    pub fn restore(&mut self, id: i64) -> Result<bool, StoreError> {
        let Some(snapshot) = self.cache.get(&id).map(|r| r.snapshot) else {
            return Ok(false);
        };
        self.engine.restore(&snapshot)?;
        Ok(true)
    }

    /// Squares whose occupant differs between two records; zero when either
    /// is absent.
    pub fn square_changes(&self, a: i64, b: i64) -> Bitboard {
        diff::square_changes(
            self.get(a).map(|r| &r.snapshot),
            self.get(b).map(|r| &r.snapshot),
        )
    }

    /// Animation steps from record `a` to record `b`.
    pub fn animation_plan(&self, a: i64, b: i64) -> Vec<AnimationInstruction> {
        match (self.get(a), self.get(b)) {
            (Some(before), Some(after)) => diff::animation_plan(&before.snapshot, &after.snapshot),
            _ => Vec::new(),
        }
    }

    /// Highest persisted id, read from storage.
    pub fn max_id(&self) -> Result<Option<i64>, StoreError> {
        self.storage.max_id()
    }

    /// Persisted ids in ascending order, read from storage.
    pub fn all_record_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.storage.all_ids()
    }

    pub fn record_count(&self) -> usize {
        self.cache.len()
    }

    pub fn game_history(&self) -> impl Iterator<Item = &Record> + '_ {
        self.cache.values()
    }

    /// Replace all history with `records` (ids `1..=n`) atomically, then
    /// reload.
    pub fn replace_all(&mut self, records: Vec<Record>) -> Result<(), StoreError> {
        check_contiguous(&records)?;
        self.storage.replace_all(&records)?;
        self.load()
    }

    /// Replay PGN movetext and, only if every half-move is valid, replace
    /// the history with the result. Returns the number of records.
    pub fn import_pgn(&mut self, text: &str) -> Result<usize, StoreError>
    where
        E: Clone,
    {
        let mut scratch = self.engine.clone();
        let positions = pgn::replay(text, &mut scratch)?;
        let records: Vec<Record> = (1..)
            .zip(positions)
            .map(|(id, position)| Record::new(id, position.snapshot, position.san))
            .collect();
        let count = records.len();
        self.replace_all(records)?;
        info!(records = count, "Imported PGN");
        Ok(count)
    }

    /// Write the whole history as a `<Records>` document, gzipped when
    /// `compress` is set.
    pub fn export_xml<W: Write>(&self, writer: W, compress: bool) -> Result<(), StoreError> {
        let records: Vec<&Record> = self.game_history().collect();
        xml::write_records(writer, &records, compress)?;
        info!(records = records.len(), compress, "Exported records");
        Ok(())
    }

    /// Read a `<Records>` document (plain or gzip) and replace the history.
    pub fn import_xml(&mut self, bytes: &[u8]) -> Result<usize, StoreError> {
        let records = xml::read_records(bytes)?;
        let count = records.len();
        self.replace_all(records)?;
        info!(records = count, "Imported records");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chess_core::{BoardSnapshot, ShakmatyEngine};

    use super::*;
    use crate::registry::InstanceId;

    fn store() -> RecordStore<ShakmatyEngine> {
        let storage = SqliteStorage::open_in_memory(InstanceId::new(0)).unwrap();
        RecordStore::open(ShakmatyEngine::new(), storage).unwrap()
    }

    fn play(store: &mut RecordStore<ShakmatyEngine>, from: u8, to: u8) {
        let played = store.engine_mut().play(from, to, None, true, true).unwrap();
        assert_eq!(store.record_game_state(0, 0, Some(&played.san)).unwrap(), 1);
    }

    #[test]
    fn test_load_heals_empty_table() {
        let store = store();
        assert_eq!(store.record_count(), 1);
        let first = store.get(1).unwrap();
        assert_eq!(first.snapshot, BoardSnapshot::starting_position());
        assert_eq!(first.move_san, None);
        assert_eq!(store.max_id().unwrap(), Some(1));
    }

    #[test]
    fn test_record_appends_with_clocks() {
        let mut store = store();
        store.engine_mut().play(12, 28, None, true, true).unwrap();
        store.record_game_state(30, 12, Some("e4")).unwrap();

        let latest = store.latest().unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(latest.snapshot.state().white_clock, 30);
        assert_eq!(latest.snapshot.state().black_clock, 12);
        assert_eq!(store.all_record_ids().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_record_refuses_cached_collision() {
        let mut store = store();
        play(&mut store, 12, 28);
        // Storage loses the head behind the store's back.
        store.storage().delete_from(2).unwrap();
        assert_eq!(store.record_game_state(0, 0, Some("e5")).unwrap(), 0);
        assert_eq!(store.get(2).unwrap().move_san.as_deref(), Some("e4"));
    }

    #[test]
    fn test_undo_truncates_and_restores() {
        let mut store = store();
        play(&mut store, 12, 28);
        play(&mut store, 52, 36);

        assert!(store.undo().unwrap());
        assert_eq!(store.record_count(), 2);
        assert_eq!(store.all_record_ids().unwrap(), vec![1, 2]);
        assert_eq!(store.engine().snapshot(), store.get(2).unwrap().snapshot);
    }

    #[test]
    fn test_undo_at_start_is_noop() {
        let mut store = store();
        assert!(!store.undo().unwrap());
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.all_record_ids().unwrap(), vec![1]);
    }

    #[test]
    fn test_update_clears_san_and_moves_head() {
        let mut store = store();
        play(&mut store, 12, 28);

        let edited = BoardSnapshot::from_strs(
            "4k3/8/8/8/8/8/8/4K3",
            "-1,0,0,1,0,0,-1,0",
        )
        .unwrap();
        let rows = store
            .update_game_state(Record::new(2, edited, Some("e4".into())))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.get(2).unwrap().move_san, None);
        assert_eq!(store.engine().snapshot(), edited);
        assert_eq!(store.storage().get(2).unwrap().unwrap().snapshot, edited);
    }

    #[test]
    fn test_update_of_older_record_keeps_engine() {
        let mut store = store();
        play(&mut store, 12, 28);
        let head = store.engine().snapshot();

        let edited = BoardSnapshot::starting_position().with_clocks(5, 5);
        assert_eq!(store.update_game_state(Record::new(1, edited, None)).unwrap(), 1);
        assert_eq!(store.engine().snapshot(), head);
    }

    #[test]
    fn test_update_missing_id_never_inserts() {
        let mut store = store();
        let rows = store
            .update_game_state(Record::new(9, BoardSnapshot::starting_position(), None))
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.all_record_ids().unwrap(), vec![1]);
    }

    #[test]
    fn test_reset_leaves_single_start_record() {
        let mut store = store();
        play(&mut store, 12, 28);
        play(&mut store, 52, 36);

        store.reset(0, 0).unwrap();
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.get(1).unwrap().snapshot, BoardSnapshot::starting_position());
        assert_eq!(store.engine().snapshot(), BoardSnapshot::starting_position());
    }

    #[test]
    fn test_restore_navigates_without_truncating() {
        let mut store = store();
        play(&mut store, 12, 28);
        assert!(store.restore(1).unwrap());
        assert_eq!(store.engine().snapshot(), BoardSnapshot::starting_position());
        assert_eq!(store.record_count(), 2);
        assert!(!store.restore(42).unwrap());
    }

    #[test]
    fn test_square_changes_between_records() {
        let mut store = store();
        play(&mut store, 12, 28);
        assert_eq!(store.square_changes(1, 2), (1u64 << 12) | (1u64 << 28));
        assert_eq!(store.square_changes(1, 99), 0);
        assert!(store.animation_plan(1, 99).is_empty());
        assert_eq!(store.animation_plan(1, 2).len(), 1);
    }

    #[test]
    fn test_load_rejects_gaps() {
        let mut store = store();
        play(&mut store, 12, 28);
        play(&mut store, 52, 36);
        store.storage().connection().execute("DELETE FROM GameRecord0 WHERE Id = 2", []).unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::NotContiguous {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn test_load_propagates_storage_errors() {
        let mut store = store();
        store.storage().connection().execute_batch("DROP TABLE GameRecord0").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Database(_))));
        // The cache from the last good load is untouched.
        assert_eq!(store.record_count(), 1);
    }
}
