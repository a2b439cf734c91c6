//! Explicit owner of one record store per game instance.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use chess_core::BoardEngine;
use tracing::info;

use crate::error::StoreError;
use crate::storage::SqliteStorage;
use crate::store::RecordStore;

/// Number of concurrently hosted games.
pub const MAX_INSTANCES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u8);

impl InstanceId {
    /// Panics when `index >= MAX_INSTANCES`: an out-of-range selector is a
    /// caller bug, not bad input.
    pub fn new(index: usize) -> Self {
        assert!(
            index < MAX_INSTANCES,
            "instance id {index} out of range (max {MAX_INSTANCES})"
        );
        Self(index as u8)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Each instance persists to its own table.
    pub fn table_name(self) -> String {
        format!("GameRecord{}", self.0)
    }
}

pub struct StoreRegistry<E: BoardEngine> {
    stores: BTreeMap<InstanceId, RecordStore<E>>,
}

impl<E: BoardEngine> Default for StoreRegistry<E> {
    fn default() -> Self {
        Self {
            stores: BTreeMap::new(),
        }
    }
}

impl<E: BoardEngine> StoreRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store, returning the one it replaces.
    pub fn insert(&mut self, id: InstanceId, store: RecordStore<E>) -> Option<RecordStore<E>> {
        self.stores.insert(id, store)
    }

    /// Open (or create) the instance's table in `path`, load it, and register it.
    pub fn open_sqlite(
        &mut self,
        id: InstanceId,
        path: &Path,
        engine: E,
        create: bool,
    ) -> Result<&mut RecordStore<E>, StoreError> {
        let storage = if create {
            SqliteStorage::open_or_create(path, id)?
        } else {
            SqliteStorage::open(path, id)?
        };
        let store = RecordStore::open(engine, storage)?;
        info!(instance = id.index(), records = store.record_count(), "Opened game instance");
        let slot = match self.stores.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(store);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(store),
        };
        Ok(slot)
    }

    pub fn get(&self, id: InstanceId) -> Option<&RecordStore<E>> {
        self.stores.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut RecordStore<E>> {
        self.stores.get_mut(&id)
    }

    /// Tear down an instance, handing the store back to the caller.
    pub fn remove(&mut self, id: InstanceId) -> Option<RecordStore<E>> {
        self.stores.remove(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.stores.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chess_core::ShakmatyEngine;

    use super::*;

    fn in_memory(id: InstanceId) -> RecordStore<ShakmatyEngine> {
        let storage = SqliteStorage::open_in_memory(id).unwrap();
        RecordStore::open(ShakmatyEngine::new(), storage).unwrap()
    }

    #[test]
    fn test_table_names() {
        assert_eq!(InstanceId::new(0).table_name(), "GameRecord0");
        assert_eq!(InstanceId::new(1).table_name(), "GameRecord1");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_instance_panics() {
        InstanceId::new(MAX_INSTANCES);
    }

    #[test]
    fn test_instances_are_independent() {
        let (a, b) = (InstanceId::new(0), InstanceId::new(1));
        let mut registry = StoreRegistry::new();
        registry.insert(a, in_memory(a));
        registry.insert(b, in_memory(b));

        let first = registry.get_mut(a).unwrap();
        first.engine_mut().play(12, 28, None, true, true).unwrap();
        first.record_game_state(0, 0, Some("e4")).unwrap();

        assert_eq!(registry.get(a).unwrap().record_count(), 2);
        assert_eq!(registry.get(b).unwrap().record_count(), 1);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![a, b]);

        assert!(registry.remove(a).is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a).is_none());
    }
}
