use dashmap::DashMap;

use crate::{ChunkStore, RecordFamily, RecordKey, StoreError};

/// A process-local store backed by a concurrent map.
///
/// Used when no store directory is configured and throughout the tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(RecordFamily, RecordKey), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, across all families.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `true` if a record exists for `(family, key)`.
    pub fn contains(&self, family: RecordFamily, key: RecordKey) -> bool {
        self.records.contains_key(&(family, key))
    }
}

impl ChunkStore for MemoryStore {
    fn read(&self, family: RecordFamily, key: RecordKey) -> Result<Option<Vec<u8>>, StoreError> {
        family.check_key(key)?;
        Ok(self.records.get(&(family, key)).map(|r| r.value().clone()))
    }

    fn write(&self, family: RecordFamily, key: RecordKey, bytes: &[u8]) -> Result<(), StoreError> {
        family.check_key(key)?;
        self.records.insert((family, key), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, family: RecordFamily, key: RecordKey) -> Result<(), StoreError> {
        family.check_key(key)?;
        self.records.remove(&(family, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_voxel::{ChunkCoord, Tier};

    #[test]
    fn test_families_are_independent() {
        let store = MemoryStore::new();
        let key = RecordKey::Chunk(ChunkCoord::new(0, 0, 0));
        store.write(RecordFamily::Blocks, key, b"blocks").unwrap();
        store.write(RecordFamily::Lod(Tier::Lod2), key, b"lod").unwrap();

        assert_eq!(store.read(RecordFamily::Blocks, key).unwrap().unwrap(), b"blocks");
        assert!(store.read(RecordFamily::Entities, key).unwrap().is_none());

        store.remove(RecordFamily::Blocks, key).unwrap();
        assert!(!store.contains(RecordFamily::Blocks, key));
        assert!(store.contains(RecordFamily::Lod(Tier::Lod2), key));
        assert_eq!(store.len(), 1);
    }
}
