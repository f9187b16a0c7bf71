//! Typed access to store records.
//!
//! Loads never fail: a missing, corrupt, or outdated record is logged and
//! reported as absent so the caller falls back to regeneration. Saves
//! return the error so the caller can keep the data dirty and retry later.

use tessera_voxel::record::{self, BlockRecordData};
use tessera_voxel::{
    ChunkCoord, ColumnCoord, ColumnRecord, EntityRecord, LodBuffer, RecordError, Tier,
};

use crate::{ChunkStore, RecordFamily, RecordKey, StoreError};

fn load<T>(
    store: &dyn ChunkStore,
    family: RecordFamily,
    key: RecordKey,
    decode: impl FnOnce(&[u8]) -> Result<T, RecordError>,
) -> Option<T> {
    let bytes = match store.read(family, key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Store read of {family} for {key} failed: {e}");
            return None;
        }
    };
    match decode(&bytes) {
        Ok(value) => Some(value),
        Err(e) if e.is_version_mismatch() => {
            tracing::debug!("Ignoring outdated {family} record for {key}: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("Ignoring corrupt {family} record for {key}: {e}");
            None
        }
    }
}

/// Loads a chunk's block record.
pub fn load_blocks(store: &dyn ChunkStore, coord: ChunkCoord) -> Option<BlockRecordData> {
    load(store, RecordFamily::Blocks, coord.into(), record::decode_blocks)
}

/// Loads one cached LOD buffer.
pub fn load_lod(store: &dyn ChunkStore, coord: ChunkCoord, tier: Tier) -> Option<LodBuffer> {
    load(store, RecordFamily::Lod(tier), coord.into(), |b| {
        record::decode_lod(b, tier)
    })
}

/// Loads a chunk's entities; absent or unreadable documents yield none.
pub fn load_entities(store: &dyn ChunkStore, coord: ChunkCoord) -> Vec<EntityRecord> {
    load(store, RecordFamily::Entities, coord.into(), record::decode_entities).unwrap_or_default()
}

/// Loads a column record. Both the tops and heights records must be present.
pub fn load_column(store: &dyn ChunkStore, column: ColumnCoord) -> Option<ColumnRecord> {
    let key = RecordKey::Column(column);
    let heights = load(store, RecordFamily::Heights, key, |b| Ok(b.to_vec()))?;
    load(store, RecordFamily::Tops, key, |tops| {
        record::decode_column(tops, &heights)
    })
}

/// Writes the block record.
pub fn save_blocks(store: &dyn ChunkStore, coord: ChunkCoord, bytes: &[u8]) -> Result<(), StoreError> {
    store.write(RecordFamily::Blocks, coord.into(), bytes)
}

/// Writes one LOD buffer.
pub fn save_lod(store: &dyn ChunkStore, coord: ChunkCoord, buffer: &LodBuffer) -> Result<(), StoreError> {
    store.write(
        RecordFamily::Lod(buffer.tier()),
        coord.into(),
        &record::encode_lod(buffer),
    )
}

/// Writes the entity document, or removes it when there are no entities.
pub fn save_entities(
    store: &dyn ChunkStore,
    coord: ChunkCoord,
    entities: &[EntityRecord],
) -> Result<(), StoreError> {
    if entities.is_empty() {
        return store.remove(RecordFamily::Entities, coord.into());
    }
    match record::encode_entities(entities) {
        Ok(bytes) => store.write(RecordFamily::Entities, coord.into(), &bytes),
        Err(e) => {
            // Only reachable with non-string map keys, which serde_json::Value cannot hold.
            tracing::error!("Entity document for chunk {coord} could not be encoded: {e}");
            Ok(())
        }
    }
}

/// Writes both column records.
pub fn save_column(
    store: &dyn ChunkStore,
    column: ColumnCoord,
    record: &ColumnRecord,
) -> Result<(), StoreError> {
    let key = RecordKey::Column(column);
    store.write(RecordFamily::Tops, key, &record::encode_tops(record))?;
    store.write(RecordFamily::Heights, key, &record::encode_heights(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use tessera_voxel::{BlockRecord, Chunk, MaterialId, TopCell};

    #[test]
    fn test_missing_records_are_absent() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(0, 0, 0);
        assert!(load_blocks(&store, coord).is_none());
        assert!(load_lod(&store, coord, Tier::Lod2).is_none());
        assert!(load_entities(&store, coord).is_empty());
        assert!(load_column(&store, coord.column()).is_none());
    }

    #[test]
    fn test_corrupt_record_is_absent() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(4, 0, -1);
        store
            .write(RecordFamily::Blocks, coord.into(), &[3, 0, 0, 0, 1])
            .unwrap();
        assert!(load_blocks(&store, coord).is_none());
    }

    #[test]
    fn test_outdated_record_is_absent() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(0, 0, 0);
        let mut bytes = record::encode_blocks(&Chunk::new_air(coord));
        bytes[0] = 1;
        save_blocks(&store, coord, &bytes).unwrap();
        assert!(load_blocks(&store, coord).is_none());
    }

    #[test]
    fn test_blocks_roundtrip_through_store() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(1, 2, 3);
        let mut chunk = Chunk::new_air(coord);
        chunk.put(3, 3, 3, BlockRecord::new(MaterialId(11)));
        save_blocks(&store, coord, &record::encode_blocks(&chunk)).unwrap();

        let data = load_blocks(&store, coord).unwrap();
        assert_eq!(&*data.blocks, chunk.blocks());
    }

    #[test]
    fn test_empty_entities_remove_document() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(0, 0, 0);
        save_entities(&store, coord, &[EntityRecord::new("pig", 1, 0)]).unwrap();
        assert_eq!(load_entities(&store, coord).len(), 1);
        save_entities(&store, coord, &[]).unwrap();
        assert!(!store.contains(RecordFamily::Entities, coord.into()));
    }

    #[test]
    fn test_column_needs_both_records() {
        let store = MemoryStore::new();
        let column = ColumnCoord::new(2, 2);
        let mut record = ColumnRecord::new();
        record.set_cell(0, TopCell::new(MaterialId(1), 44));
        save_column(&store, column, &record).unwrap();
        assert_eq!(load_column(&store, column), Some(record));

        store.remove(RecordFamily::Heights, column.into()).unwrap();
        assert!(load_column(&store, column).is_none());
    }
}
