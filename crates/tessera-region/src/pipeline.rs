//! Store and generator work shared by the worker threads and the tick thread.
//!
//! Every store access for a coordinate happens under that coordinate's
//! bucket lock. Snapshots handed to a save stay visible to populations of
//! the same coordinate until the save lands, so a chunk reloaded while its
//! save is still queued never sees older data.

use std::sync::Arc;

use dashmap::DashMap;
use tessera_store::{ChunkStore, records};
use tessera_voxel::record::encode_block_parts;
use tessera_voxel::{
    BlockRecord, Chunk, ChunkCoord, ChunkFlags, ColumnCoord, ColumnRecord, EntityRecord,
    LodBuffer, MaterialRegistry, Reachability, Tier,
};

use crate::collab::TerrainGenerator;
use crate::error::RegionError;
use crate::locks::BucketLocks;

/// Where a population may take its content from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopulateSource {
    /// Try the store before generating.
    pub allow_from_store: bool,
    /// Never generate; fail if the store has nothing.
    pub store_only: bool,
}

impl PopulateSource {
    pub const STORE_THEN_GENERATE: Self = Self {
        allow_from_store: true,
        store_only: false,
    };
}

/// An immutable copy of everything a save writes for one chunk.
#[derive(Debug)]
pub struct ChunkSnapshot {
    pub coord: ChunkCoord,
    pub revision: u64,
    pub flags: ChunkFlags,
    pub reachability: Reachability,
    pub blocks: Box<[BlockRecord]>,
    /// Cached buffers, in [`Tier::CACHED`] order; missing ones are derived on save.
    pub lods: [Option<LodBuffer>; 3],
    pub entities: Vec<EntityRecord>,
}

impl ChunkSnapshot {
    /// Captures `chunk` together with the entities that belong to it.
    pub fn capture(chunk: &Chunk, entities: Vec<EntityRecord>) -> Self {
        let lods = Tier::CACHED.map(|tier| chunk.cached_lod(tier).cloned());
        let mut flags = chunk.flags();
        flags.remove(ChunkFlags::UNPOPULATED | ChunkFlags::POPULATING);
        Self {
            coord: chunk.coord(),
            revision: chunk.revision(),
            flags,
            reachability: chunk.reachability(),
            blocks: chunk.blocks().into(),
            lods,
            entities,
        }
    }

    fn restore(&self) -> Chunk {
        let mut chunk = Chunk::from_record(
            self.coord,
            tessera_voxel::BlockRecordData {
                flags: self.flags,
                reachability: self.reachability,
                blocks: self.blocks.clone(),
            },
        );
        for lod in self.lods.iter().flatten() {
            chunk.install_lod(lod.clone());
        }
        for entity in &self.entities {
            chunk.push_entity(entity.clone());
        }
        chunk
    }
}

pub struct ChunkPipeline {
    store: Arc<dyn ChunkStore>,
    generator: Arc<dyn TerrainGenerator>,
    registry: Arc<MaterialRegistry>,
    locks: BucketLocks,
    seed: u64,
    pending_saves: DashMap<ChunkCoord, Arc<ChunkSnapshot>>,
}

impl ChunkPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn TerrainGenerator>,
        registry: Arc<MaterialRegistry>,
        lock_buckets: usize,
        seed: u64,
    ) -> Self {
        Self {
            store,
            generator,
            registry,
            locks: BucketLocks::new(lock_buckets),
            seed,
            pending_saves: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    /// Produces a ready chunk for `coord` from the store or the generator.
    ///
    /// Freshly generated chunks come back flagged as such. Reachability and
    /// every cached LOD are computed here so the tick thread never has to.
    pub fn populate(&self, coord: ChunkCoord, source: PopulateSource) -> Result<Chunk, RegionError> {
        if source.allow_from_store
            && let Some(mut chunk) = self.read_stored(coord)
        {
            chunk.refresh_reachability(&self.registry);
            chunk.refresh_lods(&self.registry);
            return Ok(chunk);
        }
        if source.store_only {
            return Err(RegionError::NotInStore(coord));
        }

        let mut chunk = Chunk::unpopulated(coord);
        chunk.flags_mut().insert(ChunkFlags::POPULATING);
        if let Err(source) = self.generator.generate(self.seed, &mut chunk) {
            tracing::error!("Terrain generation failed for chunk {coord}: {source}");
            return Err(RegionError::Generate { coord, source });
        }
        chunk.finish_population();
        chunk.set_freshly_generated(true);
        chunk.refresh_reachability(&self.registry);
        chunk.refresh_lods(&self.registry);
        Ok(chunk)
    }

    fn read_stored(&self, coord: ChunkCoord) -> Option<Chunk> {
        // A staged snapshot is only retired under the bucket lock after its
        // write lands, so checking it first never skips newer data.
        if let Some(snapshot) = self.pending_saves.get(&coord) {
            tracing::trace!("Chunk {coord} restored from a queued save");
            return Some(snapshot.restore());
        }

        let _guard = self.locks.lock(&coord);
        let data = records::load_blocks(self.store(), coord)?;
        let mut chunk = Chunk::from_record(coord, data);
        for tier in Tier::CACHED {
            if let Some(lod) = records::load_lod(self.store(), coord, tier) {
                chunk.install_lod(lod);
            }
        }
        for entity in records::load_entities(self.store(), coord) {
            chunk.push_entity(entity);
        }
        Some(chunk)
    }

    /// Registers a snapshot as the newest content for its coordinate.
    /// Call before queuing the save.
    pub fn stage_save(&self, snapshot: &Arc<ChunkSnapshot>) {
        self.pending_saves.insert(snapshot.coord, Arc::clone(snapshot));
    }

    /// Writes every record family for a snapshot. Families are written
    /// independently; the save succeeds only if all of them did.
    pub fn save(&self, snapshot: &Arc<ChunkSnapshot>) -> bool {
        let coord = snapshot.coord;
        let _guard = self.locks.lock(&coord);
        let mut ok = true;

        let bytes = encode_block_parts(&snapshot.blocks, snapshot.flags, snapshot.reachability);
        if let Err(e) = records::save_blocks(self.store(), coord, &bytes) {
            tracing::warn!("Saving blocks of chunk {coord} failed: {e}");
            ok = false;
        }

        for (slot, tier) in Tier::CACHED.iter().enumerate() {
            let derived;
            let lod = match &snapshot.lods[slot] {
                Some(lod) => lod,
                None => {
                    derived = LodBuffer::derive(&snapshot.blocks, *tier, &self.registry);
                    &derived
                }
            };
            if let Err(e) = records::save_lod(self.store(), coord, lod) {
                tracing::warn!("Saving {tier} of chunk {coord} failed: {e}");
                ok = false;
            }
        }

        if let Err(e) = records::save_entities(self.store(), coord, &snapshot.entities) {
            tracing::warn!("Saving entities of chunk {coord} failed: {e}");
            ok = false;
        }

        // Only retire the staged snapshot if no newer one replaced it.
        self.pending_saves
            .remove_if(&coord, |_, staged| Arc::ptr_eq(staged, snapshot));
        ok
    }

    pub fn load_column(&self, column: ColumnCoord) -> Option<ColumnRecord> {
        let _guard = self.locks.lock(&column);
        records::load_column(self.store(), column)
    }

    pub fn save_column(&self, column: ColumnCoord, record: &ColumnRecord) -> bool {
        let _guard = self.locks.lock(&column);
        match records::save_column(self.store(), column, record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Saving column {column} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::GenerateError;
    use tessera_store::MemoryStore;
    use tessera_voxel::MaterialId;

    struct Stripe;

    impl TerrainGenerator for Stripe {
        fn generate(&self, _seed: u64, chunk: &mut Chunk) -> Result<(), GenerateError> {
            if chunk.coord().z < 0 {
                return Err(GenerateError::Failed("no caves today".into()));
            }
            chunk.put(0, 0, 0, BlockRecord::new(MaterialId(1)));
            Ok(())
        }
    }

    fn pipeline() -> ChunkPipeline {
        let mut registry = MaterialRegistry::new();
        registry
            .register(tessera_voxel::MaterialDef::opaque("stone"))
            .unwrap();
        ChunkPipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Stripe),
            Arc::new(registry),
            4,
            9,
        )
    }

    #[test]
    fn test_generated_chunk_is_ready_and_flagged() {
        let pipeline = pipeline();
        let chunk = pipeline
            .populate(ChunkCoord::new(0, 0, 0), PopulateSource::STORE_THEN_GENERATE)
            .unwrap();
        assert!(chunk.is_ready());
        assert!(chunk.is_freshly_generated());
        assert!(chunk.cached_lod(Tier::Lod6).is_some());
        assert!(!chunk.flags().needs_access_detection());
    }

    #[test]
    fn test_generator_failure_is_reported() {
        let pipeline = pipeline();
        let err = pipeline
            .populate(ChunkCoord::new(0, 0, -1), PopulateSource::STORE_THEN_GENERATE)
            .unwrap_err();
        assert!(matches!(err, RegionError::Generate { .. }));
    }

    #[test]
    fn test_store_only_without_record_fails() {
        let pipeline = pipeline();
        let source = PopulateSource {
            allow_from_store: true,
            store_only: true,
        };
        let err = pipeline.populate(ChunkCoord::new(5, 5, 5), source).unwrap_err();
        assert!(matches!(err, RegionError::NotInStore(_)));
    }

    #[test]
    fn test_saved_chunk_reloads_without_generator() {
        let pipeline = pipeline();
        let coord = ChunkCoord::new(2, 0, 0);
        let mut chunk = Chunk::new_air(coord);
        chunk.put(5, 6, 7, BlockRecord::new(MaterialId(1)));
        let snapshot = Arc::new(ChunkSnapshot::capture(
            &chunk,
            vec![EntityRecord::new("pig", 4, 0)],
        ));
        pipeline.stage_save(&snapshot);
        assert!(pipeline.save(&snapshot));
        assert!(pipeline.pending_saves.is_empty());

        let loaded = pipeline.populate(coord, PopulateSource::STORE_THEN_GENERATE).unwrap();
        assert!(!loaded.is_freshly_generated());
        assert_eq!(loaded.get(5, 6, 7).material(), MaterialId(1));
        assert_eq!(loaded.get(0, 0, 0), BlockRecord::AIR);
        assert_eq!(loaded.pending_entities().len(), 1);
    }

    #[test]
    fn test_staged_snapshot_shadows_store() {
        let pipeline = pipeline();
        let coord = ChunkCoord::new(0, 1, 0);
        let mut chunk = Chunk::new_air(coord);
        chunk.put(1, 1, 1, BlockRecord::new(MaterialId(1)));
        let snapshot = Arc::new(ChunkSnapshot::capture(&chunk, Vec::new()));
        pipeline.stage_save(&snapshot);

        let loaded = pipeline.populate(coord, PopulateSource::STORE_THEN_GENERATE).unwrap();
        assert_eq!(loaded.get(1, 1, 1).material(), MaterialId(1));
        assert!(!loaded.is_freshly_generated());
    }
}
