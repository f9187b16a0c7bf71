//! The chunk: a 30×30×30 block container with cached LODs, reachability,
//! flags, dirty tracking, and entities waiting to be spawned.
//!
//! Coordinates are `u8` values in `[0, 30)`. Out-of-bounds reads return Air
//! and out-of-bounds writes are ignored with a warning.

use crate::block::{BlockRecord, MaterialId};
use crate::coords::ChunkCoord;
use crate::entity::EntityRecord;
use crate::lod::{LodBuffer, Tier};
use crate::reachability::Reachability;
use crate::record::BlockRecordData;
use crate::registry::MaterialRegistry;

/// Side length of a chunk in blocks.
pub const CHUNK_SIDE: usize = 30;

/// Total number of blocks in a chunk (30³).
pub const CHUNK_VOLUME: usize = CHUNK_SIDE * CHUNK_SIDE * CHUNK_SIDE;

/// Chunk lifecycle and bookkeeping flags. Bit positions are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkFlags(pub u8);

impl ChunkFlags {
    /// The chunk has no content yet (custom / unpopulated).
    pub const UNPOPULATED: u8 = 1 << 0;
    /// A population is in flight.
    pub const POPULATING: u8 = 1 << 1;
    /// Reachability must be recomputed before use.
    pub const NEEDS_ACCESS_DETECTION: u8 = 1 << 2;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    pub fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    pub fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }

    pub fn is_unpopulated(self) -> bool {
        self.contains(Self::UNPOPULATED)
    }

    pub fn is_populating(self) -> bool {
        self.contains(Self::POPULATING)
    }

    pub fn needs_access_detection(self) -> bool {
        self.contains(Self::NEEDS_ACCESS_DETECTION)
    }
}

/// A deferred action applied once the chunk is admitted to the live world.
#[derive(Clone, Debug, PartialEq)]
pub enum Fixup {
    /// Overwrite one block (e.g. a structure spilling over from a neighbor).
    SetBlock { local: [u8; 3], block: BlockRecord },
    /// Force a reachability recomputation.
    RecomputeReachability,
}

/// A voxel chunk with bounds-checked access, dirty tracking, and cached LODs.
#[derive(Clone, Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    blocks: Box<[BlockRecord]>,
    flags: ChunkFlags,
    reachability: Reachability,
    /// Cached buffers indexed like [`Tier::CACHED`].
    lods: [Option<LodBuffer>; 3],
    /// Tick of the first unsaved edit; `None` means saved.
    dirty_since: Option<u64>,
    /// Incremented on every edit. Starts at 1 so 0 can mean "no chunk data".
    revision: u64,
    physics_stale: bool,
    freshly_generated: bool,
    pending_entities: Vec<EntityRecord>,
    fixups: Vec<Fixup>,
}

impl Chunk {
    /// Creates an empty placeholder awaiting population.
    pub fn unpopulated(coord: ChunkCoord) -> Self {
        let mut chunk = Self::new_air(coord);
        chunk.flags.insert(ChunkFlags::UNPOPULATED);
        chunk
    }

    /// Creates a ready, all-air chunk.
    pub fn new_air(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![BlockRecord::AIR; CHUNK_VOLUME].into_boxed_slice(),
            flags: ChunkFlags::default(),
            reachability: Reachability::all_open(),
            lods: [None, None, None],
            dirty_since: None,
            revision: 1,
            physics_stale: false,
            freshly_generated: false,
            pending_entities: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Rebuilds a chunk from a decoded store record.
    pub fn from_record(coord: ChunkCoord, record: BlockRecordData) -> Self {
        let mut chunk = Self::new_air(coord);
        chunk.blocks = record.blocks;
        chunk.reachability = record.reachability;
        chunk.flags = record.flags;
        chunk
            .flags
            .remove(ChunkFlags::UNPOPULATED | ChunkFlags::POPULATING);
        chunk
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn flags(&self) -> ChunkFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut ChunkFlags {
        &mut self.flags
    }

    /// `true` once population has completed.
    pub fn is_ready(&self) -> bool {
        !self.flags.is_unpopulated() && !self.flags.is_populating()
    }

    /// Clears the unpopulated/populating flags after a successful population.
    pub fn finish_population(&mut self) {
        self.flags
            .remove(ChunkFlags::UNPOPULATED | ChunkFlags::POPULATING);
    }

    fn in_bounds(x: u8, y: u8, z: u8) -> bool {
        (x as usize) < CHUNK_SIDE && (y as usize) < CHUNK_SIDE && (z as usize) < CHUNK_SIDE
    }

    /// Flat index of local `(x, y, z)`; x varies fastest.
    pub fn index(x: usize, y: usize, z: usize) -> usize {
        x + y * CHUNK_SIDE + z * CHUNK_SIDE * CHUNK_SIDE
    }

    /// Returns the block at `(x, y, z)`, or Air if out of bounds.
    pub fn get(&self, x: u8, y: u8, z: u8) -> BlockRecord {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::get out of bounds: ({}, {}, {})", x, y, z);
            return BlockRecord::AIR;
        }
        self.blocks[Self::index(x as usize, y as usize, z as usize)]
    }

    /// Edits the block at `(x, y, z)` as a live-world mutation.
    ///
    /// Marks the chunk dirty at `tick`, bumps the revision, invalidates the
    /// LOD caches, and flags reachability and physics for recomputation.
    /// Returns `false` if out of bounds or the block is unchanged.
    pub fn set(&mut self, x: u8, y: u8, z: u8, block: BlockRecord, tick: u64) -> bool {
        if !Self::in_bounds(x, y, z) {
            tracing::warn!("Chunk::set out of bounds: ({}, {}, {})", x, y, z);
            return false;
        }
        let slot = &mut self.blocks[Self::index(x as usize, y as usize, z as usize)];
        if *slot == block {
            return false;
        }
        *slot = block;
        self.mark_dirty(tick);
        self.revision += 1;
        self.physics_stale = true;
        self.invalidate_derived();
        true
    }

    /// Writes a block without dirty/revision bookkeeping. Used by terrain
    /// generators while the chunk is still populating.
    pub fn put(&mut self, x: usize, y: usize, z: usize, block: BlockRecord) {
        debug_assert!(x < CHUNK_SIDE && y < CHUNK_SIDE && z < CHUNK_SIDE);
        self.blocks[Self::index(x, y, z)] = block;
        self.invalidate_derived();
    }

    /// Fills the whole chunk without bookkeeping.
    pub fn fill(&mut self, block: BlockRecord) {
        self.blocks.fill(block);
        self.invalidate_derived();
    }

    fn invalidate_derived(&mut self) {
        self.lods = [None, None, None];
        self.flags.insert(ChunkFlags::NEEDS_ACCESS_DETECTION);
    }

    pub fn blocks(&self) -> &[BlockRecord] {
        &self.blocks
    }

    /// `true` if every block is the default air block.
    pub fn is_all_air(&self) -> bool {
        self.blocks.iter().all(BlockRecord::is_default)
    }

    /// Highest opaque block in local column `(x, y)`, scanning down from
    /// `start_z` (inclusive).
    pub fn highest_opaque_in_column(
        &self,
        x: usize,
        y: usize,
        start_z: usize,
        registry: &MaterialRegistry,
    ) -> Option<(MaterialId, usize)> {
        let top = start_z.min(CHUNK_SIDE - 1);
        (0..=top).rev().find_map(|z| {
            let material = self.blocks[Self::index(x, y, z)].material();
            registry.is_opaque(material).then_some((material, z))
        })
    }

    // -- reachability -----------------------------------------------------

    pub fn reachability(&self) -> Reachability {
        self.reachability
    }

    /// Recomputes reachability if the chunk is flagged for it.
    pub fn refresh_reachability(&mut self, registry: &MaterialRegistry) {
        if self.flags.needs_access_detection() {
            self.reachability = Reachability::compute(&self.blocks, registry);
            self.flags.remove(ChunkFlags::NEEDS_ACCESS_DETECTION);
        }
    }

    // -- LODs -------------------------------------------------------------

    fn cache_slot(tier: Tier) -> Option<usize> {
        Tier::CACHED.iter().position(|t| *t == tier)
    }

    /// The cached buffer for `tier`, if present.
    pub fn cached_lod(&self, tier: Tier) -> Option<&LodBuffer> {
        Self::cache_slot(tier).and_then(|slot| self.lods[slot].as_ref())
    }

    /// Installs a buffer read from the store. Ignored for uncached tiers.
    pub fn install_lod(&mut self, buffer: LodBuffer) {
        if let Some(slot) = Self::cache_slot(buffer.tier()) {
            self.lods[slot] = Some(buffer);
        }
    }

    /// Fills every missing cached LOD buffer from the block array.
    pub fn refresh_lods(&mut self, registry: &MaterialRegistry) {
        for (slot, tier) in Tier::CACHED.iter().enumerate() {
            if self.lods[slot].is_none() {
                self.lods[slot] = Some(LodBuffer::derive(&self.blocks, *tier, registry));
            }
        }
    }

    /// The LOD buffer for `tier`, deriving and caching it if needed.
    ///
    /// Returns `None` for [`Tier::Full`], which is the block array itself.
    pub fn lod(&mut self, tier: Tier, registry: &MaterialRegistry) -> Option<LodBuffer> {
        match tier {
            Tier::Full => None,
            Tier::Lod15 => {
                let lod5 = self.lod(Tier::Lod5, registry)?;
                lod5.coarsen(Tier::Lod15, registry)
            }
            cached => {
                let slot = Self::cache_slot(cached)?;
                if self.lods[slot].is_none() {
                    self.lods[slot] = Some(LodBuffer::derive(&self.blocks, cached, registry));
                }
                self.lods[slot].clone()
            }
        }
    }

    // -- dirty tracking ---------------------------------------------------

    /// Tick of the first unsaved edit, or `None` if saved.
    pub fn dirty_since(&self) -> Option<u64> {
        self.dirty_since
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// Marks the chunk dirty; keeps the earliest tick if already dirty.
    pub fn mark_dirty(&mut self, tick: u64) {
        self.dirty_since.get_or_insert(tick);
    }

    pub fn mark_saved(&mut self) {
        self.dirty_since = None;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the revision with an owner-assigned stamp. Owners that hand
    /// out unique stamps make revisions comparable across reloads.
    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn physics_stale(&self) -> bool {
        self.physics_stale
    }

    pub fn clear_physics_stale(&mut self) {
        self.physics_stale = false;
    }

    /// Set when content came from the terrain generator rather than the store.
    pub fn is_freshly_generated(&self) -> bool {
        self.freshly_generated
    }

    pub fn set_freshly_generated(&mut self, generated: bool) {
        self.freshly_generated = generated;
    }

    // -- deferred work ----------------------------------------------------

    pub fn pending_entities(&self) -> &[EntityRecord] {
        &self.pending_entities
    }

    pub fn push_entity(&mut self, entity: EntityRecord) {
        self.pending_entities.push(entity);
    }

    pub fn take_pending_entities(&mut self) -> Vec<EntityRecord> {
        std::mem::take(&mut self.pending_entities)
    }

    pub fn push_fixup(&mut self, fixup: Fixup) {
        self.fixups.push(fixup);
    }

    pub fn has_fixups(&self) -> bool {
        !self.fixups.is_empty()
    }

    /// Applies and clears every deferred fix-up.
    pub fn apply_fixups(&mut self, tick: u64) {
        for fixup in std::mem::take(&mut self.fixups) {
            match fixup {
                Fixup::SetBlock { local, block } => {
                    self.set(local[0], local[1], local[2], block, tick);
                }
                Fixup::RecomputeReachability => {
                    self.flags.insert(ChunkFlags::NEEDS_ACCESS_DETECTION);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MaterialDef;

    fn stone_registry() -> (MaterialRegistry, MaterialId) {
        let mut registry = MaterialRegistry::new();
        let stone = registry.register(MaterialDef::opaque("stone")).unwrap();
        (registry, stone)
    }

    #[test]
    fn test_unpopulated_chunk_is_not_ready() {
        let mut chunk = Chunk::unpopulated(ChunkCoord::new(0, 0, 0));
        assert!(!chunk.is_ready());
        chunk.flags_mut().insert(ChunkFlags::POPULATING);
        chunk.finish_population();
        assert!(chunk.is_ready());
    }

    #[test]
    fn test_set_marks_dirty_and_bumps_revision() {
        let (_, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        assert!(!chunk.is_dirty());
        let rev = chunk.revision();

        assert!(chunk.set(1, 2, 3, BlockRecord::new(stone), 40));
        assert_eq!(chunk.dirty_since(), Some(40));
        assert_eq!(chunk.revision(), rev + 1);
        assert!(chunk.physics_stale());
        assert!(chunk.flags().needs_access_detection());

        chunk.set(1, 2, 4, BlockRecord::new(stone), 55);
        assert_eq!(chunk.dirty_since(), Some(40), "earliest dirty tick kept");

        chunk.mark_saved();
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_set_same_block_is_noop() {
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        assert!(!chunk.set(0, 0, 0, BlockRecord::AIR, 1));
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.revision(), 1);
    }

    #[test]
    fn test_out_of_bounds_access_is_graceful() {
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        assert_eq!(chunk.get(30, 0, 0), BlockRecord::AIR);
        assert!(!chunk.set(0, 30, 0, BlockRecord::new(MaterialId(1)), 1));
        assert!(chunk.is_all_air());
    }

    #[test]
    fn test_edit_invalidates_lod_cache() {
        let (registry, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        chunk.refresh_lods(&registry);
        assert!(chunk.cached_lod(Tier::Lod2).unwrap().is_all_air());

        chunk.set(0, 0, 0, BlockRecord::new(stone), 3);
        assert!(chunk.cached_lod(Tier::Lod2).is_none());

        let lod = chunk.lod(Tier::Lod2, &registry).unwrap();
        assert_eq!(lod.get(0, 0, 0), stone);
        assert!(chunk.cached_lod(Tier::Lod2).is_some());
    }

    #[test]
    fn test_lod15_derived_from_lod5() {
        let (registry, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        chunk.put(29, 0, 0, BlockRecord::new(stone));
        let lod = chunk.lod(Tier::Lod15, &registry).unwrap();
        assert_eq!(lod.get(1, 0, 0), stone);
        assert!(chunk.cached_lod(Tier::Lod15).is_none());
        assert!(chunk.lod(Tier::Full, &registry).is_none());
    }

    #[test]
    fn test_reachability_refreshes_only_when_flagged() {
        let (registry, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        chunk.fill(BlockRecord::new(stone));
        assert_eq!(chunk.reachability(), Reachability::all_open());
        chunk.refresh_reachability(&registry);
        assert_eq!(chunk.reachability(), Reachability::all_closed());
        assert!(!chunk.flags().needs_access_detection());
    }

    #[test]
    fn test_fixups_apply_as_edits() {
        let (_, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        chunk.push_fixup(Fixup::SetBlock {
            local: [5, 5, 5],
            block: BlockRecord::new(stone),
        });
        assert!(chunk.has_fixups());
        chunk.apply_fixups(12);
        assert!(!chunk.has_fixups());
        assert_eq!(chunk.get(5, 5, 5).material(), stone);
        assert_eq!(chunk.dirty_since(), Some(12));
    }

    #[test]
    fn test_highest_opaque_in_column() {
        let (registry, stone) = stone_registry();
        let mut chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        chunk.put(3, 4, 7, BlockRecord::new(stone));
        chunk.put(3, 4, 20, BlockRecord::new(stone));
        assert_eq!(
            chunk.highest_opaque_in_column(3, 4, CHUNK_SIDE - 1, &registry),
            Some((stone, 20))
        );
        assert_eq!(
            chunk.highest_opaque_in_column(3, 4, 19, &registry),
            Some((stone, 7))
        );
        assert_eq!(chunk.highest_opaque_in_column(0, 0, 29, &registry), None);
    }
}
