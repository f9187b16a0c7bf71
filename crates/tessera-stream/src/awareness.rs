//! What one viewer has been told: the tier and revision of every chunk it
//! holds, and the revision of every column tops grid it holds.

use rustc_hash::{FxHashMap, FxHashSet};
use tessera_voxel::{ChunkCoord, ColumnCoord, Tier};

/// A chunk as the viewer currently knows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Known {
    pub tier: Tier,
    /// Revision of the content sent. `0` marks content synthesized from
    /// column data.
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct Awareness {
    chunks: FxHashMap<ChunkCoord, Known>,
    columns: FxHashMap<ColumnCoord, u64>,
}

impl Awareness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<Known> {
        self.chunks.get(&coord).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkCoord, Known)> + '_ {
        self.chunks.iter().map(|(c, k)| (*c, *k))
    }

    /// Whether `coord`, required at `tier` with content `revision`, must be
    /// sent.
    ///
    /// A finer tier always supersedes what is known. At the known tier or a
    /// coarser one the chunk is only re-sent when its content differs; a
    /// merely coarser requirement keeps the finer data the viewer already has.
    pub fn needs_send(&self, coord: ChunkCoord, tier: Tier, revision: u64) -> bool {
        match self.chunks.get(&coord) {
            None => true,
            Some(known) if tier.is_finer_than(known.tier) => true,
            Some(known) => known.revision != revision,
        }
    }

    pub fn record_sent(&mut self, coord: ChunkCoord, tier: Tier, revision: u64) {
        self.chunks.insert(coord, Known { tier, revision });
    }

    pub fn forget(&mut self, coord: ChunkCoord) -> Option<Known> {
        self.chunks.remove(&coord)
    }

    /// Revision of the tops grid last sent for `column`.
    pub fn column_revision(&self, column: ColumnCoord) -> Option<u64> {
        self.columns.get(&column).copied()
    }

    pub fn record_column(&mut self, column: ColumnCoord, revision: u64) {
        self.columns.insert(column, revision);
    }

    /// Columns holding at least one known chunk.
    pub fn active_columns(&self) -> Vec<ColumnCoord> {
        let mut columns: Vec<ColumnCoord> = self.chunks.keys().map(|c| c.column()).collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    /// Drops tops bookkeeping for columns with no known chunk left.
    pub fn prune_columns(&mut self) {
        let active: FxHashSet<ColumnCoord> = self.chunks.keys().map(|c| c.column()).collect();
        self.columns.retain(|column, _| active.contains(column));
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.columns.clear();
    }
}
