//! What the planner needs from the world it streams.

use tessera_region::{ColumnView, LoadStatus, RegionState};
use tessera_voxel::record::{encode_blocks, encode_lod};
use tessera_voxel::{ChunkCoord, ColumnCoord, Reachability, Tier};

/// Read access to loaded chunks and columns, plus the two ways the planner
/// influences loading. Never blocks.
pub trait ChunkSource {
    /// Revision of the chunk at `coord` if it is ready.
    fn revision(&self, coord: ChunkCoord) -> Option<u64>;

    /// Reachability of the chunk at `coord` if it is ready.
    fn reachability(&self, coord: ChunkCoord) -> Option<Reachability>;

    /// Encoded payload of a ready chunk at `tier`.
    fn payload(&mut self, coord: ChunkCoord, tier: Tier) -> Option<Vec<u8>>;

    /// Asks for `coord` to be loaded in the background.
    fn request(&mut self, coord: ChunkCoord);

    /// Marks a loaded chunk as still wanted.
    fn keep_alive(&mut self, coord: ChunkCoord);

    /// The column's tops, tracking it if it is not yet.
    fn column(&mut self, column: ColumnCoord) -> Option<ColumnView<'_>>;
}

impl ChunkSource for RegionState {
    fn revision(&self, coord: ChunkCoord) -> Option<u64> {
        self.get(coord).map(|c| c.revision())
    }

    fn reachability(&self, coord: ChunkCoord) -> Option<Reachability> {
        self.get(coord).map(|c| c.reachability())
    }

    fn payload(&mut self, coord: ChunkCoord, tier: Tier) -> Option<Vec<u8>> {
        match tier {
            Tier::Full => self.get(coord).map(encode_blocks),
            _ => self.lod(coord, tier).map(|lod| encode_lod(&lod)),
        }
    }

    fn request(&mut self, coord: ChunkCoord) {
        if self.request_load(coord, None) == LoadStatus::Rejected {
            tracing::trace!("Load of chunk {coord} rejected; retrying next pass");
        }
    }

    fn keep_alive(&mut self, coord: ChunkCoord) {
        self.touch(coord);
    }

    fn column(&mut self, column: ColumnCoord) -> Option<ColumnView<'_>> {
        RegionState::column(self, column)
    }
}
