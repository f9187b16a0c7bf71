//! Contracts for the systems the region hands chunks to: terrain
//! generation, physics, and entities.

use rustc_hash::FxHashMap;
use tessera_voxel::{Chunk, ChunkCoord, EntityRecord};

/// Errors raised by a [`TerrainGenerator`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum GenerateError {
    /// The generator has no terrain for this coordinate.
    #[error("chunk {0} lies outside the generated world")]
    OutOfBounds(ChunkCoord),
    /// Any other generator failure.
    #[error("{0}")]
    Failed(String),
}

/// Fills a freshly created chunk with terrain.
///
/// Called from worker threads. The chunk arrives all air and flagged
/// unpopulated; generators write blocks with [`Chunk::put`] and may queue
/// entities or fix-ups on it.
pub trait TerrainGenerator: Send + Sync {
    fn generate(&self, seed: u64, chunk: &mut Chunk) -> Result<(), GenerateError>;
}

/// Handle to a chunk's collision geometry inside the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysicsProxy(pub u64);

/// The physics engine, driven only from the tick thread.
pub trait PhysicsWorld {
    fn register(&mut self, chunk: &Chunk) -> PhysicsProxy;
    fn unregister(&mut self, proxy: PhysicsProxy);
}

/// The entity system, driven only from the tick thread.
pub trait EntityWorld {
    /// Spawns an entity that belongs to chunk `coord`.
    fn spawn(&mut self, coord: ChunkCoord, entity: EntityRecord);
    /// Entities currently living in chunk `coord`, as they should be saved.
    fn residents(&self, coord: ChunkCoord) -> Vec<EntityRecord>;
    /// Removes every entity living in chunk `coord`.
    fn despawn_residents(&mut self, coord: ChunkCoord);
}

/// A physics world that hands out proxies and does nothing else.
#[derive(Debug, Default)]
pub struct NoPhysics {
    next: u64,
    live: usize,
}

impl NoPhysics {
    pub fn live_proxies(&self) -> usize {
        self.live
    }
}

impl PhysicsWorld for NoPhysics {
    fn register(&mut self, _chunk: &Chunk) -> PhysicsProxy {
        self.next += 1;
        self.live += 1;
        PhysicsProxy(self.next)
    }

    fn unregister(&mut self, _proxy: PhysicsProxy) {
        self.live = self.live.saturating_sub(1);
    }
}

/// An entity world that only records which entities live where.
#[derive(Debug, Default)]
pub struct EntityLedger {
    residents: FxHashMap<ChunkCoord, Vec<EntityRecord>>,
}

impl EntityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entities across all chunks.
    pub fn len(&self) -> usize {
        self.residents.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityWorld for EntityLedger {
    fn spawn(&mut self, coord: ChunkCoord, entity: EntityRecord) {
        self.residents.entry(coord).or_default().push(entity);
    }

    fn residents(&self, coord: ChunkCoord) -> Vec<EntityRecord> {
        self.residents.get(&coord).cloned().unwrap_or_default()
    }

    fn despawn_residents(&mut self, coord: ChunkCoord) {
        self.residents.remove(&coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_tracks_residents_per_chunk() {
        let mut ledger = EntityLedger::new();
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(1, 0, 0);
        ledger.spawn(a, EntityRecord::new("cow", 1, 0));
        ledger.spawn(a, EntityRecord::new("cow", 2, 0));
        ledger.spawn(b, EntityRecord::new("pig", 3, 0));

        assert_eq!(ledger.residents(a).len(), 2);
        ledger.despawn_residents(a);
        assert!(ledger.residents(a).is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_no_physics_counts_live_proxies() {
        let mut physics = NoPhysics::default();
        let chunk = Chunk::new_air(ChunkCoord::new(0, 0, 0));
        let p1 = physics.register(&chunk);
        let p2 = physics.register(&chunk);
        assert_ne!(p1, p2);
        physics.unregister(p1);
        assert_eq!(physics.live_proxies(), 1);
    }
}
