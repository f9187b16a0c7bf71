use tessera_voxel::ChunkCoord;

use crate::collab::GenerateError;

/// Failures reported by region operations. None of them are fatal to the
/// tick; callers retry or leave the chunk absent.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RegionError {
    /// The chunk is not loaded and ready.
    #[error("chunk {0} is not loaded")]
    NotLoaded(ChunkCoord),
    /// A store-only population found no usable record.
    #[error("chunk {0} has no stored record")]
    NotInStore(ChunkCoord),
    /// The terrain generator failed.
    #[error("terrain generation failed for chunk {coord}: {source}")]
    Generate {
        coord: ChunkCoord,
        #[source]
        source: GenerateError,
    },
    /// The population was discarded before it finished.
    #[error("population of chunk {0} was abandoned")]
    Abandoned(ChunkCoord),
    /// The job queue is full; retry on a later tick.
    #[error("job queue is full")]
    QueueFull,
    /// The worker pool has shut down.
    #[error("worker pool has shut down")]
    PoolClosed,
}
