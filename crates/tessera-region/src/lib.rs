//! The region chunk table and everything around it: background population
//! and saving, bucket-locked store access, the column height index, and the
//! contracts for terrain generation, physics, and entities.

mod collab;
mod column_index;
mod config;
mod error;
mod generator;
mod locks;
mod pipeline;
mod region;
mod table;
mod ticket;
mod worker;

pub use collab::{
    EntityLedger, EntityWorld, GenerateError, NoPhysics, PhysicsProxy, PhysicsWorld,
    TerrainGenerator,
};
pub use column_index::{ColumnHeightIndex, ColumnView};
pub use config::RegionConfig;
pub use error::RegionError;
pub use generator::{FlatGenerator, LayeredGenerator, StandardMaterials};
pub use locks::BucketLocks;
pub use pipeline::{ChunkPipeline, ChunkSnapshot, PopulateSource};
pub use region::{ChunkState, LoadCallback, LoadStatus, RegionState, RegionStats, ShutdownReport};
pub use table::{ChunkIndex, ChunkTable};
pub use ticket::{PopulateResult, PopulateTicket};
pub use worker::{Job, JobResult, WorkerPool};
