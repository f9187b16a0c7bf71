//! Voxel block records, chunk containers, reachability, LOD derivation, and
//! the byte codecs used to persist and stream them.

pub mod block;
pub mod chunk;
pub mod column;
pub mod coords;
pub mod entity;
pub mod lod;
pub mod reachability;
pub mod record;
pub mod registry;

pub use block::{BlockRecord, LocalFlags, MAX_MATERIALS, MaterialId};
pub use chunk::{CHUNK_SIDE, CHUNK_VOLUME, Chunk, ChunkFlags, Fixup};
pub use column::{COLUMN_CELLS, ColumnRecord, NO_HEIGHT, TopCell};
pub use coords::{ChunkCoord, ColumnCoord, Face};
pub use entity::{EntityDocument, EntityRecord};
pub use lod::{LodBuffer, Tier};
pub use reachability::Reachability;
pub use record::{BlockRecordData, RecordError};
pub use registry::{MaterialDef, MaterialRegistry, RegistryError, Transparency};
