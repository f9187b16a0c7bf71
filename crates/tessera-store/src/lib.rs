//! Persistent chunk storage.
//!
//! A [`ChunkStore`] holds independent byte records grouped into families:
//! blocks, cached LODs, and entities keyed by chunk coordinate, plus column
//! tops and heights keyed by column coordinate. Records are opaque bytes
//! here; the codecs live in `tessera_voxel::record`. The helpers in
//! [`records`] decode them and turn every failure into "no prior save".

mod dir;
mod error;
mod family;
mod memory;
pub mod records;

pub use dir::DirStore;
pub use error::StoreError;
pub use family::{RecordFamily, RecordKey};
pub use memory::MemoryStore;

/// Byte-level persistent storage keyed by record family and coordinate.
///
/// Implementations must tolerate concurrent calls from worker threads.
pub trait ChunkStore: Send + Sync {
    /// Reads a record. `Ok(None)` means it was never written.
    fn read(&self, family: RecordFamily, key: RecordKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a record, replacing any previous value.
    fn write(&self, family: RecordFamily, key: RecordKey, bytes: &[u8]) -> Result<(), StoreError>;

    /// Removes a record. Removing a missing record is not an error.
    fn remove(&self, family: RecordFamily, key: RecordKey) -> Result<(), StoreError>;
}
