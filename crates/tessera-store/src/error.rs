use std::path::PathBuf;

use crate::family::{RecordFamily, RecordKey};

/// Errors raised by [`ChunkStore`](crate::ChunkStore) backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure on a record path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A chunk-scoped family was addressed by a column key or vice versa.
    #[error("{family} records cannot be keyed by {key}")]
    KeyMismatch {
        family: RecordFamily,
        key: RecordKey,
    },
}
