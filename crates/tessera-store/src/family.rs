use std::fmt;

use tessera_voxel::{ChunkCoord, ColumnCoord, Tier};

use crate::error::StoreError;

/// The independent record families a store holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordFamily {
    /// Block array, flags, and reachability.
    Blocks,
    /// A cached LOD buffer. Only [`Tier::CACHED`] tiers are persisted.
    Lod(Tier),
    /// Entity document.
    Entities,
    /// Column top materials.
    Tops,
    /// Column top heights and min/max bounds.
    Heights,
}

impl RecordFamily {
    /// Short name used in directory layouts and logs.
    pub fn name(self) -> &'static str {
        match self {
            RecordFamily::Blocks => "blocks",
            RecordFamily::Lod(Tier::Full) => "lod1",
            RecordFamily::Lod(Tier::Lod2) => "lod2",
            RecordFamily::Lod(Tier::Lod5) => "lod5",
            RecordFamily::Lod(Tier::Lod6) => "lod6",
            RecordFamily::Lod(Tier::Lod15) => "lod15",
            RecordFamily::Entities => "entities",
            RecordFamily::Tops => "tops",
            RecordFamily::Heights => "heights",
        }
    }

    /// `true` for families keyed by [`ColumnCoord`].
    pub fn is_column_scoped(self) -> bool {
        matches!(self, RecordFamily::Tops | RecordFamily::Heights)
    }

    /// Rejects keys of the wrong scope.
    pub fn check_key(self, key: RecordKey) -> Result<(), StoreError> {
        let column_key = matches!(key, RecordKey::Column(_));
        if column_key != self.is_column_scoped() {
            return Err(StoreError::KeyMismatch { family: self, key });
        }
        Ok(())
    }
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coordinate a record is keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Chunk(ChunkCoord),
    Column(ColumnCoord),
}

impl RecordKey {
    /// File stem used by the directory backend.
    pub fn file_stem(self) -> String {
        match self {
            RecordKey::Chunk(c) => format!("{}_{}_{}", c.x, c.y, c.z),
            RecordKey::Column(c) => format!("{}_{}", c.x, c.y),
        }
    }
}

impl From<ChunkCoord> for RecordKey {
    fn from(coord: ChunkCoord) -> Self {
        RecordKey::Chunk(coord)
    }
}

impl From<ColumnCoord> for RecordKey {
    fn from(column: ColumnCoord) -> Self {
        RecordKey::Column(column)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Chunk(c) => write!(f, "chunk {c}"),
            RecordKey::Column(c) => write!(f, "column {c}"),
        }
    }
}
