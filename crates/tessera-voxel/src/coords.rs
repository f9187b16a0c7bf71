//! Chunk and column coordinates, plus the six chunk faces.
//!
//! The vertical axis is `z`: a column is every chunk sharing the same `(x, y)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chunk::CHUNK_SIDE;

/// Identifies a chunk's position on the chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the coordinate offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Returns the chunk adjacent across `face`.
    pub fn neighbor(self, face: Face) -> Self {
        let (dx, dy, dz) = face.offset();
        self.offset(dx, dy, dz)
    }

    /// The column this chunk belongs to.
    pub fn column(self) -> ColumnCoord {
        ColumnCoord::new(self.x, self.y)
    }

    /// Chebyshev (chessboard) distance in chunks.
    pub fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        dx.max(dy).max(dz)
    }

    /// The chunk containing world block `(wx, wy, wz)` and the block's local
    /// coordinates inside it.
    pub fn from_world_block(wx: i64, wy: i64, wz: i64) -> (Self, [u8; 3]) {
        let side = CHUNK_SIDE as i64;
        let coord = Self::new(
            wx.div_euclid(side) as i32,
            wy.div_euclid(side) as i32,
            wz.div_euclid(side) as i32,
        );
        let local = [
            wx.rem_euclid(side) as u8,
            wy.rem_euclid(side) as u8,
            wz.rem_euclid(side) as u8,
        ];
        (coord, local)
    }

    /// The chunk containing a world-space position measured in blocks.
    pub fn from_world_position(x: f64, y: f64, z: f64) -> Self {
        let side = CHUNK_SIDE as f64;
        Self::new(
            (x / side).floor() as i32,
            (y / side).floor() as i32,
            (z / side).floor() as i32,
        )
    }

    /// World block coordinates of this chunk's `(0, 0, 0)` corner.
    pub fn origin(self) -> [i64; 3] {
        let side = CHUNK_SIDE as i64;
        [
            i64::from(self.x) * side,
            i64::from(self.y) * side,
            i64::from(self.z) * side,
        ]
    }

    /// World-space center of the chunk, in blocks.
    pub fn center(self) -> [f64; 3] {
        let half = CHUNK_SIDE as f64 / 2.0;
        let [x, y, z] = self.origin();
        [x as f64 + half, y as f64 + half, z as f64 + half]
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identifies a vertical column of chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnCoord {
    pub x: i32,
    pub y: i32,
}

impl ColumnCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The column containing world block `(wx, wy)` and the cell index inside it.
    pub fn from_world_block(wx: i64, wy: i64) -> (Self, usize) {
        let side = CHUNK_SIDE as i64;
        let column = Self::new(wx.div_euclid(side) as i32, wy.div_euclid(side) as i32);
        let cell = wx.rem_euclid(side) as usize + wy.rem_euclid(side) as usize * CHUNK_SIDE;
        (column, cell)
    }
}

impl fmt::Display for ColumnCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the six faces of a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::NegX,
        Face::PosX,
        Face::NegY,
        Face::PosY,
        Face::NegZ,
        Face::PosZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Self {
        match self {
            Face::NegX => Face::PosX,
            Face::PosX => Face::NegX,
            Face::NegY => Face::PosY,
            Face::PosY => Face::NegY,
            Face::NegZ => Face::PosZ,
            Face::PosZ => Face::NegZ,
        }
    }

    /// Unit chunk-grid step across this face.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::NegX => (-1, 0, 0),
            Face::PosX => (1, 0, 0),
            Face::NegY => (0, -1, 0),
            Face::PosY => (0, 1, 0),
            Face::NegZ => (0, 0, -1),
            Face::PosZ => (0, 0, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_block_to_chunk_handles_negatives() {
        let (coord, local) = ChunkCoord::from_world_block(-1, 0, 31);
        assert_eq!(coord, ChunkCoord::new(-1, 0, 1));
        assert_eq!(local, [29, 0, 1]);

        let (coord, local) = ChunkCoord::from_world_block(-30, -31, 29);
        assert_eq!(coord, ChunkCoord::new(-1, -2, 0));
        assert_eq!(local, [0, 29, 29]);
    }

    #[test]
    fn test_world_position_to_chunk() {
        assert_eq!(
            ChunkCoord::from_world_position(15.0, -0.5, 60.0),
            ChunkCoord::new(0, -1, 2)
        );
    }

    #[test]
    fn test_chebyshev_distance() {
        let a = ChunkCoord::new(0, 0, 0);
        assert_eq!(a.chebyshev(ChunkCoord::new(3, -1, 2)), 3);
        assert_eq!(a.chebyshev(a), 0);
        assert_eq!(a.chebyshev(ChunkCoord::new(0, 0, -5)), 5);
    }

    #[test]
    fn test_neighbor_and_opposite() {
        let c = ChunkCoord::new(4, 5, 6);
        for face in Face::ALL {
            assert_eq!(c.neighbor(face).neighbor(face.opposite()), c);
        }
        assert_eq!(c.neighbor(Face::PosZ), ChunkCoord::new(4, 5, 7));
    }

    #[test]
    fn test_column_cell_index() {
        let (column, cell) = ColumnCoord::from_world_block(31, -1);
        assert_eq!(column, ColumnCoord::new(1, -1));
        assert_eq!(cell, 1 + 29 * CHUNK_SIDE);
    }
}
