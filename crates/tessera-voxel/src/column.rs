//! Per-column "tops": the highest opaque block of every `(x, y)` cell in a
//! vertical column of chunks, plus the column's min/max surface heights.

use crate::block::MaterialId;
use crate::chunk::CHUNK_SIDE;
use crate::lod::{LodBuffer, Tier};

/// Cells in one column (30 × 30).
pub const COLUMN_CELLS: usize = CHUNK_SIDE * CHUNK_SIDE;

/// Height of a cell with no known opaque block.
pub const NO_HEIGHT: i32 = i32::MIN;

/// The best known opaque block of one `(x, y)` cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopCell {
    pub material: MaterialId,
    /// World-space `z` of the block, or [`NO_HEIGHT`].
    pub height: i32,
}

impl TopCell {
    pub const EMPTY: TopCell = TopCell {
        material: MaterialId::AIR,
        height: NO_HEIGHT,
    };

    pub fn new(material: MaterialId, height: i32) -> Self {
        Self { material, height }
    }

    pub fn is_empty(&self) -> bool {
        self.height == NO_HEIGHT
    }
}

/// Top cells for a whole column with cached bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnRecord {
    cells: Vec<TopCell>,
    min_height: i32,
    max_height: i32,
}

impl Default for ColumnRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnRecord {
    /// A column with no known tops.
    pub fn new() -> Self {
        Self {
            cells: vec![TopCell::EMPTY; COLUMN_CELLS],
            min_height: NO_HEIGHT,
            max_height: NO_HEIGHT,
        }
    }

    /// Builds a record from a full cell array. Returns `None` on a length mismatch.
    pub fn from_cells(cells: Vec<TopCell>) -> Option<Self> {
        if cells.len() != COLUMN_CELLS {
            return None;
        }
        let mut record = Self {
            cells,
            min_height: NO_HEIGHT,
            max_height: NO_HEIGHT,
        };
        record.recompute_bounds();
        Some(record)
    }

    pub fn cells(&self) -> &[TopCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> TopCell {
        self.cells.get(index).copied().unwrap_or(TopCell::EMPTY)
    }

    /// Replaces one cell. Returns `true` if it changed.
    pub fn set_cell(&mut self, index: usize, cell: TopCell) -> bool {
        let Some(slot) = self.cells.get_mut(index) else {
            return false;
        };
        if *slot == cell {
            return false;
        }
        *slot = cell;
        self.recompute_bounds();
        true
    }

    /// Lowest known top across the column, or [`NO_HEIGHT`] if any cell is
    /// unknown.
    pub fn min_height(&self) -> i32 {
        self.min_height
    }

    /// Highest known top across the column, or [`NO_HEIGHT`].
    pub fn max_height(&self) -> i32 {
        self.max_height
    }

    /// Overrides the cached bounds with persisted values.
    pub fn set_bounds(&mut self, min_height: i32, max_height: i32) {
        self.min_height = min_height;
        self.max_height = max_height;
    }

    pub fn recompute_bounds(&mut self) {
        if self.cells.iter().any(TopCell::is_empty) {
            self.min_height = NO_HEIGHT;
        } else {
            self.min_height = self.cells.iter().map(|c| c.height).min().unwrap_or(NO_HEIGHT);
        }
        self.max_height = self.cells.iter().map(|c| c.height).max().unwrap_or(NO_HEIGHT);
    }

    /// `true` if every block of chunk layer `chunk_z` lies below the lowest
    /// known top of the column.
    pub fn buries_layer(&self, chunk_z: i32) -> bool {
        if self.min_height == NO_HEIGHT {
            return false;
        }
        let layer_top = i64::from(chunk_z) * CHUNK_SIDE as i64 + CHUNK_SIDE as i64 - 1;
        layer_top < i64::from(self.min_height)
    }

    /// Tops grid as sent to viewers: two bytes (lo, hi) of material per cell.
    pub fn tops_payload(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(COLUMN_CELLS * 2);
        for cell in &self.cells {
            bytes.extend_from_slice(&cell.material.0.to_le_bytes());
        }
        bytes
    }

    /// Synthesizes a coarse LOD for chunk layer `chunk_z` from the tops alone.
    ///
    /// Every cell at or below a column's surface is treated as filled with
    /// that column's top material. Used for far tiers when the chunk itself
    /// is not loaded.
    pub fn synthesize_lod(&self, chunk_z: i32, tier: Tier) -> LodBuffer {
        let factor = tier.factor();
        let side = tier.side();
        let base_z = i64::from(chunk_z) * CHUNK_SIDE as i64;
        let mut cells = Vec::with_capacity(tier.volume());

        for dz in 0..side {
            let cube_bottom = base_z + (dz * factor) as i64;
            for dy in 0..side {
                for dx in 0..side {
                    cells.push(self.sample_square(dx, dy, factor, cube_bottom));
                }
            }
        }
        LodBuffer::from_cells(tier, cells).unwrap_or_else(|| LodBuffer::air(tier))
    }

    fn sample_square(&self, dx: usize, dy: usize, factor: usize, cube_bottom: i64) -> MaterialId {
        let mut best: Option<TopCell> = None;
        for y in dy * factor..(dy + 1) * factor {
            for x in dx * factor..(dx + 1) * factor {
                let cell = self.cells[x + y * CHUNK_SIDE];
                if cell.is_empty() || i64::from(cell.height) < cube_bottom {
                    continue;
                }
                if best.is_none_or(|b| cell.height > b.height) {
                    best = Some(cell);
                }
            }
        }
        best.map_or(MaterialId::AIR, |c| c.material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_column_is_unknown() {
        let record = ColumnRecord::new();
        assert_eq!(record.min_height(), NO_HEIGHT);
        assert_eq!(record.max_height(), NO_HEIGHT);
        assert!(!record.buries_layer(-100));
    }

    #[test]
    fn test_bounds_follow_cells() {
        let cells = (0..COLUMN_CELLS)
            .map(|i| TopCell::new(MaterialId(1), 10 + (i % 5) as i32))
            .collect();
        let mut record = ColumnRecord::from_cells(cells).unwrap();
        assert_eq!(record.min_height(), 10);
        assert_eq!(record.max_height(), 14);

        assert!(record.set_cell(0, TopCell::new(MaterialId(2), 90)));
        assert_eq!(record.max_height(), 90);
        assert!(!record.set_cell(0, TopCell::new(MaterialId(2), 90)));

        // Layer -1 spans z in [-30, -1], all below height 10.
        assert!(record.buries_layer(-1));
        assert!(!record.buries_layer(0));
    }

    #[test]
    fn test_synthesized_lod_fills_below_surface() {
        let cells = vec![TopCell::new(MaterialId(4), 12); COLUMN_CELLS];
        let record = ColumnRecord::from_cells(cells).unwrap();

        let lod = record.synthesize_lod(0, Tier::Lod5);
        // Cubes start at z = 0, 5, 10, 15, ...; the surface at 12 covers the first three.
        assert_eq!(lod.get(0, 0, 2), MaterialId(4));
        assert_eq!(lod.get(0, 0, 3), MaterialId::AIR);

        let above = record.synthesize_lod(1, Tier::Lod15);
        assert!(above.is_all_air());
    }

    #[test]
    fn test_tops_payload_is_two_bytes_per_cell() {
        let mut record = ColumnRecord::new();
        record.set_cell(1, TopCell::new(MaterialId(0x0102), 3));
        let payload = record.tops_payload();
        assert_eq!(payload.len(), COLUMN_CELLS * 2);
        assert_eq!(&payload[2..4], &[0x02, 0x01]);
    }
}
