//! The column height index: highest opaque block per `(x, y)` column.
//!
//! A column is tracked while any of its chunk layers is loaded, or while a
//! viewer has recently asked for it. Its record is loaded from the store the
//! first time the column is tracked and flushed back when the last loaded
//! layer goes away. Only the tick thread touches the index.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tessera_voxel::{
    CHUNK_SIDE, Chunk, ChunkCoord, ColumnCoord, ColumnRecord, MaterialId, MaterialRegistry,
    TopCell,
};

struct ColumnEntry {
    record: ColumnRecord,
    /// Chunk `z` layers of this column currently loaded.
    layers: BTreeSet<i32>,
    /// Bumped whenever a cell changes.
    revision: u64,
    /// The stored record has been merged in.
    warm: bool,
    /// Holds changes the store does not have yet.
    dirty: bool,
    last_touched: u64,
}

impl ColumnEntry {
    fn new(tick: u64) -> Self {
        Self {
            record: ColumnRecord::new(),
            layers: BTreeSet::new(),
            revision: 1,
            warm: false,
            dirty: false,
            last_touched: tick,
        }
    }

    fn changed(&mut self) {
        self.revision += 1;
        self.dirty = true;
    }
}

/// Read-only view of a tracked column.
#[derive(Clone, Copy, Debug)]
pub struct ColumnView<'a> {
    /// Best known top per cell.
    pub record: &'a ColumnRecord,
    /// Bumped whenever a cell changes; viewers resend on a new value.
    pub revision: u64,
    /// The stored record has been merged in.
    pub warm: bool,
}

/// Highest opaque block per cell of every tracked column.
#[derive(Default)]
pub struct ColumnHeightIndex {
    columns: FxHashMap<ColumnCoord, ColumnEntry>,
}

impl ColumnHeightIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Starts tracking `column` if needed. Returns `true` if the caller must
    /// load its stored record.
    fn track(&mut self, column: ColumnCoord, tick: u64) -> (&mut ColumnEntry, bool) {
        let mut created = false;
        let entry = self.columns.entry(column).or_insert_with(|| {
            created = true;
            ColumnEntry::new(tick)
        });
        entry.last_touched = tick;
        (entry, created)
    }

    /// Records that chunk `coord` was loaded. Returns `true` if the column's
    /// stored record must now be loaded.
    pub fn notice_loaded(&mut self, coord: ChunkCoord, tick: u64) -> bool {
        let (entry, created) = self.track(coord.column(), tick);
        entry.layers.insert(coord.z);
        created
    }

    /// Records that chunk `coord` was unloaded. Returns the record to flush
    /// when the last loaded layer went away with unsaved changes.
    pub fn notice_unloaded(&mut self, coord: ChunkCoord, tick: u64) -> Option<ColumnRecord> {
        let entry = self.columns.get_mut(&coord.column())?;
        entry.layers.remove(&coord.z);
        entry.last_touched = tick;
        if entry.layers.is_empty() && entry.dirty && entry.warm {
            entry.dirty = false;
            return Some(entry.record.clone());
        }
        None
    }

    /// Marks `column` as wanted without loading any chunk. Returns `true` if
    /// its stored record must now be loaded.
    pub fn touch(&mut self, column: ColumnCoord, tick: u64) -> bool {
        self.track(column, tick).1
    }

    /// Merges a stored record into a column that was waiting for it.
    ///
    /// Cells learned from loaded chunks before the record arrived win when
    /// they are higher.
    pub fn on_loaded(&mut self, column: ColumnCoord, stored: Option<ColumnRecord>) {
        let Some(entry) = self.columns.get_mut(&column) else {
            return;
        };
        if entry.warm {
            return;
        }
        entry.warm = true;
        let Some(stored) = stored else {
            return;
        };
        let mut changed = false;
        for (i, cell) in stored.cells().iter().enumerate() {
            let current = entry.record.cell(i);
            if !cell.is_empty() && (current.is_empty() || cell.height > current.height) {
                entry.record.set_cell(i, *cell);
                changed = true;
            }
        }
        if changed {
            entry.revision += 1;
        }
    }

    /// What is known of `column`, if it is tracked.
    pub fn view(&self, column: ColumnCoord) -> Option<ColumnView<'_>> {
        self.columns.get(&column).map(|e| ColumnView {
            record: &e.record,
            revision: e.revision,
            warm: e.warm,
        })
    }

    /// Current revision of `column`, if it is tracked.
    pub fn revision(&self, column: ColumnCoord) -> Option<u64> {
        self.columns.get(&column).map(|e| e.revision)
    }

    /// Best known opaque block of world column `(wx, wy)`.
    pub fn highest_opaque_at(&self, wx: i64, wy: i64) -> Option<TopCell> {
        let (column, cell) = ColumnCoord::from_world_block(wx, wy);
        let top = self.columns.get(&column)?.record.cell(cell);
        (!top.is_empty()).then_some(top)
    }

    /// Raises tops from a chunk's contents. Returns `true` if anything changed.
    pub fn push_chunk(&mut self, chunk: &Chunk, registry: &MaterialRegistry) -> bool {
        let coord = chunk.coord();
        let Some(entry) = self.columns.get_mut(&coord.column()) else {
            return false;
        };
        let base_z = coord.origin()[2];
        let mut changed = false;
        for ly in 0..CHUNK_SIDE {
            for lx in 0..CHUNK_SIDE {
                let Some((material, lz)) =
                    chunk.highest_opaque_in_column(lx, ly, CHUNK_SIDE - 1, registry)
                else {
                    continue;
                };
                let Ok(height) = i32::try_from(base_z + lz as i64) else {
                    continue;
                };
                let i = lx + ly * CHUNK_SIDE;
                let current = entry.record.cell(i);
                if current.is_empty() || height > current.height {
                    entry.record.set_cell(i, TopCell::new(material, height));
                    changed = true;
                }
            }
        }
        if changed {
            entry.changed();
        }
        changed
    }

    /// Applies a single block edit at world `(wx, wy, wz)`.
    ///
    /// An opaque block at or above the current top becomes the new top with
    /// no scan. Replacing the current top with a non-opaque block rescans the
    /// column top-down through `scan`, which returns the highest opaque block
    /// of a local column in a loaded chunk. Returns `true` if the top changed.
    pub fn push_edit(
        &mut self,
        (wx, wy, wz): (i64, i64, i64),
        material: MaterialId,
        registry: &MaterialRegistry,
        mut scan: impl FnMut(ChunkCoord, usize, usize) -> Option<(MaterialId, usize)>,
    ) -> bool {
        let (column, cell) = ColumnCoord::from_world_block(wx, wy);
        let Some(entry) = self.columns.get_mut(&column) else {
            return false;
        };
        let Ok(wz) = i32::try_from(wz) else {
            tracing::trace!("Edit at height {wz} is outside the column range");
            return false;
        };
        let current = entry.record.cell(cell);

        let replacement = if registry.is_opaque(material) {
            if !current.is_empty() && wz < current.height {
                return false;
            }
            TopCell::new(material, wz)
        } else {
            if current.is_empty() || wz != current.height {
                return false;
            }
            let (lx, ly) = (cell % CHUNK_SIDE, cell / CHUNK_SIDE);
            entry
                .layers
                .iter()
                .rev()
                .find_map(|&z| {
                    let (material, lz) = scan(ChunkCoord::new(column.x, column.y, z), lx, ly)?;
                    let height = i64::from(z) * CHUNK_SIDE as i64 + lz as i64;
                    Some(TopCell::new(material, i32::try_from(height).ok()?))
                })
                .unwrap_or(TopCell::EMPTY)
        };

        if entry.record.set_cell(cell, replacement) {
            entry.changed();
            true
        } else {
            false
        }
    }

    /// Drops idle columns with no loaded layers. Returns dirty records that
    /// must be flushed.
    pub fn evict_idle(&mut self, tick: u64, idle_ticks: u64) -> Vec<(ColumnCoord, ColumnRecord)> {
        let mut flush = Vec::new();
        self.columns.retain(|column, entry| {
            let idle = entry.layers.is_empty() && tick.saturating_sub(entry.last_touched) >= idle_ticks;
            if idle && entry.dirty && entry.warm {
                flush.push((*column, entry.record.clone()));
            }
            !idle
        });
        flush
    }

    /// Takes every dirty record for a final flush.
    pub fn take_dirty(&mut self) -> Vec<(ColumnCoord, ColumnRecord)> {
        self.columns
            .iter_mut()
            .filter(|(_, e)| e.dirty && e.warm)
            .map(|(column, e)| {
                e.dirty = false;
                (*column, e.record.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_voxel::{BlockRecord, MaterialDef};

    fn registry() -> (MaterialRegistry, MaterialId) {
        let mut registry = MaterialRegistry::new();
        let stone = registry.register(MaterialDef::opaque("stone")).unwrap();
        (registry, stone)
    }

    fn no_scan(_: ChunkCoord, _: usize, _: usize) -> Option<(MaterialId, usize)> {
        panic!("column was rescanned")
    }

    #[test]
    fn test_first_layer_requests_load() {
        let mut index = ColumnHeightIndex::new();
        assert!(index.notice_loaded(ChunkCoord::new(0, 0, 0), 1));
        assert!(!index.notice_loaded(ChunkCoord::new(0, 0, 1), 1));
        assert!(!index.touch(ColumnCoord::new(0, 0), 2));
        assert!(index.touch(ColumnCoord::new(5, 5), 2));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_opaque_edit_at_top_needs_no_scan() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        index.notice_loaded(ChunkCoord::new(0, 0, 0), 0);
        index.on_loaded(ColumnCoord::new(0, 0), None);

        assert!(index.push_edit((3, 4, 10), stone, &registry, no_scan));
        assert_eq!(index.highest_opaque_at(3, 4), Some(TopCell::new(stone, 10)));

        // Above the top: raises it, still no scan.
        assert!(index.push_edit((3, 4, 25), stone, &registry, no_scan));
        assert_eq!(index.highest_opaque_at(3, 4).unwrap().height, 25);

        // Below the top: ignored.
        assert!(!index.push_edit((3, 4, 2), stone, &registry, no_scan));
        assert_eq!(index.revision(ColumnCoord::new(0, 0)), Some(3));
    }

    #[test]
    fn test_removing_top_rescans_loaded_layers() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        let coord = ChunkCoord::new(0, 0, 0);
        index.notice_loaded(coord, 0);
        index.push_edit((1, 1, 20), stone, &registry, no_scan);

        let mut scanned = Vec::new();
        let changed = index.push_edit((1, 1, 20), MaterialId::AIR, &registry, |c, lx, ly| {
            scanned.push((c, lx, ly));
            Some((stone, 7))
        });
        assert!(changed);
        assert_eq!(scanned, vec![(coord, 1, 1)]);
        assert_eq!(index.highest_opaque_at(1, 1).unwrap().height, 7);

        // Removing the last known block leaves the cell unknown.
        index.push_edit((1, 1, 7), MaterialId::AIR, &registry, |_, _, _| None);
        assert!(index.highest_opaque_at(1, 1).is_none());
    }

    #[test]
    fn test_air_edit_elsewhere_is_ignored() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        index.notice_loaded(ChunkCoord::new(0, 0, 0), 0);
        index.push_edit((0, 0, 5), stone, &registry, no_scan);
        assert!(!index.push_edit((0, 0, 3), MaterialId::AIR, &registry, no_scan));
    }

    #[test]
    fn test_push_chunk_raises_tops() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        let coord = ChunkCoord::new(0, 0, 1);
        index.notice_loaded(coord, 0);

        let mut chunk = Chunk::new_air(coord);
        chunk.put(2, 0, 4, BlockRecord::new(stone));
        assert!(index.push_chunk(&chunk, &registry));
        assert_eq!(index.highest_opaque_at(2, 0).unwrap().height, 34);
        assert!(index.highest_opaque_at(0, 0).is_none());
        assert!(!index.push_chunk(&chunk, &registry));
    }

    #[test]
    fn test_heights_beyond_i32_are_skipped() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        let coord = ChunkCoord::new(0, 0, i32::MAX / CHUNK_SIDE as i32 + 1);
        index.notice_loaded(coord, 0);

        let mut chunk = Chunk::new_air(coord);
        chunk.put(0, 0, 0, BlockRecord::new(stone));
        assert!(!index.push_chunk(&chunk, &registry));
        assert!(index.highest_opaque_at(0, 0).is_none());

        let too_high = i64::from(i32::MAX) + 1;
        assert!(!index.push_edit((0, 0, too_high), stone, &registry, no_scan));
        assert!(index.highest_opaque_at(0, 0).is_none());
        assert_eq!(index.revision(coord.column()), Some(1));
    }

    #[test]
    fn test_stored_record_merges_with_pushed_cells() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        let column = ColumnCoord::new(0, 0);
        index.notice_loaded(ChunkCoord::new(0, 0, 0), 0);
        index.push_edit((0, 0, 12), stone, &registry, no_scan);

        let mut stored = ColumnRecord::new();
        stored.set_cell(0, TopCell::new(stone, 3));
        stored.set_cell(1, TopCell::new(stone, 40));
        index.on_loaded(column, Some(stored));

        assert_eq!(index.highest_opaque_at(0, 0).unwrap().height, 12);
        assert_eq!(index.highest_opaque_at(1, 0).unwrap().height, 40);
        assert!(index.view(column).unwrap().warm);
    }

    #[test]
    fn test_last_unload_flushes_dirty_record() {
        let (registry, stone) = registry();
        let mut index = ColumnHeightIndex::new();
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(0, 0, 1);
        index.notice_loaded(a, 0);
        index.notice_loaded(b, 0);
        index.on_loaded(a.column(), None);
        index.push_edit((0, 0, 1), stone, &registry, no_scan);

        assert!(index.notice_unloaded(a, 5).is_none());
        let flushed = index.notice_unloaded(b, 5).unwrap();
        assert_eq!(flushed.cell(0).height, 1);
        assert!(index.take_dirty().is_empty());

        assert!(index.evict_idle(6, 10).is_empty());
        assert_eq!(index.len(), 1);
        assert!(index.evict_idle(20, 10).is_empty());
        assert!(index.is_empty());
        assert!(index.highest_opaque_at(0, 0).is_none());
    }
}
