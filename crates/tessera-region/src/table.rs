//! Arena storage for loaded chunks.
//!
//! Entries live in a slot vector and are addressed by a [`ChunkIndex`] that
//! carries the slot's generation, so an index kept past its entry's removal
//! resolves to nothing instead of to whatever reused the slot.

use rustc_hash::FxHashMap;
use tessera_voxel::ChunkCoord;

/// Generation-checked handle to a table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkIndex {
    slot: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

pub struct ChunkTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    index: FxHashMap<ChunkCoord, ChunkIndex>,
}

impl<T> Default for ChunkTable<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T> ChunkTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.index.contains_key(&coord)
    }

    /// Inserts an entry, replacing any previous entry for `coord`.
    pub fn insert(&mut self, coord: ChunkCoord, entry: T) -> ChunkIndex {
        self.remove(coord);
        let index = match self.free.pop() {
            Some(slot) => {
                let s = &mut self.slots[slot as usize];
                s.generation = s.generation.wrapping_add(1);
                s.entry = Some(entry);
                ChunkIndex {
                    slot,
                    generation: s.generation,
                }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                ChunkIndex {
                    slot,
                    generation: 0,
                }
            }
        };
        self.index.insert(coord, index);
        index
    }

    pub fn lookup(&self, coord: ChunkCoord) -> Option<ChunkIndex> {
        self.index.get(&coord).copied()
    }

    pub fn get_index(&self, index: ChunkIndex) -> Option<&T> {
        let slot = self.slots.get(index.slot as usize)?;
        (slot.generation == index.generation)
            .then_some(slot.entry.as_ref())
            .flatten()
    }

    pub fn get_index_mut(&mut self, index: ChunkIndex) -> Option<&mut T> {
        let slot = self.slots.get_mut(index.slot as usize)?;
        if slot.generation != index.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn get(&self, coord: ChunkCoord) -> Option<&T> {
        self.get_index(self.lookup(coord)?)
    }

    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut T> {
        let index = self.lookup(coord)?;
        self.get_index_mut(index)
    }

    pub fn remove(&mut self, coord: ChunkCoord) -> Option<T> {
        let index = self.index.remove(&coord)?;
        let entry = self.slots[index.slot as usize].entry.take();
        self.free.push(index.slot);
        entry
    }

    /// Coordinates of every entry, in no particular order.
    pub fn coords(&self) -> Vec<ChunkCoord> {
        self.index.keys().copied().collect()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkCoord, &T)> {
        self.index
            .iter()
            .filter_map(|(coord, index)| self.get_index(*index).map(|e| (*coord, e)))
    }
}
