//! Level-of-detail tiers and "most-opaque-wins" downsampling.
//!
//! A chunk is 30 blocks on a side, so each tier is named after its
//! downsample factor: tier 1 is the full block array, tier 2 holds 15³ cells,
//! tier 5 holds 6³, tier 6 holds 5³, and tier 15 holds 2³.

use std::fmt;

use crate::block::{BlockRecord, MaterialId};
use crate::chunk::CHUNK_SIDE;
use crate::registry::{MaterialRegistry, RANK_OPAQUE};

/// One of the five visibility tiers, finest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Full detail (factor 1).
    Full,
    /// Factor 2, 15 cells per axis.
    Lod2,
    /// Factor 5, 6 cells per axis.
    Lod5,
    /// Factor 6, 5 cells per axis.
    Lod6,
    /// Factor 15, 2 cells per axis.
    Lod15,
}

impl Tier {
    /// All tiers from finest to coarsest.
    pub const ALL: [Tier; 5] = [Tier::Full, Tier::Lod2, Tier::Lod5, Tier::Lod6, Tier::Lod15];

    /// Tiers whose buffers are cached on every chunk and persisted.
    pub const CACHED: [Tier; 3] = [Tier::Lod2, Tier::Lod5, Tier::Lod6];

    /// Position in [`Tier::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Downsample factor relative to the full block array.
    pub fn factor(self) -> usize {
        match self {
            Tier::Full => 1,
            Tier::Lod2 => 2,
            Tier::Lod5 => 5,
            Tier::Lod6 => 6,
            Tier::Lod15 => 15,
        }
    }

    /// Cells per axis at this tier.
    pub fn side(self) -> usize {
        CHUNK_SIDE / self.factor()
    }

    /// Cells in a full buffer at this tier.
    pub fn volume(self) -> usize {
        let side = self.side();
        side * side * side
    }

    /// `true` if `self` carries strictly more detail than `other`.
    pub fn is_finer_than(self, other: Tier) -> bool {
        self < other
    }

    /// How many tier steps coarser `self` is than `other` (0 if not coarser).
    pub fn steps_coarser_than(self, other: Tier) -> usize {
        self.index().saturating_sub(other.index())
    }

    /// Tiers at factor 5 and above may be answered from column data.
    pub fn is_far(self) -> bool {
        self >= Tier::Lod5
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier-{}", self.factor())
    }
}

/// A downsampled material grid for one chunk at one tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LodBuffer {
    tier: Tier,
    cells: Vec<MaterialId>,
}

impl LodBuffer {
    /// An all-air buffer.
    pub fn air(tier: Tier) -> Self {
        Self {
            tier,
            cells: vec![MaterialId::AIR; tier.volume()],
        }
    }

    /// Wraps an existing cell array; returns `None` if the length is wrong.
    pub fn from_cells(tier: Tier, cells: Vec<MaterialId>) -> Option<Self> {
        (cells.len() == tier.volume()).then_some(Self { tier, cells })
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn cells(&self) -> &[MaterialId] {
        &self.cells
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> MaterialId {
        let side = self.tier.side();
        self.cells[x + y * side + z * side * side]
    }

    pub fn is_all_air(&self) -> bool {
        self.cells.iter().all(|m| m.is_air())
    }

    /// Flat byte form: two bytes (lo, hi) per cell.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.cells.len() * 2);
        for cell in &self.cells {
            bytes.extend_from_slice(&cell.0.to_le_bytes());
        }
        bytes
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(tier: Tier, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != tier.volume() * 2 {
            return None;
        }
        let cells = bytes
            .chunks_exact(2)
            .map(|pair| MaterialId(u16::from_le_bytes([pair[0], pair[1]])))
            .collect();
        Some(Self { tier, cells })
    }

    /// Derives this tier directly from a full chunk block array.
    pub fn derive(blocks: &[BlockRecord], tier: Tier, registry: &MaterialRegistry) -> Self {
        let materials: Vec<MaterialId> = blocks.iter().map(BlockRecord::material).collect();
        let cells = reduce(&materials, CHUNK_SIDE, tier.factor(), registry);
        Self { tier, cells }
    }

    /// Derives a coarser tier from this buffer. The coarser factor must be a
    /// multiple of this buffer's factor.
    pub fn coarsen(&self, tier: Tier, registry: &MaterialRegistry) -> Option<Self> {
        if tier.factor() % self.tier.factor() != 0 || tier < self.tier {
            return None;
        }
        let step = tier.factor() / self.tier.factor();
        let cells = reduce(&self.cells, self.tier.side(), step, registry);
        Some(Self { tier, cells })
    }
}

/// Downsamples a cubic material grid by `factor`, keeping the most opaque
/// material of each `factor³` sub-cube.
///
/// Ties keep the first material met in x-fastest scan order, so any non-air
/// material beats air. An opaque material ends the scan of its sub-cube.
pub fn reduce(
    src: &[MaterialId],
    src_side: usize,
    factor: usize,
    registry: &MaterialRegistry,
) -> Vec<MaterialId> {
    debug_assert_eq!(src.len(), src_side * src_side * src_side);
    debug_assert!(factor > 0 && src_side % factor == 0);

    if factor == 1 {
        return src.to_vec();
    }

    let dst_side = src_side / factor;
    let mut dst = Vec::with_capacity(dst_side * dst_side * dst_side);

    for dz in 0..dst_side {
        for dy in 0..dst_side {
            for dx in 0..dst_side {
                dst.push(reduce_cell(src, src_side, factor, (dx, dy, dz), registry));
            }
        }
    }
    dst
}

fn reduce_cell(
    src: &[MaterialId],
    src_side: usize,
    factor: usize,
    (dx, dy, dz): (usize, usize, usize),
    registry: &MaterialRegistry,
) -> MaterialId {
    let mut best = MaterialId::AIR;
    let mut best_rank = 0u8;

    for z in dz * factor..(dz + 1) * factor {
        for y in dy * factor..(dy + 1) * factor {
            for x in dx * factor..(dx + 1) * factor {
                let material = src[x + y * src_side + z * src_side * src_side];
                let rank = registry.opacity_rank(material);
                if rank == RANK_OPAQUE {
                    return material;
                }
                if rank > best_rank {
                    best = material;
                    best_rank = rank;
                }
            }
        }
    }
    best
}
