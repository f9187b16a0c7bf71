//! The packed 5-byte voxel block record.
//!
//! ## Layout
//!
//! | Byte | Field |
//! |------|-------|
//! | 0..2 | Material word (`u16`, little-endian): bits 0..14 material id, bits 14..16 damage |
//! | 2 | Block data (liquid fill level, orientation, ...) |
//! | 3 | Paint |
//! | 4 | Local flags ([`LocalFlags`]) |

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Number of bits available for the material id inside the material word.
pub const MATERIAL_BITS: u32 = 14;

/// Size of the material id space (16384).
pub const MAX_MATERIALS: usize = 1 << MATERIAL_BITS;

const MATERIAL_MASK: u16 = (1 << MATERIAL_BITS) - 1;

/// Highest damage level that fits in the two top bits of the material word.
pub const MAX_DAMAGE: u8 = 3;

/// Compact material identifier (14 usable bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialId(pub u16);

impl MaterialId {
    /// Air is always material 0 so zeroed memory is empty space.
    pub const AIR: Self = Self(0);

    /// Returns `true` for material 0.
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Per-block bit flags stored in the fifth byte of a [`BlockRecord`].
///
/// Bit positions are part of the on-disk format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocalFlags(pub u8);

impl LocalFlags {
    /// The block was placed or changed by an edit rather than by generation.
    pub const EDITED: u8 = 1 << 0;
    /// The block carries power.
    pub const POWERED: u8 = 1 << 1;
    /// First of four consecutive "filled" bits (bits 2..6).
    pub const FILLED_0: u8 = 1 << 2;
    /// Second "filled" bit.
    pub const FILLED_1: u8 = 1 << 3;
    /// Third "filled" bit.
    pub const FILLED_2: u8 = 1 << 4;
    /// Fourth "filled" bit.
    pub const FILLED_3: u8 = 1 << 5;
    /// Derived state (lighting, liquid flow) must be recalculated.
    pub const NEEDS_RECALC: u8 = 1 << 6;
    /// The block cannot be edited by viewers.
    pub const PROTECTED: u8 = 1 << 7;

    /// Empty flag set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw byte value.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Sets the bits in `mask`.
    pub fn insert(&mut self, mask: u8) {
        self.0 |= mask;
    }

    /// Clears the bits in `mask`.
    pub fn remove(&mut self, mask: u8) {
        self.0 &= !mask;
    }

    pub fn is_edited(self) -> bool {
        self.contains(Self::EDITED)
    }

    pub fn is_powered(self) -> bool {
        self.contains(Self::POWERED)
    }

    pub fn needs_recalc(self) -> bool {
        self.contains(Self::NEEDS_RECALC)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// Returns the `index`-th filled bit (0..4).
    pub fn filled(self, index: u8) -> bool {
        debug_assert!(index < 4);
        self.contains(Self::FILLED_0 << index)
    }

    /// Sets or clears the `index`-th filled bit (0..4).
    pub fn set_filled(&mut self, index: u8, value: bool) {
        debug_assert!(index < 4);
        if value {
            self.insert(Self::FILLED_0 << index);
        } else {
            self.remove(Self::FILLED_0 << index);
        }
    }
}

/// One voxel: material + damage, block data, paint, and local flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockRecord {
    word: [u8; 2],
    data: u8,
    paint: u8,
    local: LocalFlags,
}

const_assert_eq!(std::mem::size_of::<BlockRecord>(), 5);

impl BlockRecord {
    /// The default block: air, no damage, no data.
    pub const AIR: Self = Self {
        word: [0, 0],
        data: 0,
        paint: 0,
        local: LocalFlags::empty(),
    };

    /// Creates an undamaged block of the given material.
    pub fn new(material: MaterialId) -> Self {
        Self::from_word(material.0 & MATERIAL_MASK)
    }

    /// Creates a block from its raw parts.
    pub fn from_parts(word: u16, data: u8, paint: u8, local: LocalFlags) -> Self {
        Self {
            word: word.to_le_bytes(),
            data,
            paint,
            local,
        }
    }

    fn from_word(word: u16) -> Self {
        Self {
            word: word.to_le_bytes(),
            ..Self::AIR
        }
    }

    /// The full 16-bit material word (material id + damage).
    pub fn word(&self) -> u16 {
        u16::from_le_bytes(self.word)
    }

    fn set_word(&mut self, word: u16) {
        self.word = word.to_le_bytes();
    }

    /// The material id, without the damage bits.
    pub fn material(&self) -> MaterialId {
        MaterialId(self.word() & MATERIAL_MASK)
    }

    /// Replaces the material, preserving damage.
    pub fn set_material(&mut self, material: MaterialId) {
        let word = (self.word() & !MATERIAL_MASK) | (material.0 & MATERIAL_MASK);
        self.set_word(word);
    }

    /// Damage level in `0..=3`.
    pub fn damage(&self) -> u8 {
        (self.word() >> MATERIAL_BITS) as u8
    }

    /// Sets the damage level; values above [`MAX_DAMAGE`] saturate.
    pub fn set_damage(&mut self, damage: u8) {
        let damage = u16::from(damage.min(MAX_DAMAGE));
        let word = (self.word() & MATERIAL_MASK) | (damage << MATERIAL_BITS);
        self.set_word(word);
    }

    /// Builder-style [`set_damage`](Self::set_damage).
    pub fn with_damage(mut self, damage: u8) -> Self {
        self.set_damage(damage);
        self
    }

    /// Material-specific state byte.
    pub fn data(&self) -> u8 {
        self.data
    }

    /// Replaces the material-specific state byte.
    pub fn set_data(&mut self, data: u8) {
        self.data = data;
    }

    /// Paint index; 0 means unpainted.
    pub fn paint(&self) -> u8 {
        self.paint
    }

    pub fn set_paint(&mut self, paint: u8) {
        self.paint = paint;
    }

    /// Per-block flag bits.
    pub fn local(&self) -> LocalFlags {
        self.local
    }

    /// Mutable access to the per-block flag bits.
    pub fn local_mut(&mut self) -> &mut LocalFlags {
        &mut self.local
    }

    /// Returns `true` if this is exactly the default air block.
    pub fn is_default(&self) -> bool {
        *self == Self::AIR
    }

    /// The two material-word bytes `[lo, hi]`.
    pub fn word_bytes(&self) -> [u8; 2] {
        self.word
    }
}
