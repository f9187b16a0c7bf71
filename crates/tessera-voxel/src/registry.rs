//! Material registry: maps compact [`MaterialId`] values to [`MaterialDef`] metadata.
//!
//! The registry is built once at startup and shared read-only across worker
//! threads. Air is always ID 0 so that zero-initialized chunk memory
//! represents empty space.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{MAX_MATERIALS, MaterialId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How much a material blocks sight and passage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Fully blocks visibility; terminates LOD reduction and flood fills.
    Opaque,
    /// Partially transparent (e.g. water, leaves).
    SemiTransparent,
    /// Completely transparent (e.g. air, glass).
    FullyTransparent,
}

/// Full descriptor for a material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Human-readable name (e.g. "stone", "water").
    pub name: String,
    /// Whether entities collide with this material.
    pub solid: bool,
    /// Transparency mode.
    pub transparency: Transparency,
}

impl MaterialDef {
    /// Convenience constructor for a solid opaque material.
    pub fn opaque(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: true,
            transparency: Transparency::Opaque,
        }
    }

    /// Convenience constructor for a non-solid material with the given transparency.
    pub fn see_through(name: &str, transparency: Transparency) -> Self {
        Self {
            name: name.to_string(),
            solid: false,
            transparency,
        }
    }
}

/// Errors that can occur during material registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A material with the same name has already been registered.
    #[error("duplicate material name: {0}")]
    DuplicateName(String),
    /// All 16 384 material slots have been consumed.
    #[error("material registry is full (max {MAX_MATERIALS} materials)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Opacity rank used by LOD reduction. Higher ranks win.
pub const RANK_AIR: u8 = 0;
/// Rank of non-air, fully transparent materials.
pub const RANK_CLEAR: u8 = 1;
/// Rank of semi-transparent materials.
pub const RANK_SEMI: u8 = 2;
/// Rank of opaque materials; the highest possible rank.
pub const RANK_OPAQUE: u8 = 3;

/// Maps [`MaterialId`] → [`MaterialDef`] with O(1) lookup by index and by name.
pub struct MaterialRegistry {
    /// Dense array where `index == MaterialId.0`.
    materials: Vec<MaterialDef>,
    name_to_id: FxHashMap<String, MaterialId>,
}

impl MaterialRegistry {
    /// Creates a new registry with Air pre-registered as ID 0.
    pub fn new() -> Self {
        let air = MaterialDef::see_through("air", Transparency::FullyTransparent);
        let mut name_to_id = FxHashMap::default();
        name_to_id.insert(air.name.clone(), MaterialId::AIR);
        Self {
            materials: vec![air],
            name_to_id,
        }
    }

    /// Registers a new material and returns its assigned ID.
    ///
    /// IDs are assigned sequentially starting from 1 (0 is Air).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken, or
    /// [`RegistryError::RegistryFull`] once the 14-bit id space is exhausted.
    pub fn register(&mut self, def: MaterialDef) -> Result<MaterialId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.materials.len() >= MAX_MATERIALS {
            return Err(RegistryError::RegistryFull);
        }

        let id = MaterialId(self.materials.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.materials.push(def);
        Ok(id)
    }

    /// Returns the definition for a given ID, if registered.
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.materials.get(id.0 as usize)
    }

    /// Returns the ID for a named material, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<MaterialId> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the total number of registered materials (including Air).
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Returns `true` if only Air is registered.
    pub fn is_empty(&self) -> bool {
        self.materials.len() <= 1
    }

    /// Returns `true` if the material fully blocks sight.
    ///
    /// Unknown IDs are treated as opaque: a material written by a newer
    /// build is assumed to be a solid block.
    pub fn is_opaque(&self, id: MaterialId) -> bool {
        match self.materials.get(id.0 as usize) {
            Some(def) => def.transparency == Transparency::Opaque,
            None => !id.is_air(),
        }
    }

    /// Opacity rank: air < clear < semi-transparent < opaque.
    pub fn opacity_rank(&self, id: MaterialId) -> u8 {
        if id.is_air() {
            return RANK_AIR;
        }
        match self.materials.get(id.0 as usize).map(|def| def.transparency) {
            Some(Transparency::FullyTransparent) => RANK_CLEAR,
            Some(Transparency::SemiTransparent) => RANK_SEMI,
            Some(Transparency::Opaque) | None => RANK_OPAQUE,
        }
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let registry = MaterialRegistry::new();
        let air = registry.get(MaterialId::AIR).unwrap();
        assert_eq!(air.name, "air");
        assert!(!air.solid);
        assert_eq!(registry.opacity_rank(MaterialId::AIR), RANK_AIR);
    }

    #[test]
    fn test_register_returns_sequential_ids() {
        let mut registry = MaterialRegistry::new();
        let stone = registry.register(MaterialDef::opaque("stone")).unwrap();
        let water = registry
            .register(MaterialDef::see_through("water", Transparency::SemiTransparent))
            .unwrap();
        assert_eq!(stone, MaterialId(1));
        assert_eq!(water, MaterialId(2));
        assert_eq!(registry.lookup_by_name("water"), Some(water));
        assert_eq!(registry.lookup_by_name("lava"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = MaterialRegistry::new();
        registry.register(MaterialDef::opaque("stone")).unwrap();
        let result = registry.register(MaterialDef::opaque("stone"));
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_opacity_ranks_order() {
        let mut registry = MaterialRegistry::new();
        let stone = registry.register(MaterialDef::opaque("stone")).unwrap();
        let water = registry
            .register(MaterialDef::see_through("water", Transparency::SemiTransparent))
            .unwrap();
        let glass = registry
            .register(MaterialDef::see_through("glass", Transparency::FullyTransparent))
            .unwrap();

        assert!(registry.opacity_rank(stone) > registry.opacity_rank(water));
        assert!(registry.opacity_rank(water) > registry.opacity_rank(glass));
        assert!(registry.opacity_rank(glass) > registry.opacity_rank(MaterialId::AIR));
        assert!(registry.is_opaque(stone));
        assert!(!registry.is_opaque(glass));
    }

    #[test]
    fn test_unknown_material_is_opaque() {
        let registry = MaterialRegistry::new();
        assert!(registry.is_opaque(MaterialId(900)));
        assert_eq!(registry.opacity_rank(MaterialId(900)), RANK_OPAQUE);
    }
}
