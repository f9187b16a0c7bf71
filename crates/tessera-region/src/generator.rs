//! Reference terrain generators.

use noise::{NoiseFn, Simplex};
use tessera_voxel::{
    BlockRecord, CHUNK_SIDE, Chunk, MaterialDef, MaterialId, MaterialRegistry, RegistryError,
    Transparency,
};

use crate::collab::{GenerateError, TerrainGenerator};

/// The materials the reference generators place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardMaterials {
    pub stone: MaterialId,
    pub dirt: MaterialId,
    pub grass: MaterialId,
    pub water: MaterialId,
    pub glass: MaterialId,
}

impl StandardMaterials {
    /// Registers the standard palette.
    pub fn register(registry: &mut MaterialRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            stone: registry.register(MaterialDef::opaque("stone"))?,
            dirt: registry.register(MaterialDef::opaque("dirt"))?,
            grass: registry.register(MaterialDef::opaque("grass"))?,
            water: registry.register(MaterialDef::see_through(
                "water",
                Transparency::SemiTransparent,
            ))?,
            glass: registry.register(MaterialDef::see_through(
                "glass",
                Transparency::FullyTransparent,
            ))?,
        })
    }
}

/// Fills `chunk` column by column from a surface height function.
fn fill_columns(
    chunk: &mut Chunk,
    materials: &StandardMaterials,
    sea_level: Option<i64>,
    surface: impl Fn(i64, i64) -> i64,
) {
    let [ox, oy, oz] = chunk.coord().origin();
    for ly in 0..CHUNK_SIDE {
        for lx in 0..CHUNK_SIDE {
            let height = surface(ox + lx as i64, oy + ly as i64);
            for lz in 0..CHUNK_SIDE {
                let wz = oz + lz as i64;
                let material = if wz < height - 3 {
                    materials.stone
                } else if wz < height - 1 {
                    materials.dirt
                } else if wz < height {
                    materials.grass
                } else if sea_level.is_some_and(|sea| wz < sea) {
                    materials.water
                } else {
                    continue;
                };
                chunk.put(lx, ly, lz, BlockRecord::new(material));
            }
        }
    }
}

/// Flat ground: solid below `ground_height`, air above.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    materials: StandardMaterials,
    ground_height: i64,
}

impl FlatGenerator {
    pub fn new(materials: StandardMaterials, ground_height: i64) -> Self {
        Self {
            materials,
            ground_height,
        }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn generate(&self, _seed: u64, chunk: &mut Chunk) -> Result<(), GenerateError> {
        fill_columns(chunk, &self.materials, None, |_, _| self.ground_height);
        Ok(())
    }
}

/// Rolling hills from multi-octave simplex noise, with water below sea level.
pub struct LayeredGenerator {
    materials: StandardMaterials,
    base_height: f64,
    amplitude: f64,
    base_frequency: f64,
    octaves: u32,
    sea_level: i64,
    /// Chunk layers beyond `±vertical_limit` are refused.
    vertical_limit: i32,
}

impl LayeredGenerator {
    pub fn new(materials: StandardMaterials) -> Self {
        Self {
            materials,
            base_height: 20.0,
            amplitude: 24.0,
            base_frequency: 0.01,
            octaves: 4,
            sea_level: 12,
            vertical_limit: 64,
        }
    }

    pub fn with_vertical_limit(mut self, layers: i32) -> Self {
        self.vertical_limit = layers;
        self
    }

    fn height(&self, noise: &Simplex, x: i64, y: i64) -> i64 {
        let mut total = 0.0;
        let mut frequency = self.base_frequency;
        let mut amplitude = self.amplitude;
        for _ in 0..self.octaves {
            total += noise.get([x as f64 * frequency, y as f64 * frequency]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        (self.base_height + total).floor() as i64
    }
}

impl TerrainGenerator for LayeredGenerator {
    fn generate(&self, seed: u64, chunk: &mut Chunk) -> Result<(), GenerateError> {
        let coord = chunk.coord();
        if coord.z.abs() > self.vertical_limit {
            return Err(GenerateError::OutOfBounds(coord));
        }
        let noise = Simplex::new(seed as u32);
        fill_columns(chunk, &self.materials, Some(self.sea_level), |x, y| {
            self.height(&noise, x, y)
        });
        Ok(())
    }
}
