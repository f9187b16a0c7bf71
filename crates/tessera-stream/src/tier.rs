//! Distance bands that decide at which detail a chunk is streamed.

use tessera_voxel::Tier;

/// Chebyshev radius, in chunks, of each tier band. Bands are nested: a
/// chunk belongs to the finest tier whose radius covers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierRadii {
    pub tier1: u32,
    pub tier2: u32,
    pub tier5: u32,
    pub tier6: u32,
    pub tier15: u32,
}

impl Default for TierRadii {
    fn default() -> Self {
        Self {
            tier1: 3,
            tier2: 6,
            tier5: 10,
            tier6: 14,
            tier15: 24,
        }
    }
}

impl TierRadii {
    /// Radii in [`Tier::ALL`] order.
    pub fn as_array(&self) -> [u32; 5] {
        [self.tier1, self.tier2, self.tier5, self.tier6, self.tier15]
    }

    /// The tier for a chunk `distance` chunks away, or `None` past the
    /// outermost band.
    pub fn classify(&self, distance: u32) -> Option<Tier> {
        self.as_array()
            .iter()
            .position(|radius| distance <= *radius)
            .and_then(Tier::from_index)
    }

    /// Radius of the outermost band.
    pub fn outer(&self) -> u32 {
        self.as_array().into_iter().max().unwrap_or(0)
    }
}

/// Dispatch cost of one chunk payload at each tier, in [`Tier::ALL`] order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierCosts(pub [u32; 5]);

impl Default for TierCosts {
    fn default() -> Self {
        Self([16, 4, 2, 1, 1])
    }
}

impl TierCosts {
    pub fn cost(&self, tier: Tier) -> u32 {
        self.0[tier.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_nested_bands() {
        let radii = TierRadii::default();
        assert_eq!(radii.classify(0), Some(Tier::Full));
        assert_eq!(radii.classify(3), Some(Tier::Full));
        assert_eq!(radii.classify(4), Some(Tier::Lod2));
        assert_eq!(radii.classify(10), Some(Tier::Lod5));
        assert_eq!(radii.classify(11), Some(Tier::Lod6));
        assert_eq!(radii.classify(24), Some(Tier::Lod15));
        assert_eq!(radii.classify(25), None);
        assert_eq!(radii.outer(), 24);
    }

    #[test]
    fn test_empty_band_is_skipped() {
        let radii = TierRadii {
            tier1: 2,
            tier2: 2,
            tier5: 2,
            tier6: 2,
            tier15: 5,
        };
        assert_eq!(radii.classify(2), Some(Tier::Full));
        assert_eq!(radii.classify(3), Some(Tier::Lod15));
    }
}
