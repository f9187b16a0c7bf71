//! A view cone used to skip chunks behind the viewer.

use glam::DVec3;
use tessera_voxel::{CHUNK_SIDE, ChunkCoord};

/// A circular view cone with its apex at the viewer's eye.
#[derive(Clone, Copy, Debug)]
pub struct ViewCone {
    origin: DVec3,
    /// Unit view direction.
    forward: DVec3,
    half_angle: f64,
}

impl ViewCone {
    /// Builds a cone from the eye position, a view direction and the full
    /// field of view in degrees. Returns `None` for a zero direction.
    pub fn new(origin: DVec3, forward: DVec3, fov_degrees: f64) -> Option<Self> {
        let forward = forward.try_normalize()?;
        Some(Self {
            origin,
            forward,
            half_angle: (fov_degrees.clamp(1.0, 359.0) / 2.0).to_radians(),
        })
    }

    /// `true` if any part of the sphere at `center` with `radius` is inside
    /// the cone.
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        let to_center = center - self.origin;
        let distance = to_center.length();
        if distance <= radius {
            return true;
        }
        let angle = to_center.angle_between(self.forward);
        let angular_radius = (radius / distance).clamp(-1.0, 1.0).asin();
        angle <= self.half_angle + angular_radius
    }

    /// Tests a chunk's bounding sphere.
    pub fn sees_chunk(&self, coord: ChunkCoord) -> bool {
        let [x, y, z] = coord.center();
        let radius = CHUNK_SIDE as f64 * 3f64.sqrt() / 2.0;
        self.intersects_sphere(DVec3::new(x, y, z), radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cone() -> ViewCone {
        ViewCone::new(DVec3::new(15.0, 15.0, 15.0), DVec3::X, 90.0).unwrap()
    }

    #[test]
    fn test_chunk_ahead_is_seen() {
        assert!(cone().sees_chunk(ChunkCoord::new(3, 0, 0)));
        assert!(cone().sees_chunk(ChunkCoord::new(3, 2, 0)));
    }

    #[test]
    fn test_chunk_behind_is_culled() {
        assert!(!cone().sees_chunk(ChunkCoord::new(-3, 0, 0)));
        assert!(!cone().sees_chunk(ChunkCoord::new(-4, 1, 1)));
    }

    #[test]
    fn test_containing_chunk_is_seen() {
        assert!(cone().sees_chunk(ChunkCoord::new(0, 0, 0)));
    }

    #[test]
    fn test_zero_direction_is_rejected() {
        assert!(ViewCone::new(DVec3::ZERO, DVec3::ZERO, 90.0).is_none());
    }
}
