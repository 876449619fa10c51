use glam::{IVec3, Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one chunk in chunk-grid space (not world units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing the given world position. `chunk_world_size` is the
    /// world-space edge length of one chunk (chunk size x voxel scale).
    pub fn from_world_pos(pos: Vec3, chunk_world_size: f32) -> Self {
        Self {
            x: (pos.x / chunk_world_size).floor() as i32,
            y: (pos.y / chunk_world_size).floor() as i32,
            z: (pos.z / chunk_world_size).floor() as i32,
        }
    }

    /// World-space origin of this chunk (its minimum corner).
    pub fn world_origin(&self, chunk_world_size: f32) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32) * chunk_world_size
    }

    /// Model transform placing a chunk-local mesh in the world.
    pub fn transform(&self, chunk_world_size: f32) -> Mat4 {
        Mat4::from_translation(self.world_origin(chunk_world_size))
    }

    /// World voxel coordinate of this chunk's first voxel.
    pub fn voxel_origin(&self, chunk_size: u32) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * chunk_size as i32
    }

    /// Chebyshev distance in the horizontal plane, the metric of the
    /// streaming window.
    pub fn horizontal_chebyshev(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<IVec3> for ChunkCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<ChunkCoord> for IVec3 {
    fn from(c: ChunkCoord) -> Self {
        IVec3::new(c.x, c.y, c.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_pos_floors_toward_negative() {
        assert_eq!(
            ChunkCoord::from_world_pos(Vec3::new(0.5, 0.5, 0.5), 16.0),
            ChunkCoord::new(0, 0, 0)
        );
        assert_eq!(
            ChunkCoord::from_world_pos(Vec3::new(-0.5, 0.0, -16.5), 16.0),
            ChunkCoord::new(-1, 0, -2)
        );
    }

    #[test]
    fn origin_round_trips() {
        let coord = ChunkCoord::new(3, -2, 7);
        let origin = coord.world_origin(16.0);
        assert_eq!(ChunkCoord::from_world_pos(origin, 16.0), coord);
        assert_eq!(coord.voxel_origin(16), IVec3::new(48, -32, 112));
    }

    #[test]
    fn chebyshev_ignores_vertical_axis() {
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(3, 100, -2);
        assert_eq!(a.horizontal_chebyshev(&b), 3);
    }
}
