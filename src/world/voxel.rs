use crate::error::VolumeError;
use glam::{IVec3, UVec3};

/// One unit cell: solid or empty, with a surface color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voxel {
    pub solid: bool,
    pub color: [f32; 3],
}

impl Voxel {
    pub const EMPTY: Voxel = Voxel {
        solid: false,
        color: [0.0; 3],
    };

    pub const fn solid(color: [f32; 3]) -> Self {
        Self { solid: true, color }
    }
}

impl Default for Voxel {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Dense bounds-checked voxel grid for one chunk. Fixed extent for its
/// lifetime; scoped to a single generation + meshing pass.
#[derive(Debug, Clone)]
pub struct VoxelVolume {
    extent: UVec3,
    voxels: Vec<Voxel>,
}

impl VoxelVolume {
    /// Creates an empty volume. The extent must be positive on every axis.
    pub fn new(extent: UVec3) -> Self {
        assert!(
            extent.x > 0 && extent.y > 0 && extent.z > 0,
            "volume extent must be positive, got {extent}"
        );
        let len = (extent.x * extent.y * extent.z) as usize;
        Self {
            extent,
            voxels: vec![Voxel::EMPTY; len],
        }
    }

    pub fn cube(edge: u32) -> Self {
        Self::new(UVec3::splat(edge))
    }

    pub fn extent(&self) -> UVec3 {
        self.extent
    }

    fn index(&self, x: u32, y: u32, z: u32) -> Option<usize> {
        if x < self.extent.x && y < self.extent.y && z < self.extent.z {
            Some((x + y * self.extent.x + z * self.extent.x * self.extent.y) as usize)
        } else {
            None
        }
    }

    /// Bounds-checked read access; fails with a range error outside
    /// `[0, extent)`.
    pub fn at(&self, x: u32, y: u32, z: u32) -> Result<&Voxel, VolumeError> {
        self.index(x, y, z)
            .map(|i| &self.voxels[i])
            .ok_or(VolumeError {
                x,
                y,
                z,
                extent: self.extent,
            })
    }

    /// Bounds-checked write access.
    pub fn at_mut(&mut self, x: u32, y: u32, z: u32) -> Result<&mut Voxel, VolumeError> {
        let extent = self.extent;
        match self.index(x, y, z) {
            Some(i) => Ok(&mut self.voxels[i]),
            None => Err(VolumeError { x, y, z, extent }),
        }
    }

    /// Signed-coordinate probe; anything outside the volume reads as absent.
    /// Neighbor tests during meshing treat that as empty space.
    pub fn get(&self, p: IVec3) -> Option<&Voxel> {
        if p.x < 0 || p.y < 0 || p.z < 0 {
            return None;
        }
        self.index(p.x as u32, p.y as u32, p.z as u32)
            .map(|i| &self.voxels[i])
    }

    pub fn is_solid(&self, p: IVec3) -> bool {
        self.get(p).map_or(false, |v| v.solid)
    }

    /// True if no voxel is solid.
    pub fn is_empty(&self) -> bool {
        !self.voxels.iter().any(|v| v.solid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_inside_extent() {
        let mut volume = VoxelVolume::new(UVec3::new(2, 3, 4));
        *volume.at_mut(1, 2, 3).unwrap() = Voxel::solid([1.0, 0.0, 0.0]);
        assert!(volume.at(1, 2, 3).unwrap().solid);
        assert!(!volume.at(0, 0, 0).unwrap().solid);
    }

    #[test]
    fn access_outside_extent_is_a_range_error() {
        let volume = VoxelVolume::cube(4);
        let err = volume.at(4, 0, 0).unwrap_err();
        assert_eq!((err.x, err.y, err.z), (4, 0, 0));
        assert_eq!(err.extent, UVec3::splat(4));

        let mut volume = volume;
        assert!(volume.at_mut(0, 0, 99).is_err());
    }

    #[test]
    fn signed_probe_treats_outside_as_absent() {
        let mut volume = VoxelVolume::cube(2);
        *volume.at_mut(0, 0, 0).unwrap() = Voxel::solid([0.5; 3]);
        assert!(volume.is_solid(IVec3::new(0, 0, 0)));
        assert!(!volume.is_solid(IVec3::new(-1, 0, 0)));
        assert!(!volume.is_solid(IVec3::new(0, 2, 0)));
        assert!(volume.get(IVec3::new(0, 0, -1)).is_none());
    }

    #[test]
    #[should_panic(expected = "extent must be positive")]
    fn zero_extent_is_rejected() {
        let _ = VoxelVolume::new(UVec3::new(4, 0, 4));
    }
}
