use glam::UVec3;
use thiserror::Error;

/// Out-of-range access into a [`VoxelVolume`](crate::world::VoxelVolume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("voxel index ({x}, {y}, {z}) out of bounds for extent {extent}")]
pub struct VolumeError {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub extent: UVec3,
}

/// Failures raised by the GPU upload path. Allocation rejection has no
/// recovery path; callers treat it as fatal.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("no compatible memory type (filter {type_filter:#x})")]
    NoCompatibleMemory { type_filter: u32 },

    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] ash::vk::Result),
}
