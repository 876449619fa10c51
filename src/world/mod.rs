pub mod chunk;
pub mod chunk_coord;
pub mod generator;
pub mod voxel;

pub use chunk::Chunk;
pub use chunk_coord::ChunkCoord;
pub use generator::{HeightfieldSampler, TerrainSampler};
pub use voxel::{Voxel, VoxelVolume};
