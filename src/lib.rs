//! Streaming voxel world core: deterministic terrain generation, exposed-face
//! chunk meshing, Vulkan mesh upload, and a windowed chunk streamer driven by
//! the viewer position.
//!
//! The crate is renderer-agnostic below the buffer level: it produces
//! device-resident vertex/index buffers per chunk and a transform per
//! [`ChunkCoord`](world::ChunkCoord); drawing them is the embedder's job.

pub mod config;
pub mod error;
pub mod gpu;
pub mod mesh;
pub mod streaming;
pub mod world;

pub use config::{StreamConfig, TerrainConfig};
pub use error::{GpuError, VolumeError};
pub use gpu::{GpuSettings, MeshUpload, VulkanContext, VulkanMeshUploader};
pub use mesh::{extract_chunk_mesh, MeshData, Vertex};
pub use streaming::ChunkStreamer;
pub use world::{Chunk, ChunkCoord, HeightfieldSampler, TerrainSampler, Voxel, VoxelVolume};
