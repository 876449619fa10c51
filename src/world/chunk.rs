use crate::gpu::GpuMesh;
use crate::world::chunk_coord::ChunkCoord;
use crate::world::voxel::VoxelVolume;

/// One streamed unit of the world, owned exclusively by the scheduler's
/// chunk map. Inserted as a placeholder (no volume, no mesh,
/// `mesh_job_queued` set) before its generation task is enqueued, which is
/// what keeps requests idempotent per coordinate.
#[derive(Debug)]
pub struct Chunk {
    pub coordinate: ChunkCoord,
    pub volume: Option<VoxelVolume>,
    pub mesh: Option<GpuMesh>,
    /// Volume changed since the last mesh; a remesh should be queued.
    pub dirty: bool,
    /// A generation/meshing task for this coordinate is queued or running.
    pub mesh_job_queued: bool,
}

impl Chunk {
    /// Placeholder entry standing in for a chunk whose generation task is
    /// about to be enqueued.
    pub fn placeholder(coordinate: ChunkCoord) -> Self {
        Self {
            coordinate,
            volume: None,
            mesh: None,
            dirty: false,
            mesh_job_queued: true,
        }
    }

    /// True once a completed mesh has been attached.
    pub fn is_ready(&self) -> bool {
        self.mesh.is_some()
    }

    /// True if this chunk contributes geometry to a frame. Zero-index
    /// meshes are adopted but draw nothing.
    pub fn is_drawable(&self) -> bool {
        self.mesh.as_ref().map_or(false, |m| m.index_count > 0)
    }
}
