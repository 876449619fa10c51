use crate::error::GpuError;
use crate::gpu::context::VulkanContext;
use crate::gpu::queue::SubmissionQueue;
use crate::mesh::{MeshData, Vertex};
use ash::vk;
use log::debug;
use std::sync::Arc;

/// Device-resident triangle data for one chunk. Built once, never mutated.
/// Destruction is explicit and only permitted at the gated release points
/// (pending-destroy drain, worker shutdown); there is deliberately no Drop
/// impl touching the device.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: vk::Buffer,
    pub vertex_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_memory: vk::DeviceMemory,
    pub index_count: u32,
}

impl GpuMesh {
    /// Mesh for a chunk with no exposed geometry: null handles, nothing to
    /// draw, nothing to destroy.
    pub fn empty() -> Self {
        Self {
            vertex_buffer: vk::Buffer::null(),
            vertex_memory: vk::DeviceMemory::null(),
            index_buffer: vk::Buffer::null(),
            index_memory: vk::DeviceMemory::null(),
            index_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0
    }
}

/// Seam between the streaming machinery and the device. Workers call
/// `upload` with thread-private `Worker` state; the scheduler calls
/// `destroy_mesh`/`wait_idle` from the owning thread. Tests substitute
/// instrumented implementations, the renderer uses [`VulkanMeshUploader`].
pub trait MeshUpload: Send + Sync + 'static {
    /// Per-worker-thread transfer state (for Vulkan: a private transient
    /// command pool, so transient allocation never contends across threads).
    type Worker: Send + 'static;

    fn create_worker(&self) -> Result<Self::Worker, GpuError>;

    /// Uploads CPU arrays into a device-resident mesh, synchronously
    /// waiting for the copy before returning.
    fn upload(&self, worker: &mut Self::Worker, mesh: &MeshData) -> Result<GpuMesh, GpuError>;

    /// Releases one worker's transfer state. Only valid after the device
    /// has been confirmed idle.
    fn destroy_worker(&self, worker: Self::Worker);

    fn destroy_mesh(&self, mesh: &GpuMesh);

    /// Full submission-queue idle checkpoint.
    fn wait_idle(&self) -> Result<(), GpuError>;
}

/// Stages vertex/index arrays through a transient host-visible buffer and
/// copies them into device-local memory on the shared graphics queue.
pub struct VulkanMeshUploader {
    context: Arc<VulkanContext>,
    queue: SubmissionQueue,
}

pub struct TransferWorker {
    command_pool: vk::CommandPool,
}

impl VulkanMeshUploader {
    pub fn new(context: Arc<VulkanContext>) -> Self {
        let queue = SubmissionQueue::new(context.graphics_queue());
        Self { context, queue }
    }

    pub fn context(&self) -> &Arc<VulkanContext> {
        &self.context
    }

    pub fn queue(&self) -> &SubmissionQueue {
        &self.queue
    }
}

impl MeshUpload for VulkanMeshUploader {
    type Worker = TransferWorker;

    fn create_worker(&self) -> Result<TransferWorker, GpuError> {
        Ok(TransferWorker {
            command_pool: self.context.create_transient_command_pool()?,
        })
    }

    fn upload(&self, worker: &mut TransferWorker, mesh: &MeshData) -> Result<GpuMesh, GpuError> {
        if mesh.is_empty() {
            return Ok(GpuMesh::empty());
        }

        let device = &self.context.device;
        let vertex_bytes: &[u8] = bytemuck::cast_slice::<Vertex, u8>(&mesh.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice::<u32, u8>(&mesh.indices);
        let vertex_size = vertex_bytes.len() as vk::DeviceSize;
        let index_size = index_bytes.len() as vk::DeviceSize;

        // One transient staging buffer holds both arrays back to back.
        let (staging_buffer, staging_memory) = self.context.create_buffer(
            vertex_size + index_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        unsafe {
            let mapped = device.map_memory(
                staging_memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;
            std::ptr::copy_nonoverlapping(vertex_bytes.as_ptr(), mapped, vertex_bytes.len());
            std::ptr::copy_nonoverlapping(
                index_bytes.as_ptr(),
                mapped.add(vertex_bytes.len()),
                index_bytes.len(),
            );
            device.unmap_memory(staging_memory);
        }

        let (vertex_buffer, vertex_memory) = self.context.create_buffer(
            vertex_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let (index_buffer, index_memory) = self.context.create_buffer(
            index_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        // Record outside the queue lock; only submit/wait hold it.
        let command_buffer = self.context.begin_single_time_commands(worker.command_pool)?;
        unsafe {
            device.cmd_copy_buffer(
                command_buffer,
                staging_buffer,
                vertex_buffer,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: vertex_size,
                }],
            );
            device.cmd_copy_buffer(
                command_buffer,
                staging_buffer,
                index_buffer,
                &[vk::BufferCopy {
                    src_offset: vertex_size,
                    dst_offset: 0,
                    size: index_size,
                }],
            );
            device.end_command_buffer(command_buffer)?;
        }

        {
            let guard = self.queue.lock();
            guard.submit_and_wait(device, command_buffer)?;
        }

        // The copy has retired; the staging buffer dies here, the command
        // buffer goes back to this worker's pool.
        unsafe {
            device.free_command_buffers(worker.command_pool, &[command_buffer]);
            device.destroy_buffer(staging_buffer, None);
            device.free_memory(staging_memory, None);
        }

        debug!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(GpuMesh {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: mesh.indices.len() as u32,
        })
    }

    fn destroy_worker(&self, worker: TransferWorker) {
        unsafe {
            self.context
                .device
                .destroy_command_pool(worker.command_pool, None);
        }
    }

    fn destroy_mesh(&self, mesh: &GpuMesh) {
        if mesh.is_empty() {
            return;
        }
        unsafe {
            self.context.device.destroy_buffer(mesh.vertex_buffer, None);
            self.context.device.free_memory(mesh.vertex_memory, None);
            self.context.device.destroy_buffer(mesh.index_buffer, None);
            self.context.device.free_memory(mesh.index_memory, None);
        }
    }

    fn wait_idle(&self) -> Result<(), GpuError> {
        self.queue.lock().wait_idle(&self.context.device)
    }
}
