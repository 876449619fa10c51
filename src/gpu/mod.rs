pub mod context;
pub mod queue;
pub mod upload;

pub use context::{GpuSettings, VulkanContext};
pub use queue::{QueueGuard, SubmissionQueue};
pub use upload::{GpuMesh, MeshUpload, VulkanMeshUploader};
