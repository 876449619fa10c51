pub mod scheduler;
pub mod worker;

pub use scheduler::ChunkStreamer;
pub use worker::{CompletedChunk, WorkerPool};
