use crate::gpu::{GpuMesh, MeshUpload};
use crate::mesh::extract_chunk_mesh;
use crate::world::generator::{fill_chunk_volume, TerrainSampler};
use crate::world::{ChunkCoord, VoxelVolume};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{error, trace, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Result of one chunk task: the generated volume plus its uploaded mesh,
/// handed back to the scheduler over the completion channel.
pub struct CompletedChunk {
    pub coordinate: ChunkCoord,
    pub volume: VoxelVolume,
    pub mesh: GpuMesh,
}

/// Fixed set of threads draining the task channel. Each thread owns private
/// backend worker state (for Vulkan, its own transient command pool) created
/// up front; the state travels back through the join handle so the owner can
/// release it once the device is idle.
pub struct WorkerPool<U: MeshUpload> {
    handles: Vec<JoinHandle<U::Worker>>,
}

impl<U: MeshUpload> WorkerPool<U> {
    pub fn spawn(
        backend: Arc<U>,
        sampler: Arc<dyn TerrainSampler>,
        chunk_size: u32,
        voxel_scale: f32,
        worker_count: usize,
        tasks: Receiver<ChunkCoord>,
        completed: Sender<CompletedChunk>,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let mut worker = backend.create_worker()?;
            let backend = backend.clone();
            let sampler = sampler.clone();
            let tasks = tasks.clone();
            let completed = completed.clone();
            let handle = std::thread::Builder::new()
                .name(format!("chunk-worker-{index}"))
                .spawn(move || {
                    run_worker(
                        &*backend,
                        &mut worker,
                        &*sampler,
                        chunk_size,
                        voxel_scale,
                        &tasks,
                        &completed,
                    );
                    worker
                })
                .context("Failed to spawn chunk worker thread")?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Blocks until every worker has drained the closed task channel and
    /// exited, returning their backend state for release.
    pub fn join(self) -> Vec<U::Worker> {
        self.handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(worker) => worker,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    }
}

/// Generate, mesh, upload, report; repeat until the task channel closes.
fn run_worker<U: MeshUpload>(
    backend: &U,
    worker: &mut U::Worker,
    sampler: &dyn TerrainSampler,
    chunk_size: u32,
    voxel_scale: f32,
    tasks: &Receiver<ChunkCoord>,
    completed: &Sender<CompletedChunk>,
) {
    while let Ok(coordinate) = tasks.recv() {
        let volume = fill_chunk_volume(sampler, coordinate, chunk_size);
        let data = extract_chunk_mesh(&volume, voxel_scale);
        let mesh = match backend.upload(worker, &data) {
            Ok(mesh) => mesh,
            // Device memory exhaustion is unrecoverable; tearing the
            // process down beats rendering holes in the world.
            Err(err) => {
                error!("GPU upload failed for chunk {coordinate}: {err}");
                panic!("unrecoverable GPU upload failure for chunk {coordinate}");
            }
        };
        trace!(
            "chunk {coordinate}: {} quads uploaded",
            data.quad_count()
        );
        if completed
            .send(CompletedChunk {
                coordinate,
                volume,
                mesh,
            })
            .is_err()
        {
            warn!("completion channel closed; dropping chunk {coordinate}");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::error::GpuError;
    use crate::mesh::MeshData;
    use crate::world::generator::HeightfieldSampler;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullUploader {
        uploads: AtomicUsize,
    }

    impl NullUploader {
        fn new() -> Self {
            Self {
                uploads: AtomicUsize::new(0),
            }
        }
    }

    impl MeshUpload for NullUploader {
        type Worker = usize;

        fn create_worker(&self) -> Result<usize, GpuError> {
            Ok(0)
        }

        fn upload(&self, worker: &mut usize, mesh: &MeshData) -> Result<GpuMesh, GpuError> {
            *worker += 1;
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(GpuMesh {
                index_count: mesh.indices.len() as u32,
                ..GpuMesh::empty()
            })
        }

        fn destroy_worker(&self, _worker: usize) {}

        fn destroy_mesh(&self, _mesh: &GpuMesh) {}

        fn wait_idle(&self) -> Result<(), GpuError> {
            Ok(())
        }
    }

    fn sampler() -> Arc<HeightfieldSampler> {
        Arc::new(HeightfieldSampler::new(TerrainConfig {
            seed: 5,
            ..Default::default()
        }))
    }

    #[test]
    fn pool_completes_every_task() {
        let backend = Arc::new(NullUploader::new());
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let pool =
            WorkerPool::spawn(backend.clone(), sampler(), 8, 1.0, 2, task_rx, done_tx).unwrap();
        assert_eq!(pool.worker_count(), 2);

        let mut requested = HashSet::new();
        for x in -2..2 {
            for z in -2..2 {
                let coord = ChunkCoord::new(x, 1, z);
                requested.insert(coord);
                task_tx.send(coord).unwrap();
            }
        }
        drop(task_tx);

        let mut seen = HashSet::new();
        for done in done_rx.iter().take(16) {
            assert_eq!(done.volume.extent().x, 8);
            seen.insert(done.coordinate);
        }
        assert_eq!(seen, requested);
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 16);

        let workers = pool.join();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers.iter().sum::<usize>(), 16);
    }

    #[test]
    fn workers_reproduce_direct_generation() {
        let backend = Arc::new(NullUploader::new());
        let terrain = sampler();
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::spawn(
            backend,
            terrain.clone(),
            8,
            1.0,
            1,
            task_rx,
            done_tx,
        )
        .unwrap();

        let coord = ChunkCoord::new(3, 1, -2);
        task_tx.send(coord).unwrap();
        drop(task_tx);

        let done = done_rx.recv().unwrap();
        let reference = fill_chunk_volume(&*terrain, coord, 8);
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    assert_eq!(done.volume.at(x, y, z).unwrap(), reference.at(x, y, z).unwrap());
                }
            }
        }
        pool.join();
    }
}
