use crate::config::StreamConfig;
use crate::error::GpuError;
use crate::gpu::{GpuMesh, MeshUpload};
use crate::streaming::worker::{CompletedChunk, WorkerPool};
use crate::world::generator::TerrainSampler;
use crate::world::{Chunk, ChunkCoord};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Owns the chunk map and drives the worker pool. Single-threaded surface:
/// the embedding loop calls [`update_streaming`](Self::update_streaming) with
/// the viewer position each frame, [`drain_completed`](Self::drain_completed)
/// to adopt finished chunks, and [`flush_evicted`](Self::flush_evicted) at a
/// point where a device stall is acceptable.
pub struct ChunkStreamer<U: MeshUpload> {
    backend: Arc<U>,
    config: StreamConfig,
    chunks: HashMap<ChunkCoord, Chunk>,
    tasks: Sender<ChunkCoord>,
    completed: Receiver<CompletedChunk>,
    pool: WorkerPool<U>,
    /// Meshes whose chunks were evicted or remeshed; released only behind
    /// the next queue-idle checkpoint.
    pending_destroy: Vec<GpuMesh>,
    last_viewer: Option<ChunkCoord>,
}

impl<U: MeshUpload> ChunkStreamer<U> {
    pub fn new(
        backend: Arc<U>,
        sampler: Arc<dyn TerrainSampler>,
        config: StreamConfig,
    ) -> Result<Self> {
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::spawn(
            backend.clone(),
            sampler,
            config.chunk_size,
            config.voxel_scale,
            config.worker_count(),
            task_rx,
            done_tx,
        )?;
        debug!(
            "chunk streamer up: {} workers, load distance {}",
            pool.worker_count(),
            config.load_distance
        );
        Ok(Self {
            backend,
            config,
            chunks: HashMap::new(),
            tasks: task_tx,
            completed: done_rx,
            pool,
            pending_destroy: Vec::new(),
            last_viewer: None,
        })
    }

    /// Recomputes the load window around the viewer. Cheap no-op unless the
    /// viewer crossed a chunk boundary since the last call. Returns the
    /// coordinates evicted this call; their meshes are parked on the
    /// pending-destroy list until [`flush_evicted`](Self::flush_evicted).
    pub fn update_streaming(&mut self, viewer: Vec3) -> Vec<ChunkCoord> {
        let center = ChunkCoord::from_world_pos(viewer, self.config.chunk_world_size());
        if self.last_viewer == Some(center) {
            return Vec::new();
        }
        self.last_viewer = Some(center);

        let radius = self.config.load_distance;
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                self.request_chunk(ChunkCoord::new(center.x + dx, center.y, center.z + dz));
            }
        }

        let evicted: Vec<ChunkCoord> = self
            .chunks
            .keys()
            .filter(|coord| coord.y != center.y || coord.horizontal_chebyshev(&center) > radius)
            .copied()
            .collect();
        for coord in &evicted {
            if let Some(chunk) = self.chunks.remove(coord) {
                if let Some(mesh) = chunk.mesh {
                    self.pending_destroy.push(mesh);
                }
            }
        }
        if !evicted.is_empty() {
            trace!("evicted {} chunks around {center}", evicted.len());
        }
        evicted
    }

    /// Enqueues generation for a coordinate unless the map already holds an
    /// entry for it. The placeholder goes in before the task, so a repeated
    /// request between enqueue and completion is a silent no-op.
    fn request_chunk(&mut self, coordinate: ChunkCoord) {
        if self.chunks.contains_key(&coordinate) {
            return;
        }
        self.chunks
            .insert(coordinate, Chunk::placeholder(coordinate));
        if self.tasks.send(coordinate).is_err() {
            warn!("task channel closed; chunk {coordinate} stays a placeholder");
        }
    }

    /// Adopts every completion currently in the channel without blocking.
    /// Completions whose coordinate has left the map are orphans: their
    /// upload already waited for its copy, so the mesh is destroyed on the
    /// spot. Returns the coordinates that became ready.
    pub fn drain_completed(&mut self) -> Vec<ChunkCoord> {
        let mut adopted = Vec::new();
        while let Ok(done) = self.completed.try_recv() {
            match self.chunks.get_mut(&done.coordinate) {
                Some(chunk) => {
                    if let Some(old) = chunk.mesh.take() {
                        self.pending_destroy.push(old);
                    }
                    chunk.volume = Some(done.volume);
                    chunk.mesh = Some(done.mesh);
                    chunk.mesh_job_queued = false;
                    if chunk.dirty {
                        // Marked dirty while the job ran; go again.
                        chunk.dirty = false;
                        chunk.mesh_job_queued = true;
                        if self.tasks.send(done.coordinate).is_err() {
                            warn!("task channel closed; dirty chunk {} not requeued", done.coordinate);
                        }
                    }
                    adopted.push(done.coordinate);
                }
                None => {
                    trace!("discarding orphaned chunk {}", done.coordinate);
                    self.backend.destroy_mesh(&done.mesh);
                }
            }
        }
        adopted
    }

    /// Flags a chunk for regeneration. No-op for coordinates outside the
    /// map; deduplicated against an already outstanding job.
    pub fn mark_dirty(&mut self, coordinate: ChunkCoord) {
        let Some(chunk) = self.chunks.get_mut(&coordinate) else {
            return;
        };
        if chunk.mesh_job_queued {
            chunk.dirty = true;
            return;
        }
        chunk.mesh_job_queued = true;
        chunk.dirty = false;
        if self.tasks.send(coordinate).is_err() {
            warn!("task channel closed; dirty chunk {coordinate} not requeued");
        }
    }

    /// Releases every parked mesh behind one queue-idle checkpoint. Call at
    /// a frame boundary where stalling the queue is acceptable.
    pub fn flush_evicted(&mut self) -> Result<(), GpuError> {
        if self.pending_destroy.is_empty() {
            return Ok(());
        }
        self.backend.wait_idle()?;
        for mesh in self.pending_destroy.drain(..) {
            self.backend.destroy_mesh(&mesh);
        }
        Ok(())
    }

    pub fn chunks(&self) -> &HashMap<ChunkCoord, Chunk> {
        &self.chunks
    }

    pub fn chunk(&self, coordinate: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coordinate)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Tears the streamer down: closes the task channel, joins the workers,
    /// then releases every remaining device resource behind one final idle
    /// checkpoint.
    pub fn shutdown(self) -> Result<(), GpuError> {
        let Self {
            backend,
            mut chunks,
            tasks,
            completed,
            pool,
            mut pending_destroy,
            ..
        } = self;

        drop(tasks);
        let workers = pool.join();

        // Completions that raced the shutdown have no chunk to land in.
        while let Ok(done) = completed.try_recv() {
            pending_destroy.push(done.mesh);
        }

        backend.wait_idle()?;
        for worker in workers {
            backend.destroy_worker(worker);
        }
        for mesh in pending_destroy.drain(..) {
            backend.destroy_mesh(&mesh);
        }
        for (_, chunk) in chunks.drain() {
            if let Some(mesh) = chunk.mesh {
                backend.destroy_mesh(&mesh);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;
    use crate::gpu::SubmissionQueue;
    use crate::mesh::MeshData;
    use crate::world::generator::HeightfieldSampler;
    use ash::vk;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    /// Counts uploads and destroys, and records how many threads are ever
    /// inside the queue-guarded section at once.
    struct RecordingUploader {
        queue: SubmissionQueue,
        uploads: AtomicUsize,
        destroyed: AtomicUsize,
        inside: AtomicUsize,
        peak: AtomicUsize,
    }

    impl RecordingUploader {
        fn new() -> Self {
            Self {
                queue: SubmissionQueue::new(vk::Queue::null()),
                uploads: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
                inside: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl MeshUpload for RecordingUploader {
        type Worker = ();

        fn create_worker(&self) -> Result<(), GpuError> {
            Ok(())
        }

        fn upload(&self, _worker: &mut (), mesh: &MeshData) -> Result<GpuMesh, GpuError> {
            let _guard = self.queue.lock();
            let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_micros(300));
            self.inside.fetch_sub(1, Ordering::SeqCst);
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(GpuMesh {
                index_count: mesh.indices.len() as u32,
                ..GpuMesh::empty()
            })
        }

        fn destroy_worker(&self, _worker: ()) {}

        fn destroy_mesh(&self, _mesh: &GpuMesh) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        fn wait_idle(&self) -> Result<(), GpuError> {
            Ok(())
        }
    }

    fn streamer(
        config: StreamConfig,
    ) -> (ChunkStreamer<RecordingUploader>, Arc<RecordingUploader>) {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Warn)
            .init();
        let backend = Arc::new(RecordingUploader::new());
        let sampler = Arc::new(HeightfieldSampler::new(TerrainConfig {
            seed: 11,
            ..Default::default()
        }));
        let streamer = ChunkStreamer::new(backend.clone(), sampler, config).unwrap();
        (streamer, backend)
    }

    fn small_config(load_distance: i32, worker_threads: usize) -> StreamConfig {
        StreamConfig {
            chunk_size: 8,
            voxel_scale: 1.0,
            load_distance,
            worker_threads,
        }
    }

    fn drain_until(
        streamer: &mut ChunkStreamer<RecordingUploader>,
        expected: usize,
    ) -> Vec<ChunkCoord> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut adopted = Vec::new();
        while adopted.len() < expected {
            adopted.extend(streamer.drain_completed());
            assert!(
                Instant::now() < deadline,
                "timed out at {}/{expected} chunks",
                adopted.len()
            );
            std::thread::sleep(Duration::from_millis(2));
        }
        adopted
    }

    #[test]
    fn window_loads_the_full_square() {
        let (mut streamer, backend) = streamer(small_config(2, 2));

        streamer.update_streaming(Vec3::new(4.0, 9.0, 4.0));
        assert_eq!(streamer.chunks().len(), 25);
        for coord in streamer.chunks().keys() {
            assert_eq!(coord.y, 1);
            assert!(coord.horizontal_chebyshev(&ChunkCoord::new(0, 1, 0)) <= 2);
        }

        let adopted = drain_until(&mut streamer, 25);
        assert_eq!(adopted.len(), 25);
        assert!(streamer.chunks().values().all(Chunk::is_ready));
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 25);

        streamer.shutdown().unwrap();
    }

    #[test]
    fn duplicate_request_is_a_no_op() {
        let (mut streamer, backend) = streamer(small_config(0, 1));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        let coord = ChunkCoord::new(0, 1, 0);
        streamer.request_chunk(coord);
        streamer.request_chunk(coord);
        assert_eq!(streamer.chunks().len(), 1);

        drain_until(&mut streamer, 1);
        // Give a duplicate task time to surface if one was ever enqueued.
        std::thread::sleep(Duration::from_millis(20));
        assert!(streamer.drain_completed().is_empty());
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

        streamer.shutdown().unwrap();
    }

    #[test]
    fn moving_within_a_chunk_changes_nothing() {
        let (mut streamer, _backend) = streamer(small_config(1, 1));

        streamer.update_streaming(Vec3::new(2.0, 9.0, 2.0));
        let loaded = streamer.chunks().len();
        assert_eq!(loaded, 9);

        let evicted = streamer.update_streaming(Vec3::new(3.5, 9.5, 2.5));
        assert!(evicted.is_empty());
        assert_eq!(streamer.chunks().len(), loaded);

        drain_until(&mut streamer, 9);
        streamer.shutdown().unwrap();
    }

    #[test]
    fn window_recrossing_restores_the_same_set() {
        let (mut streamer, _backend) = streamer(small_config(2, 2));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        let initial: HashSet<ChunkCoord> = streamer.chunks().keys().copied().collect();
        assert_eq!(initial.len(), 25);
        drain_until(&mut streamer, 25);

        // Far enough that the windows do not overlap.
        let evicted = streamer.update_streaming(Vec3::new(81.0, 9.0, 1.0));
        assert_eq!(evicted.len(), 25);
        drain_until(&mut streamer, 25);

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        let restored: HashSet<ChunkCoord> = streamer.chunks().keys().copied().collect();
        assert_eq!(restored, initial);

        drain_until(&mut streamer, 25);
        streamer.shutdown().unwrap();
    }

    #[test]
    fn orphaned_completion_is_discarded() {
        let (mut streamer, backend) = streamer(small_config(0, 1));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        // Evict before draining; the first completion arrives homeless.
        streamer.update_streaming(Vec3::new(801.0, 9.0, 1.0));
        assert_eq!(streamer.chunks().len(), 1);

        let deadline = Instant::now() + Duration::from_secs(10);
        while backend.uploads.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline, "workers stalled");
            std::thread::sleep(Duration::from_millis(2));
        }

        let adopted = streamer.drain_completed();
        assert_eq!(adopted, vec![ChunkCoord::new(100, 1, 0)]);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);

        streamer.shutdown().unwrap();
    }

    #[test]
    fn dirty_chunk_is_remeshed_and_old_mesh_flushed() {
        let (mut streamer, backend) = streamer(small_config(0, 1));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        let coord = ChunkCoord::new(0, 1, 0);
        drain_until(&mut streamer, 1);

        streamer.mark_dirty(coord);
        drain_until(&mut streamer, 1);
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 2);
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 0);

        streamer.flush_evicted().unwrap();
        assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);

        streamer.shutdown().unwrap();
    }

    #[test]
    fn uploads_never_overlap_on_the_queue() {
        let (mut streamer, backend) = streamer(small_config(2, 4));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        drain_until(&mut streamer, 25);
        streamer.shutdown().unwrap();

        assert_eq!(backend.uploads.load(Ordering::SeqCst), 25);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_releases_every_mesh() {
        let (mut streamer, backend) = streamer(small_config(1, 2));

        streamer.update_streaming(Vec3::new(1.0, 9.0, 1.0));
        drain_until(&mut streamer, 9);
        streamer.shutdown().unwrap();

        assert_eq!(
            backend.destroyed.load(Ordering::SeqCst),
            backend.uploads.load(Ordering::SeqCst)
        );
    }
}
