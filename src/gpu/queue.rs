use crate::error::GpuError;
use ash::vk;
use parking_lot::{Mutex, MutexGuard};

/// The single device submission queue behind one mutual-exclusion domain.
/// Submits, presents and idle-waits are only reachable through the guard
/// returned by [`lock`](Self::lock), so no call site can touch the queue
/// unsynchronized.
pub struct SubmissionQueue {
    queue: Mutex<vk::Queue>,
}

impl SubmissionQueue {
    pub fn new(queue: vk::Queue) -> Self {
        Self {
            queue: Mutex::new(queue),
        }
    }

    /// Blocks until this thread holds exclusive access to the queue.
    pub fn lock(&self) -> QueueGuard<'_> {
        QueueGuard {
            queue: self.queue.lock(),
        }
    }
}

/// Scoped exclusive access to the device queue.
pub struct QueueGuard<'a> {
    queue: MutexGuard<'a, vk::Queue>,
}

impl QueueGuard<'_> {
    pub fn raw(&self) -> vk::Queue {
        *self.queue
    }

    /// Submits one command buffer and synchronously waits for it to retire.
    pub fn submit_and_wait(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), GpuError> {
        let command_buffers = [command_buffer];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();
        unsafe {
            device.queue_submit(*self.queue, &[submit], vk::Fence::null())?;
            device.queue_wait_idle(*self.queue)?;
        }
        Ok(())
    }

    /// Full queue-idle checkpoint; the gate for deferred destruction.
    pub fn wait_idle(&self, device: &ash::Device) -> Result<(), GpuError> {
        unsafe { device.queue_wait_idle(*self.queue)? };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn guard_admits_one_thread_at_a_time() {
        let queue = Arc::new(SubmissionQueue::new(vk::Queue::null()));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let inside = inside.clone();
                let peak = peak.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _guard = queue.lock();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::hint::black_box(now);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
