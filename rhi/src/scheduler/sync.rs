//! GPU synchronization primitives.
//!
//! Thin owners of backend fences and semaphores. Both destroy their backend
//! object on drop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, FenceHandle, SemaphoreHandle};
use crate::error::Result;

/// GPU semaphore for synchronizing operations within a frame.
///
/// Semaphores are used for GPU-GPU synchronization:
/// - One submission signals the semaphore when complete
/// - Another submission (or a present) waits on it before starting
///
/// Unlike fences, semaphores cannot be waited on from the CPU.
pub struct Semaphore {
    backend: Arc<dyn Backend>,
    handle: SemaphoreHandle,
}

impl Semaphore {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        let handle = backend.create_semaphore()?;
        Ok(Self { backend, handle })
    }

    pub fn handle(&self) -> SemaphoreHandle {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.backend.destroy_semaphore(self.handle);
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Semaphore").field(&self.handle).finish()
    }
}

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

/// CPU-GPU synchronization primitive.
///
/// Fences allow the CPU to wait for GPU work to complete. The scheduler
/// keeps one per queue and frame slot and waits on them before reusing the
/// slot's resources.
///
/// # Example
///
/// ```ignore
/// // Before reusing frame resources:
/// fence.wait()?;
/// assert_eq!(fence.status()?, FenceStatus::Signaled);
/// fence.reset()?;
/// ```
pub struct Fence {
    backend: Arc<dyn Backend>,
    handle: FenceHandle,
    /// Set while a submission that signals the fence is outstanding.
    submitted: bool,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        let handle = backend.create_fence(false)?;
        Ok(Self {
            backend,
            handle,
            submitted: false,
        })
    }

    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    /// Returns true if a submission will signal this fence.
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.submitted = true;
    }

    /// Check the current status of the fence without blocking.
    pub fn status(&self) -> Result<FenceStatus> {
        let signaled = self
            .backend
            .wait_fences(&[self.handle], Some(Duration::ZERO))?;
        Ok(if signaled {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        })
    }

    /// Wait for the fence to be signaled (blocking).
    pub fn wait(&self) -> Result<()> {
        self.backend.wait_fences(&[self.handle], None)?;
        Ok(())
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        Ok(self.backend.wait_fences(&[self.handle], Some(timeout))?)
    }

    /// Reset the fence to unsignaled state.
    ///
    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&mut self) -> Result<()> {
        self.backend.reset_fences(&[self.handle])?;
        self.submitted = false;
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.backend.destroy_fence(self.handle);
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("handle", &self.handle)
            .field("submitted", &self.submitted)
            .finish()
    }
}

/// Semaphores owned by one frame slot.
///
/// Semaphores handed out during a frame are recycled only after the slot's
/// fences have signaled, when every wait on them has completed.
#[derive(Debug, Default)]
pub(crate) struct SemaphorePool {
    free: Vec<Semaphore>,
    in_use: Vec<Semaphore>,
}

impl SemaphorePool {
    pub(crate) fn acquire(&mut self, backend: &Arc<dyn Backend>) -> Result<SemaphoreHandle> {
        let semaphore = match self.free.pop() {
            Some(semaphore) => semaphore,
            None => Semaphore::new(Arc::clone(backend))?,
        };
        let handle = semaphore.handle();
        self.in_use.push(semaphore);
        Ok(handle)
    }

    /// Make every semaphore of the finished frame available again.
    pub(crate) fn recycle(&mut self) {
        self.free.append(&mut self.in_use);
    }

    /// Remove a semaphore that may still be signaled with nothing waiting on it.
    pub(crate) fn retire(&mut self, handle: SemaphoreHandle) -> Option<Semaphore> {
        let index = self.in_use.iter().position(|s| s.handle() == handle)?;
        Some(self.in_use.swap_remove(index))
    }

    pub(crate) fn len(&self) -> usize {
        self.free.len() + self.in_use.len()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, DummyConfig, SubmitInfo};
    use crate::types::QueueType;

    fn deferred_backend() -> Arc<DummyBackend> {
        Arc::new(DummyBackend::with_config(
            DummyConfig::default().with_deferred_completion(true),
        ))
    }

    fn submit_with(backend: &DummyBackend, fence: &Fence) {
        backend
            .submit(&SubmitInfo {
                queue: QueueType::Graphics,
                command_lists: &[],
                wait_semaphores: &[],
                signal_semaphores: &[],
                fence: Some(fence.handle()),
            })
            .unwrap();
    }

    #[test]
    fn test_fence_unsignaled() {
        let backend = Arc::new(DummyBackend::new());
        let fence = Fence::new(backend).unwrap();
        assert_eq!(fence.status().unwrap(), FenceStatus::Unsignaled);
        assert!(!fence.is_submitted());
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let backend = deferred_backend();
        let mut fence = Fence::new(backend.clone()).unwrap();
        submit_with(&backend, &fence);
        fence.mark_submitted();

        // Simulate the GPU finishing from another thread
        let gpu = Arc::clone(&backend);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            gpu.complete_pending_work();
        });

        fence.wait().unwrap();
        assert_eq!(fence.status().unwrap(), FenceStatus::Signaled);
        worker.join().unwrap();
    }

    #[test]
    fn test_fence_wait_timeout() {
        let backend = deferred_backend();
        let fence = Fence::new(backend.clone()).unwrap();
        submit_with(&backend, &fence);

        // Should timeout since nothing completes the work
        let result = fence.wait_timeout(Duration::from_millis(10)).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_fence_reset() {
        let backend = Arc::new(DummyBackend::new());
        let mut fence = Fence::new(backend.clone()).unwrap();
        submit_with(&backend, &fence);
        fence.mark_submitted();
        assert_eq!(fence.status().unwrap(), FenceStatus::Signaled);

        fence.reset().unwrap();
        assert!(!fence.is_submitted());
        assert_eq!(fence.status().unwrap(), FenceStatus::Unsignaled);
    }

    #[test]
    fn test_semaphore_pool_recycles() {
        let backend = Arc::new(DummyBackend::new());
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let mut pool = SemaphorePool::default();

        let first = pool.acquire(&dyn_backend).unwrap();
        let second = pool.acquire(&dyn_backend).unwrap();
        assert_ne!(first, second);
        assert_eq!(backend.live_semaphore_count(), 2);

        pool.recycle();
        pool.acquire(&dyn_backend).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(backend.live_semaphore_count(), 2);

        let retired = pool.retire(second).or_else(|| pool.retire(first));
        assert!(retired.is_some());
        drop(retired);
        drop(pool);
        assert_eq!(backend.live_semaphore_count(), 0);
    }
}
