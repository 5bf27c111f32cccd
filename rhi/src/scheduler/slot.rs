//! Per-frame-slot resources.

use std::sync::Arc;

use crate::allocator::TransientAllocator;
use crate::backend::{Backend, BufferHandle, CommandListHandle, FenceHandle, ImageHandle};
use crate::config::AllocatorConfig;
use crate::error::Result;
use crate::types::QueueType;

use super::sync::{Fence, SemaphorePool};

/// Everything a frame needs that must outlive its GPU execution.
///
/// With N frames in flight there are N slots, used round-robin. A slot is
/// only reused after [`wait`](Self::wait) returned, at which point every
/// resource recorded in it is idle.
#[derive(Debug)]
pub(crate) struct FrameSlot {
    backend: Arc<dyn Backend>,
    /// One fence per queue, signaled by the queue's last submission.
    fences: Vec<Fence>,
    pub(crate) semaphores: SemaphorePool,
    command_lists: Vec<CommandListHandle>,
    /// Transient resources, destroyed when the slot comes around again.
    images: Vec<ImageHandle>,
    buffers: Vec<BufferHandle>,
    pub(crate) allocator: TransientAllocator,
}

impl FrameSlot {
    pub(crate) fn new(backend: Arc<dyn Backend>, allocator: AllocatorConfig) -> Result<Self> {
        let fences = QueueType::ALL
            .iter()
            .map(|_| Fence::new(Arc::clone(&backend)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            allocator: TransientAllocator::new(Arc::clone(&backend), allocator),
            backend,
            fences,
            semaphores: SemaphorePool::default(),
            command_lists: Vec::new(),
            images: Vec::new(),
            buffers: Vec::new(),
        })
    }

    /// Block until all work submitted from this slot has completed.
    pub(crate) fn wait(&mut self) -> Result<()> {
        let pending: Vec<FenceHandle> = self
            .fences
            .iter()
            .filter(|fence| fence.is_submitted())
            .map(Fence::handle)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        log::trace!("Waiting on {} frame fences", pending.len());
        self.backend.wait_fences(&pending, None)?;
        for fence in self.fences.iter_mut().filter(|fence| fence.is_submitted()) {
            fence.reset()?;
        }
        Ok(())
    }

    /// Returns true if a submission of this slot has not been waited on.
    pub(crate) fn is_pending(&self) -> bool {
        self.fences.iter().any(Fence::is_submitted)
    }

    /// Returns true if `queue` has work from this slot that was not waited on.
    pub(crate) fn is_queue_pending(&self, queue: QueueType) -> bool {
        self.fences[queue.index()].is_submitted()
    }

    /// Fence signaled by the last submission to `queue`.
    pub(crate) fn fence(&self, queue: QueueType) -> FenceHandle {
        self.fences[queue.index()].handle()
    }

    /// Record that the fence of `queue` was handed to a successful submission.
    pub(crate) fn mark_fence_submitted(&mut self, queue: QueueType) {
        self.fences[queue.index()].mark_submitted();
    }

    /// Release everything of the previous frame. Call only after [`wait`](Self::wait).
    pub(crate) fn recycle(&mut self) {
        self.release_frame_resources();
        self.semaphores.recycle();
    }

    /// Destroy the frame's command lists and transients and reset the allocator.
    ///
    /// Used both when the slot is reused and when a frame fails before submission.
    pub(crate) fn release_frame_resources(&mut self) {
        for list in self.command_lists.drain(..) {
            self.backend.free_command_list(list);
        }
        for image in self.images.drain(..) {
            self.backend.destroy_image(image);
        }
        for buffer in self.buffers.drain(..) {
            self.backend.destroy_buffer(buffer);
        }
        self.allocator.reset();
    }

    pub(crate) fn track_command_list(&mut self, list: CommandListHandle) {
        self.command_lists.push(list);
    }

    pub(crate) fn track_image(&mut self, image: ImageHandle) {
        self.images.push(image);
    }

    pub(crate) fn track_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.push(buffer);
    }

    /// Number of transient resources awaiting destruction.
    pub(crate) fn deferred_count(&self) -> usize {
        self.images.len() + self.buffers.len()
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        self.release_frame_resources();
        self.allocator.release_blocks();
    }
}
