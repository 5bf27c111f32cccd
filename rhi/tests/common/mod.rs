//! Common utilities for frame graph integration tests.
//!
//! Every test runs against the [`DummyBackend`], which records each backend
//! call so tests can assert on the exact barriers, submissions and presents.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_rhi::backend::{BarrierCommand, SemaphoreHandle, SwapchainHandle};
use redlilium_rhi::{
    AllocatorConfig, BackendEvent, BufferDescriptor, BufferUsage, DummyBackend, DummyConfig,
    Extent2d, FrameScheduler, QueueType, SchedulerConfig, TextureDescriptor, TextureFormat,
    TextureUsage,
};

pub const MIB: u64 = 1024 * 1024;

/// Default frame size used by the tests.
pub const FRAME_SIZE: Extent2d = Extent2d {
    width: 64,
    height: 64,
};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A scheduler on top of a dummy backend.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub scheduler: FrameScheduler,
}

impl TestContext {
    /// Default heaps, two frames in flight.
    pub fn new() -> Self {
        Self::with_backend(DummyConfig::default(), 2)
    }

    /// Device heap of `heap_size` bytes, so transient blocks are `heap_size / 8`.
    pub fn with_device_heap(heap_size: u64, frames_in_flight: usize) -> Self {
        Self::with_backend(
            DummyConfig::default().with_device_heap_size(heap_size),
            frames_in_flight,
        )
    }

    pub fn with_backend(config: DummyConfig, frames_in_flight: usize) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::with_config(config));
        let config = SchedulerConfig::default()
            .with_frames_in_flight(frames_in_flight)
            .with_allocator(AllocatorConfig::default());
        let scheduler = FrameScheduler::new(backend.clone(), config)
            .expect("scheduler creation on the dummy backend");
        Self { backend, scheduler }
    }

    /// A two-image swapchain of FRAME_SIZE.
    pub fn create_swapchain(&self, image_count: u32) -> SwapchainHandle {
        let desc = TextureDescriptor::new_2d(
            FRAME_SIZE.width,
            FRAME_SIZE.height,
            TextureFormat::Bgra8UnormSrgb,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .with_label("backbuffer");
        self.backend.create_swapchain(desc, image_count)
    }

    pub fn submits(&self) -> Vec<Submit> {
        submits(&self.backend.events())
    }

    pub fn barriers(&self) -> Vec<BarrierCommand> {
        self.backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BackendEvent::PipelineBarrier { barriers, .. } => Some(barriers),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count_events(&self, predicate: impl Fn(&BackendEvent) -> bool) -> usize {
        self.backend.events().iter().filter(|e| predicate(e)).count()
    }
}

/// A recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submit {
    pub queue: QueueType,
    pub list_count: usize,
    pub waits: Vec<SemaphoreHandle>,
    pub signals: Vec<SemaphoreHandle>,
    pub has_fence: bool,
}

pub fn submits(events: &[BackendEvent]) -> Vec<Submit> {
    events
        .iter()
        .filter_map(|event| match event {
            BackendEvent::Submit {
                queue,
                command_lists,
                waits,
                signals,
                fence,
            } => Some(Submit {
                queue: *queue,
                list_count: command_lists.len(),
                waits: waits.iter().map(|(semaphore, _)| *semaphore).collect(),
                signals: signals.clone(),
                has_fence: fence.is_some(),
            }),
            _ => None,
        })
        .collect()
}

/// Storage buffer usable by compute and transfer passes.
pub fn storage_buffer(size: u64, label: &str) -> BufferDescriptor {
    BufferDescriptor::new(size, BufferUsage::STORAGE | BufferUsage::COPY_SRC).with_label(label)
}

/// Full-resolution color target that can also be sampled.
pub fn color_target(label: &str) -> TextureDescriptor {
    TextureDescriptor::frame_relative(
        1.0,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
    .with_label(label)
}
