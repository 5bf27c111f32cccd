//! GPU backend abstraction layer.
//!
//! The render graph, transient allocator and frame scheduler never touch a
//! native graphics API directly. Everything they need goes through the
//! [`Backend`] trait, implemented once per target API.
//!
//! # Available Backends
//!
//! - `dummy` (default): In-memory backend that records every call, for tests
//!   and headless development
//!
//! # Contract
//!
//! | Area | Methods |
//! |------|---------|
//! | Resources | `create_image`, `create_buffer`, `destroy_*`, `*_memory_requirements` |
//! | Memory | `memory_properties`, `allocate_memory`, `free_memory`, `bind_*_memory` |
//! | Recording | `allocate_command_list`, `cmd_pipeline_barrier`, `cmd_begin_rendering`, ... |
//! | Submission | `submit`, fences, semaphores, `wait_idle` |
//! | Presentation | `acquire_next_image`, `swapchain_image`, `present` |
//!
//! All handles are opaque 64-bit identifiers owned by the backend.

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;
mod error;

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

pub use error::{BackendError, BackendResult};

#[cfg(any(test, feature = "dummy"))]
pub use dummy::{BackendEvent, DummyBackend, DummyConfig};

use crate::graph::{LoadOp, StoreOp};
use crate::types::{
    BufferDescriptor, Extent2d, Extent3d, ImageSubresourceRange, PipelineStage, QueueTransfer,
    QueueType, ResourceState, SubresourceRange, TextureDescriptor, TextureLayout,
};

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw backend identifier.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend identifier.
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

backend_handle!(
    /// Handle to a backend image.
    ImageHandle
);
backend_handle!(
    /// Handle to a backend buffer.
    BufferHandle
);
backend_handle!(
    /// Handle to a block of device memory.
    MemoryHandle
);
backend_handle!(
    /// Handle to a recordable command list.
    CommandListHandle
);
backend_handle!(
    /// Handle to a GPU-GPU semaphore.
    SemaphoreHandle
);
backend_handle!(
    /// Handle to a CPU-GPU fence.
    FenceHandle
);
backend_handle!(
    /// Handle to a presentation swapchain.
    SwapchainHandle
);

bitflags! {
    /// Properties of a memory type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
        const LAZILY_ALLOCATED = 1 << 3;
    }
}

/// One memory type exposed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub property_flags: MemoryPropertyFlags,
    /// Index into [`MemoryProperties::memory_heaps`].
    pub heap_index: u32,
}

/// One memory heap exposed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHeap {
    /// Heap size in bytes.
    pub size: u64,
}

/// Memory types and heaps of a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryProperties {
    pub memory_types: Vec<MemoryType>,
    pub memory_heaps: Vec<MemoryHeap>,
}

impl MemoryProperties {
    /// Size of the heap backing `memory_type_index`, if both exist.
    pub fn heap_size_of(&self, memory_type_index: u32) -> Option<u64> {
        let ty = self.memory_types.get(memory_type_index as usize)?;
        self.memory_heaps
            .get(ty.heap_index as usize)
            .map(|heap| heap.size)
    }
}

/// Size, alignment and compatible memory types of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRequirements {
    /// Size in bytes.
    pub size: u64,
    /// Required offset alignment in bytes.
    pub alignment: u64,
    /// Bit `i` is set if memory type `i` can back the resource.
    pub memory_type_bits: u32,
}

/// Resource targeted by a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierResource {
    Image(ImageHandle),
    Buffer(BufferHandle),
}

/// A single pipeline barrier as recorded into a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarrierCommand {
    pub resource: BarrierResource,
    pub range: SubresourceRange,
    /// State before the barrier.
    pub src: ResourceState,
    /// State after the barrier.
    pub dst: ResourceState,
    /// Queue-family ownership transfer, if any.
    pub queue_transfer: Option<QueueTransfer>,
}

/// An attachment bound for dynamic rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingAttachment {
    pub image: ImageHandle,
    pub range: ImageSubresourceRange,
    pub layout: TextureLayout,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Parameters for [`Backend::cmd_begin_rendering`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderingInfo {
    pub render_area: Extent2d,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

/// Parameters for [`Backend::submit`].
#[derive(Debug, Clone, Copy)]
pub struct SubmitInfo<'a> {
    pub queue: QueueType,
    pub command_lists: &'a [CommandListHandle],
    /// Semaphores to wait on, with the stages that wait.
    pub wait_semaphores: &'a [(SemaphoreHandle, PipelineStage)],
    pub signal_semaphores: &'a [SemaphoreHandle],
    /// Fence signaled when all command lists complete.
    pub fence: Option<FenceHandle>,
}

/// Adapter for one native graphics API.
///
/// Implementations must be thread-safe; the scheduler holds them as
/// `Arc<dyn Backend>` and shares them with the transient allocator.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    // === Resources ===

    fn create_image(&self, desc: &TextureDescriptor, extent: Extent3d)
    -> BackendResult<ImageHandle>;
    fn destroy_image(&self, image: ImageHandle);
    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn image_memory_requirements(&self, image: ImageHandle) -> BackendResult<MemoryRequirements>;
    fn buffer_memory_requirements(
        &self,
        buffer: BufferHandle,
    ) -> BackendResult<MemoryRequirements>;

    // === Memory ===

    fn memory_properties(&self) -> MemoryProperties;
    fn allocate_memory(&self, memory_type_index: u32, size: u64) -> BackendResult<MemoryHandle>;
    fn free_memory(&self, memory: MemoryHandle);
    fn bind_image_memory(
        &self,
        image: ImageHandle,
        memory: MemoryHandle,
        offset: u64,
    ) -> BackendResult<()>;
    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: MemoryHandle,
        offset: u64,
    ) -> BackendResult<()>;

    // === Recording ===

    fn allocate_command_list(&self, queue: QueueType) -> BackendResult<CommandListHandle>;
    fn free_command_list(&self, list: CommandListHandle);
    fn cmd_pipeline_barrier(&self, list: CommandListHandle, barriers: &[BarrierCommand]);
    fn cmd_begin_rendering(&self, list: CommandListHandle, info: &RenderingInfo);
    fn cmd_end_rendering(&self, list: CommandListHandle);
    fn cmd_draw(&self, list: CommandListHandle, vertex_count: u32, instance_count: u32);
    fn cmd_dispatch(&self, list: CommandListHandle, x: u32, y: u32, z: u32);
    fn cmd_copy_buffer(
        &self,
        list: CommandListHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    );

    // === Synchronization ===

    fn create_semaphore(&self) -> BackendResult<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);
    fn create_fence(&self, signaled: bool) -> BackendResult<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    /// Wait until every fence is signaled.
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first. `None` waits forever.
    fn wait_fences(&self, fences: &[FenceHandle], timeout: Option<Duration>)
    -> BackendResult<bool>;
    fn reset_fences(&self, fences: &[FenceHandle]) -> BackendResult<()>;
    fn submit(&self, info: &SubmitInfo<'_>) -> BackendResult<()>;
    fn wait_idle(&self) -> BackendResult<()>;

    // === Presentation ===

    /// Acquire the next presentable image; `signal` is signaled when it is ready.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> BackendResult<u32>;
    fn swapchain_image(&self, swapchain: SwapchainHandle, index: u32)
    -> BackendResult<ImageHandle>;
    fn swapchain_descriptor(&self, swapchain: SwapchainHandle) -> BackendResult<TextureDescriptor>;
    fn present(
        &self,
        queue: QueueType,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: &[SemaphoreHandle],
    ) -> BackendResult<()>;
}
