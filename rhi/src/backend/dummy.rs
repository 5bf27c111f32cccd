//! Dummy GPU backend for testing and development.
//!
//! This backend performs no GPU work. It hands out handles, tracks memory
//! heap usage against configurable heap sizes, and records every call as a
//! [`BackendEvent`] so tests can assert on the exact barriers, submissions
//! and presents produced by the scheduler.
//!
//! Fences are signaled at submission unless deferred completion is enabled,
//! in which case they stay pending until [`DummyBackend::complete_pending_work`]
//! (or `wait_idle`) runs. This simulates a GPU that lags behind the CPU.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{
    Backend, BackendError, BackendResult, BarrierCommand, BufferHandle, CommandListHandle,
    FenceHandle, ImageHandle, MemoryHandle, MemoryHeap, MemoryProperties, MemoryPropertyFlags,
    MemoryRequirements, MemoryType, RenderingInfo, SemaphoreHandle, SubmitInfo, SwapchainHandle,
};
use crate::config::align_up;
use crate::types::{
    BufferDescriptor, Extent3d, PipelineStage, QueueType, TextureDescriptor, TextureSize,
};

const IMAGE_ALIGNMENT: u64 = 1024;
const BUFFER_ALIGNMENT: u64 = 256;

/// Memory type 0: device local. Memory type 1: host visible.
const DEVICE_LOCAL_TYPE: u32 = 0;
const HOST_VISIBLE_TYPE: u32 = 1;

/// Heap configuration for [`DummyBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyConfig {
    /// Size of the device-local heap in bytes.
    pub device_heap_size: u64,
    /// Size of the host-visible heap in bytes.
    pub host_heap_size: u64,
    /// Keep fences unsignaled until [`DummyBackend::complete_pending_work`].
    pub deferred_completion: bool,
}

impl DummyConfig {
    /// Set the device-local heap size.
    pub fn with_device_heap_size(mut self, size: u64) -> Self {
        self.device_heap_size = size;
        self
    }

    /// Enable or disable deferred fence completion.
    pub fn with_deferred_completion(mut self, deferred: bool) -> Self {
        self.deferred_completion = deferred;
        self
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            device_heap_size: 4 * 1024 * 1024 * 1024,
            host_heap_size: 256 * 1024 * 1024,
            deferred_completion: false,
        }
    }
}

/// A backend call, as recorded by [`DummyBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateImage(ImageHandle),
    DestroyImage(ImageHandle),
    CreateBuffer(BufferHandle),
    DestroyBuffer(BufferHandle),
    AllocateMemory {
        memory: MemoryHandle,
        memory_type_index: u32,
        size: u64,
    },
    FreeMemory(MemoryHandle),
    BindImage {
        image: ImageHandle,
        memory: MemoryHandle,
        offset: u64,
    },
    BindBuffer {
        buffer: BufferHandle,
        memory: MemoryHandle,
        offset: u64,
    },
    PipelineBarrier {
        list: CommandListHandle,
        barriers: Vec<BarrierCommand>,
    },
    BeginRendering {
        list: CommandListHandle,
        info: RenderingInfo,
    },
    EndRendering(CommandListHandle),
    Draw(CommandListHandle),
    Dispatch(CommandListHandle),
    CopyBuffer(CommandListHandle),
    Submit {
        queue: QueueType,
        command_lists: Vec<CommandListHandle>,
        waits: Vec<(SemaphoreHandle, PipelineStage)>,
        signals: Vec<SemaphoreHandle>,
        fence: Option<FenceHandle>,
    },
    Acquire {
        swapchain: SwapchainHandle,
        image_index: u32,
        signal: SemaphoreHandle,
    },
    Present {
        queue: QueueType,
        swapchain: SwapchainHandle,
        image_index: u32,
        waits: Vec<SemaphoreHandle>,
    },
    WaitFences(Vec<FenceHandle>),
    WaitIdle,
}

#[derive(Debug)]
struct DummySwapchain {
    descriptor: TextureDescriptor,
    images: Vec<ImageHandle>,
    next: u32,
}

#[derive(Debug, Default)]
struct DummyState {
    next_id: u64,
    images: HashMap<ImageHandle, MemoryRequirements>,
    buffers: HashMap<BufferHandle, MemoryRequirements>,
    memory: HashMap<MemoryHandle, (u32, u64)>,
    heap_usage: [u64; 2],
    command_lists: HashMap<CommandListHandle, QueueType>,
    semaphores: HashSet<SemaphoreHandle>,
    fences: HashMap<FenceHandle, bool>,
    pending_fences: Vec<FenceHandle>,
    swapchains: HashMap<SwapchainHandle, DummySwapchain>,
    fail_next_submit: bool,
    fail_next_acquire: bool,
    fail_next_present: bool,
    events: Vec<BackendEvent>,
}

impl DummyState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    config: DummyConfig,
    state: Mutex<DummyState>,
    fence_signaled: Condvar,
}

impl DummyBackend {
    /// Create a new dummy backend with default heaps.
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    /// Create a dummy backend with custom heaps and completion behavior.
    pub fn with_config(config: DummyConfig) -> Self {
        log::trace!("DummyBackend: created with {:?}", config);
        Self {
            config,
            state: Mutex::new(DummyState::default()),
            fence_signaled: Condvar::new(),
        }
    }

    /// Create a swapchain with `image_count` images described by `descriptor`.
    pub fn create_swapchain(
        &self,
        descriptor: TextureDescriptor,
        image_count: u32,
    ) -> SwapchainHandle {
        let mut state = self.state.lock();
        let handle = SwapchainHandle::from_raw(state.next_id());
        let images = (0..image_count)
            .map(|_| ImageHandle::from_raw(state.next_id()))
            .collect();
        state.swapchains.insert(
            handle,
            DummySwapchain {
                descriptor,
                images,
                next: 0,
            },
        );
        handle
    }

    /// Make the next `submit` fail with [`BackendError::DeviceLost`].
    pub fn fail_next_submit(&self) {
        self.state.lock().fail_next_submit = true;
    }

    /// Make the next `acquire_next_image` report an out-of-date surface.
    pub fn fail_next_acquire(&self) {
        self.state.lock().fail_next_acquire = true;
    }

    /// Make the next `present` report an out-of-date surface.
    pub fn fail_next_present(&self) {
        self.state.lock().fail_next_present = true;
    }

    /// Signal every fence submitted so far.
    pub fn complete_pending_work(&self) {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending_fences);
        for fence in pending {
            state.fences.insert(fence, true);
        }
        self.fence_signaled.notify_all();
    }

    /// Number of fences submitted but not yet signaled.
    pub fn pending_fence_count(&self) -> usize {
        self.state.lock().pending_fences.len()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// Drain recorded events.
    pub fn take_events(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Number of live (created, not destroyed) images, excluding swapchain images.
    pub fn live_image_count(&self) -> usize {
        self.state.lock().images.len()
    }

    /// Number of live buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of live memory allocations.
    pub fn live_memory_count(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Number of live semaphores.
    pub fn live_semaphore_count(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    /// Bytes currently allocated from the device-local heap.
    pub fn device_heap_usage(&self) -> u64 {
        self.state.lock().heap_usage[DEVICE_LOCAL_TYPE as usize]
    }

    fn heap_size(&self, heap: usize) -> u64 {
        if heap == DEVICE_LOCAL_TYPE as usize {
            self.config.device_heap_size
        } else {
            self.config.host_heap_size
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_size(desc: &TextureDescriptor, extent: Extent3d) -> u64 {
    let bpp = desc.format.block_size() as u64;
    let layers = desc.array_layer_count.max(1) as u64;
    let samples = desc.sample_count.max(1) as u64;
    (0..desc.mip_level_count.max(1))
        .map(|mip| {
            let w = (extent.width >> mip).max(1) as u64;
            let h = (extent.height >> mip).max(1) as u64;
            let d = (extent.depth >> mip).max(1) as u64;
            w.saturating_mul(h).saturating_mul(d).saturating_mul(bpp)
        })
        .fold(0u64, u64::saturating_add)
        .saturating_mul(layers)
        .saturating_mul(samples)
}

impl Backend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_image(
        &self,
        desc: &TextureDescriptor,
        extent: Extent3d,
    ) -> BackendResult<ImageHandle> {
        let requested = image_size(desc, extent).max(1);
        let size = align_up(requested, IMAGE_ALIGNMENT)
            .ok_or(BackendError::OutOfDeviceMemory { requested })?;
        let mut state = self.state.lock();
        let image = ImageHandle::from_raw(state.next_id());
        state.images.insert(
            image,
            MemoryRequirements {
                size,
                alignment: IMAGE_ALIGNMENT,
                memory_type_bits: 1 << DEVICE_LOCAL_TYPE,
            },
        );
        state.events.push(BackendEvent::CreateImage(image));
        log::trace!(
            "DummyBackend: creating image {:?} {:?} ({}x{}x{}, {} bytes)",
            image,
            desc.label,
            extent.width,
            extent.height,
            extent.depth,
            size
        );
        Ok(image)
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut state = self.state.lock();
        if state.images.remove(&image).is_some() {
            state.events.push(BackendEvent::DestroyImage(image));
        } else {
            log::warn!("DummyBackend: destroying unknown image {:?}", image);
        }
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let size = align_up(desc.size.max(1), BUFFER_ALIGNMENT).ok_or(
            BackendError::OutOfDeviceMemory {
                requested: desc.size,
            },
        )?;
        let mut state = self.state.lock();
        let buffer = BufferHandle::from_raw(state.next_id());
        state.buffers.insert(
            buffer,
            MemoryRequirements {
                size,
                alignment: BUFFER_ALIGNMENT,
                memory_type_bits: (1 << DEVICE_LOCAL_TYPE) | (1 << HOST_VISIBLE_TYPE),
            },
        );
        state.events.push(BackendEvent::CreateBuffer(buffer));
        log::trace!(
            "DummyBackend: creating buffer {:?} {:?} (size: {})",
            buffer,
            desc.label,
            desc.size
        );
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_some() {
            state.events.push(BackendEvent::DestroyBuffer(buffer));
        } else {
            log::warn!("DummyBackend: destroying unknown buffer {:?}", buffer);
        }
    }

    fn image_memory_requirements(&self, image: ImageHandle) -> BackendResult<MemoryRequirements> {
        self.state
            .lock()
            .images
            .get(&image)
            .copied()
            .ok_or_else(|| BackendError::InvalidHandle(format!("{image:?}")))
    }

    fn buffer_memory_requirements(
        &self,
        buffer: BufferHandle,
    ) -> BackendResult<MemoryRequirements> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .copied()
            .ok_or_else(|| BackendError::InvalidHandle(format!("{buffer:?}")))
    }

    fn memory_properties(&self) -> MemoryProperties {
        MemoryProperties {
            memory_types: vec![
                MemoryType {
                    property_flags: MemoryPropertyFlags::DEVICE_LOCAL,
                    heap_index: 0,
                },
                MemoryType {
                    property_flags: MemoryPropertyFlags::HOST_VISIBLE
                        | MemoryPropertyFlags::HOST_COHERENT,
                    heap_index: 1,
                },
            ],
            memory_heaps: vec![
                MemoryHeap {
                    size: self.config.device_heap_size,
                },
                MemoryHeap {
                    size: self.config.host_heap_size,
                },
            ],
        }
    }

    fn allocate_memory(&self, memory_type_index: u32, size: u64) -> BackendResult<MemoryHandle> {
        let heap = memory_type_index as usize;
        if heap > 1 {
            return Err(BackendError::InvalidHandle(format!(
                "memory type {memory_type_index}"
            )));
        }
        let mut state = self.state.lock();
        let fits = state.heap_usage[heap]
            .checked_add(size)
            .is_some_and(|total| total <= self.heap_size(heap));
        if !fits {
            log::trace!(
                "DummyBackend: heap {} exhausted ({} + {} > {})",
                heap,
                state.heap_usage[heap],
                size,
                self.heap_size(heap)
            );
            return Err(BackendError::OutOfDeviceMemory { requested: size });
        }
        state.heap_usage[heap] += size;
        let memory = MemoryHandle::from_raw(state.next_id());
        state.memory.insert(memory, (memory_type_index, size));
        state.events.push(BackendEvent::AllocateMemory {
            memory,
            memory_type_index,
            size,
        });
        log::trace!(
            "DummyBackend: allocated {} bytes from memory type {}",
            size,
            memory_type_index
        );
        Ok(memory)
    }

    fn free_memory(&self, memory: MemoryHandle) {
        let mut state = self.state.lock();
        if let Some((ty, size)) = state.memory.remove(&memory) {
            state.heap_usage[ty as usize] -= size;
            state.events.push(BackendEvent::FreeMemory(memory));
        } else {
            log::warn!("DummyBackend: freeing unknown memory {:?}", memory);
        }
    }

    fn bind_image_memory(
        &self,
        image: ImageHandle,
        memory: MemoryHandle,
        offset: u64,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        let reqs = *state
            .images
            .get(&image)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{image:?}")))?;
        let (_, size) = *state
            .memory
            .get(&memory)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{memory:?}")))?;
        if offset % reqs.alignment != 0 || offset + reqs.size > size {
            return Err(BackendError::Internal(format!(
                "image {image:?} does not fit at offset {offset} of {memory:?}"
            )));
        }
        state.events.push(BackendEvent::BindImage {
            image,
            memory,
            offset,
        });
        Ok(())
    }

    fn bind_buffer_memory(
        &self,
        buffer: BufferHandle,
        memory: MemoryHandle,
        offset: u64,
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        let reqs = *state
            .buffers
            .get(&buffer)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{buffer:?}")))?;
        let (_, size) = *state
            .memory
            .get(&memory)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{memory:?}")))?;
        if offset % reqs.alignment != 0 || offset + reqs.size > size {
            return Err(BackendError::Internal(format!(
                "buffer {buffer:?} does not fit at offset {offset} of {memory:?}"
            )));
        }
        state.events.push(BackendEvent::BindBuffer {
            buffer,
            memory,
            offset,
        });
        Ok(())
    }

    fn allocate_command_list(&self, queue: QueueType) -> BackendResult<CommandListHandle> {
        let mut state = self.state.lock();
        let list = CommandListHandle::from_raw(state.next_id());
        state.command_lists.insert(list, queue);
        Ok(list)
    }

    fn free_command_list(&self, list: CommandListHandle) {
        self.state.lock().command_lists.remove(&list);
    }

    fn cmd_pipeline_barrier(&self, list: CommandListHandle, barriers: &[BarrierCommand]) {
        for barrier in barriers {
            log::trace!(
                "DummyBackend: barrier {:?} {:?} -> {:?}",
                barrier.resource,
                barrier.src.layout,
                barrier.dst.layout
            );
        }
        self.state.lock().events.push(BackendEvent::PipelineBarrier {
            list,
            barriers: barriers.to_vec(),
        });
    }

    fn cmd_begin_rendering(&self, list: CommandListHandle, info: &RenderingInfo) {
        self.state.lock().events.push(BackendEvent::BeginRendering {
            list,
            info: info.clone(),
        });
    }

    fn cmd_end_rendering(&self, list: CommandListHandle) {
        self.state.lock().events.push(BackendEvent::EndRendering(list));
    }

    fn cmd_draw(&self, list: CommandListHandle, vertex_count: u32, instance_count: u32) {
        log::trace!(
            "DummyBackend: draw {} vertices x {} instances",
            vertex_count,
            instance_count
        );
        self.state.lock().events.push(BackendEvent::Draw(list));
    }

    fn cmd_dispatch(&self, list: CommandListHandle, x: u32, y: u32, z: u32) {
        log::trace!("DummyBackend: dispatch {}x{}x{}", x, y, z);
        self.state.lock().events.push(BackendEvent::Dispatch(list));
    }

    fn cmd_copy_buffer(
        &self,
        list: CommandListHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) {
        log::trace!("DummyBackend: copy {} bytes {:?} -> {:?}", size, src, dst);
        self.state.lock().events.push(BackendEvent::CopyBuffer(list));
    }

    fn create_semaphore(&self) -> BackendResult<SemaphoreHandle> {
        let mut state = self.state.lock();
        let semaphore = SemaphoreHandle::from_raw(state.next_id());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.state.lock().semaphores.remove(&semaphore);
    }

    fn create_fence(&self, signaled: bool) -> BackendResult<FenceHandle> {
        let mut state = self.state.lock();
        let fence = FenceHandle::from_raw(state.next_id());
        state.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        state.pending_fences.retain(|&f| f != fence);
    }

    fn wait_fences(
        &self,
        fences: &[FenceHandle],
        timeout: Option<Duration>,
    ) -> BackendResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        state.events.push(BackendEvent::WaitFences(fences.to_vec()));
        loop {
            let mut all_signaled = true;
            for fence in fences {
                match state.fences.get(fence) {
                    Some(true) => {}
                    Some(false) => all_signaled = false,
                    None => return Err(BackendError::InvalidHandle(format!("{fence:?}"))),
                }
            }
            if all_signaled {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .fence_signaled
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        return Ok(fences.iter().all(|f| state.fences.get(f) == Some(&true)));
                    }
                }
                None => self.fence_signaled.wait(&mut state),
            }
        }
    }

    fn reset_fences(&self, fences: &[FenceHandle]) -> BackendResult<()> {
        let mut state = self.state.lock();
        for fence in fences {
            match state.fences.get_mut(fence) {
                Some(signaled) => *signaled = false,
                None => return Err(BackendError::InvalidHandle(format!("{fence:?}"))),
            }
        }
        Ok(())
    }

    fn submit(&self, info: &SubmitInfo<'_>) -> BackendResult<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_submit) {
            log::trace!("DummyBackend: simulated device loss on {} queue", info.queue);
            return Err(BackendError::DeviceLost);
        }
        for list in info.command_lists {
            if !state.command_lists.contains_key(list) {
                return Err(BackendError::InvalidHandle(format!("{list:?}")));
            }
        }
        state.events.push(BackendEvent::Submit {
            queue: info.queue,
            command_lists: info.command_lists.to_vec(),
            waits: info.wait_semaphores.to_vec(),
            signals: info.signal_semaphores.to_vec(),
            fence: info.fence,
        });
        log::trace!(
            "DummyBackend: submit {} command lists to {} queue ({} waits, {} signals)",
            info.command_lists.len(),
            info.queue,
            info.wait_semaphores.len(),
            info.signal_semaphores.len()
        );
        if let Some(fence) = info.fence {
            if self.config.deferred_completion {
                state.pending_fences.push(fence);
            } else {
                state.fences.insert(fence, true);
                self.fence_signaled.notify_all();
            }
        }
        Ok(())
    }

    fn wait_idle(&self) -> BackendResult<()> {
        {
            let mut state = self.state.lock();
            state.events.push(BackendEvent::WaitIdle);
        }
        self.complete_pending_work();
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> BackendResult<u32> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_acquire) {
            return Err(BackendError::SurfaceOutOfDate);
        }
        let chain = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{swapchain:?}")))?;
        let image_index = chain.next;
        chain.next = (chain.next + 1) % chain.images.len().max(1) as u32;
        state.events.push(BackendEvent::Acquire {
            swapchain,
            image_index,
            signal,
        });
        Ok(image_index)
    }

    fn swapchain_image(&self, swapchain: SwapchainHandle, index: u32) -> BackendResult<ImageHandle> {
        let state = self.state.lock();
        state
            .swapchains
            .get(&swapchain)
            .and_then(|chain| chain.images.get(index as usize).copied())
            .ok_or_else(|| BackendError::InvalidHandle(format!("{swapchain:?} image {index}")))
    }

    fn swapchain_descriptor(&self, swapchain: SwapchainHandle) -> BackendResult<TextureDescriptor> {
        let state = self.state.lock();
        let chain = state
            .swapchains
            .get(&swapchain)
            .ok_or_else(|| BackendError::InvalidHandle(format!("{swapchain:?}")))?;
        debug_assert!(matches!(chain.descriptor.size, TextureSize::Absolute(_)));
        Ok(chain.descriptor.clone())
    }

    fn present(
        &self,
        queue: QueueType,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: &[SemaphoreHandle],
    ) -> BackendResult<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_present) {
            return Err(BackendError::SurfaceOutOfDate);
        }
        state.events.push(BackendEvent::Present {
            queue,
            swapchain,
            image_index,
            waits: wait.to_vec(),
        });
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_dummy_backend_name() {
        assert_eq!(DummyBackend::new().name(), "Dummy");
    }

    #[test]
    fn test_image_requirements() {
        let backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let image = backend.create_image(&desc, Extent3d::new_2d(64, 64)).unwrap();
        let reqs = backend.image_memory_requirements(image).unwrap();
        assert_eq!(reqs.size, 64 * 64 * 4);
        assert_eq!(reqs.memory_type_bits, 0b01);

        backend.destroy_image(image);
        assert!(backend.image_memory_requirements(image).is_err());
    }

    #[test]
    fn test_heap_exhaustion() {
        let backend =
            DummyBackend::with_config(DummyConfig::default().with_device_heap_size(1024));
        let memory = backend.allocate_memory(0, 1024).unwrap();
        assert_eq!(
            backend.allocate_memory(0, 1),
            Err(BackendError::OutOfDeviceMemory { requested: 1 })
        );
        backend.free_memory(memory);
        assert!(backend.allocate_memory(0, 512).is_ok());
    }

    #[test]
    fn test_bind_out_of_bounds() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(512, BufferUsage::STORAGE))
            .unwrap();
        let memory = backend.allocate_memory(0, 512).unwrap();
        assert!(backend.bind_buffer_memory(buffer, memory, 0).is_ok());
        assert!(backend.bind_buffer_memory(buffer, memory, 256).is_err());
    }

    #[test]
    fn test_fence_signaled_on_submit() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        backend
            .submit(&SubmitInfo {
                queue: QueueType::Graphics,
                command_lists: &[],
                wait_semaphores: &[],
                signal_semaphores: &[],
                fence: Some(fence),
            })
            .unwrap();
        assert!(backend.wait_fences(&[fence], Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn test_deferred_fence_wait_timeout() {
        let backend =
            DummyBackend::with_config(DummyConfig::default().with_deferred_completion(true));
        let fence = backend.create_fence(false).unwrap();
        backend
            .submit(&SubmitInfo {
                queue: QueueType::Compute,
                command_lists: &[],
                wait_semaphores: &[],
                signal_semaphores: &[],
                fence: Some(fence),
            })
            .unwrap();
        assert_eq!(backend.pending_fence_count(), 1);
        assert!(
            !backend
                .wait_fences(&[fence], Some(Duration::from_millis(10)))
                .unwrap()
        );

        backend.complete_pending_work();
        assert!(backend.wait_fences(&[fence], None).unwrap());
    }

    #[test]
    fn test_deferred_fence_signaled_from_thread() {
        let backend = std::sync::Arc::new(DummyBackend::with_config(
            DummyConfig::default().with_deferred_completion(true),
        ));
        let fence = backend.create_fence(false).unwrap();
        backend
            .submit(&SubmitInfo {
                queue: QueueType::Graphics,
                command_lists: &[],
                wait_semaphores: &[],
                signal_semaphores: &[],
                fence: Some(fence),
            })
            .unwrap();

        // Simulate GPU completion from another thread
        let gpu = std::sync::Arc::clone(&backend);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            gpu.complete_pending_work();
        });

        assert!(backend.wait_fences(&[fence], None).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_swapchain_cycles_images() {
        let backend = DummyBackend::new();
        let desc = TextureDescriptor::new_2d(
            800,
            600,
            TextureFormat::Bgra8UnormSrgb,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let swapchain = backend.create_swapchain(desc, 2);
        let semaphore = backend.create_semaphore().unwrap();
        assert_eq!(backend.acquire_next_image(swapchain, semaphore), Ok(0));
        assert_eq!(backend.acquire_next_image(swapchain, semaphore), Ok(1));
        assert_eq!(backend.acquire_next_image(swapchain, semaphore), Ok(0));

        backend.fail_next_acquire();
        assert_eq!(
            backend.acquire_next_image(swapchain, semaphore),
            Err(BackendError::SurfaceOutOfDate)
        );
    }

    #[test]
    fn test_submit_failure_is_one_shot() {
        let backend = DummyBackend::new();
        backend.fail_next_submit();
        let info = SubmitInfo {
            queue: QueueType::Graphics,
            command_lists: &[],
            wait_semaphores: &[],
            signal_semaphores: &[],
            fence: None,
        };
        assert_eq!(backend.submit(&info), Err(BackendError::DeviceLost));
        assert!(backend.submit(&info).is_ok());
    }
}
