//! Frame scheduling for pipelined rendering.
//!
//! The [`FrameScheduler`] drives the per-frame cycle on top of a
//! [`Backend`]:
//!
//! 1. [`begin_frame`](FrameScheduler::begin_frame) waits for the frame slot's
//!    fences and recycles everything the slot held.
//! 2. The client builds the frame's [`RenderGraph`] through the scheduler
//!    (`add_pass`, transients, imports, [`import_swapchain`](FrameScheduler::import_swapchain)).
//! 3. [`end_frame`](FrameScheduler::end_frame) compiles the graph, places
//!    transients in aliased memory, records every pass, submits one batch per
//!    queue segment and presents.
//!
//! # Frames in flight
//!
//! ```text
//! Time ─────────────────────────────────────────────────────►
//!
//! CPU:  [Frame 0] [Frame 1] [wait 0][Frame 2] [wait 1][Frame 3]
//!            │         │              │              │
//! GPU:       └─[Frame 0]─[Frame 1]────[Frame 2]──────[Frame 3]
//! ```
//!
//! With N frames in flight there are N frame slots. Slot `i % N` owns the
//! fences, semaphores, command lists, transient resources and transient
//! allocator of frame `i`; nothing in it is touched again before its fences
//! have been waited on.
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Validation, out of memory, failing pass | frame discarded, nothing submitted, scheduler stays usable |
//! | Swapchain out of date | reported after the frame's work was submitted |
//! | Device lost, failed submission | scheduler enters [`FrameState::Lost`] |
//!
//! # Example
//!
//! ```ignore
//! let mut scheduler = FrameScheduler::new(backend, SchedulerConfig::default())?;
//!
//! loop {
//!     scheduler.begin_frame(window_size)?;
//!     let backbuffer = scheduler.import_swapchain(swapchain)?;
//!     scheduler.add_pass("main", QueueType::Graphics, |builder| {
//!         builder.write_color(backbuffer, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0), StoreOp::Store)?;
//!         Ok(())
//!     }, |(), ctx| {
//!         ctx.backend().cmd_draw(ctx.command_list(), 3, 1);
//!         Ok(())
//!     })?;
//!     match scheduler.end_frame() {
//!         Ok(_) => {}
//!         Err(err) if err.is_recoverable() => recreate_swapchain(),
//!         Err(err) => return Err(err),
//!     }
//! }
//! ```

mod slot;
mod sync;

pub use sync::{Fence, FenceStatus, Semaphore};

use std::collections::HashMap;
use std::sync::Arc;

use crate::allocator::{Allocation, TransientAllocator};
use crate::backend::{
    Backend, BackendError, BarrierCommand, BarrierResource, BufferHandle, CommandListHandle,
    ImageHandle, RenderingAttachment, RenderingInfo, SemaphoreHandle, SubmitInfo,
    SwapchainHandle,
};
use crate::compiler::{Barrier, CompiledGraph, ResourceLifetime, SemaphoreSlot};
use crate::config::{MAX_FRAMES_IN_FLIGHT, SchedulerConfig};
use crate::error::{Result, RhiError, ValidationError};
use crate::graph::{
    AttachmentHandle, AttachmentId, AttachmentKind, AttachmentRegistry, AttachmentUsage,
    HandleScope, Pass, PassBuilder, PassContext, PassHandle, RenderGraph, ResourceBinding,
    next_generation,
};
use crate::types::{
    AccessFlags, BufferDescriptor, Extent2d, PipelineStage, QueueType, ResourceState,
    SubresourceRange, TextureDescriptor, TextureLayout,
};

use slot::FrameSlot;

/// Lifecycle state of a [`FrameScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames.
    Idle,
    /// `begin_frame` succeeded; the frame's graph is being built.
    FrameBegun,
    /// The device was lost or a submission failed. Every call fails.
    Lost,
}

/// Memory placement of one transient attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientPlacement {
    pub attachment: AttachmentId,
    pub name: String,
    pub allocation: Allocation,
    pub lifetime: ResourceLifetime,
}

/// Summary of a completed frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameStats {
    /// Index of the frame, starting at zero.
    pub frame_index: u64,
    pub pass_count: usize,
    pub barrier_count: usize,
    pub submission_count: usize,
    /// Cross-queue semaphores, not counting swapchain acquire and present.
    pub semaphore_count: usize,
    /// Where each transient attachment was placed.
    pub placements: Vec<TransientPlacement>,
    /// Returns true if a swapchain image was presented.
    pub presented: bool,
}

#[derive(Debug)]
struct PersistentResource {
    name: String,
    kind: AttachmentKind,
    binding: ResourceBinding,
    state: ResourceState,
    /// Last frame that used the resource on each queue.
    queue_frames: [Option<u64>; QueueType::COUNT],
}

/// Ordering between an earlier frame's work on `src` and this frame's
/// first submission on `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueHandoff {
    src: QueueType,
    dst: QueueType,
    stages: PipelineStage,
}

#[derive(Debug, Clone, Copy)]
struct AcquiredImage {
    swapchain: SwapchainHandle,
    image_index: u32,
    image: ImageHandle,
    semaphore: SemaphoreHandle,
    attachment: AttachmentHandle,
}

/// Drives frames from graph construction to presentation.
///
/// Persistent resources registered with
/// [`register_image`](Self::register_image) /
/// [`register_buffer`](Self::register_buffer) are available to every frame's
/// graph under the same handle; their state is carried from one frame to
/// the next.
#[derive(Debug)]
pub struct FrameScheduler {
    backend: Arc<dyn Backend>,
    config: SchedulerConfig,
    state: FrameState,
    slots: Vec<FrameSlot>,
    frame_index: u64,
    frame_size: Option<Extent2d>,
    graph: Option<RenderGraph>,
    persistent_generation: u32,
    persistent: Vec<Option<PersistentResource>>,
    /// Layout each swapchain image was left in by its last frame.
    swapchain_states: HashMap<ImageHandle, TextureLayout>,
    acquired: Option<AcquiredImage>,
    /// Semaphores of abandoned acquires; may still be signaled by the presentation engine.
    retired_semaphores: Vec<Semaphore>,
}

impl FrameScheduler {
    /// Create a scheduler.
    ///
    /// `frames_in_flight` is clamped to `1..=MAX_FRAMES_IN_FLIGHT`.
    pub fn new(backend: Arc<dyn Backend>, config: SchedulerConfig) -> Result<Self> {
        let frames_in_flight = config.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(Arc::clone(&backend), config.allocator))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Created frame scheduler on {} backend with {} frames in flight",
            backend.name(),
            frames_in_flight
        );

        Ok(Self {
            backend,
            config: SchedulerConfig {
                frames_in_flight,
                ..config
            },
            state: FrameState::Idle,
            slots,
            frame_index: 0,
            frame_size: None,
            graph: None,
            persistent_generation: next_generation(),
            persistent: Vec::new(),
            swapchain_states: HashMap::new(),
            acquired: None,
            retired_semaphores: Vec::new(),
        })
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index of the next frame to be ended.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Frame size of the last `begin_frame`.
    pub fn frame_size(&self) -> Option<Extent2d> {
        self.frame_size
    }

    /// Transient allocator of a frame slot.
    pub fn allocator(&self, slot: usize) -> Option<&TransientAllocator> {
        self.slots.get(slot).map(|slot| &slot.allocator)
    }

    /// Memory blocks held by all frame slots.
    pub fn transient_block_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.allocator.block_count()).sum()
    }

    /// Number of frame slots whose submitted work has not been waited on.
    pub fn pending_frame_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_pending()).count()
    }

    /// Transient resources awaiting destruction across all frame slots.
    pub fn deferred_destroy_count(&self) -> usize {
        self.slots.iter().map(FrameSlot::deferred_count).sum()
    }

    // === Persistent resources ===

    /// Register an externally owned image that lives across frames.
    ///
    /// `state` is the state the image is in right now.
    pub fn register_image(
        &mut self,
        name: impl Into<String>,
        image: ImageHandle,
        desc: TextureDescriptor,
        state: ResourceState,
    ) -> AttachmentHandle {
        self.register(
            name.into(),
            AttachmentKind::Image(desc),
            ResourceBinding::Image(image),
            state,
        )
    }

    /// Register an externally owned buffer that lives across frames.
    pub fn register_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: BufferHandle,
        desc: BufferDescriptor,
        state: ResourceState,
    ) -> AttachmentHandle {
        self.register(
            name.into(),
            AttachmentKind::Buffer(desc),
            ResourceBinding::Buffer(buffer),
            state,
        )
    }

    fn register(
        &mut self,
        name: String,
        kind: AttachmentKind,
        binding: ResourceBinding,
        state: ResourceState,
    ) -> AttachmentHandle {
        let handle = AttachmentHandle::new(
            self.persistent.len() as u32,
            HandleScope::Persistent(self.persistent_generation),
        );
        log::debug!("Registered persistent attachment '{}'", name);

        // Visible to the frame being built as well.
        if let Some(graph) = self.graph.as_mut() {
            graph
                .registry_mut()
                .add_persistent(handle, name.clone(), kind.clone(), binding, state);
        }
        self.persistent.push(Some(PersistentResource {
            name,
            kind,
            binding,
            state,
            queue_frames: [None; QueueType::COUNT],
        }));
        handle
    }

    /// Forget a persistent resource. Takes effect from the next frame.
    ///
    /// The resource itself is not destroyed.
    pub fn unregister(&mut self, handle: AttachmentHandle) -> Result<()> {
        let index = self
            .persistent_index(handle)
            .ok_or(ValidationError::UnknownAttachment(handle))?;
        if let Some(resource) = self.persistent[index].take() {
            log::debug!("Unregistered persistent attachment '{}'", resource.name);
        }
        Ok(())
    }

    /// State a persistent resource will be in when the next frame starts.
    pub fn persistent_state(&self, handle: AttachmentHandle) -> Option<ResourceState> {
        let index = self.persistent_index(handle)?;
        self.persistent[index].as_ref().map(|resource| resource.state)
    }

    fn persistent_index(&self, handle: AttachmentHandle) -> Option<usize> {
        let index = handle.index() as usize;
        let registered = handle.scope() == HandleScope::Persistent(self.persistent_generation)
            && self.persistent.get(index).is_some_and(Option::is_some);
        registered.then_some(index)
    }

    // === Frame lifecycle ===

    /// Start a frame of the given size.
    ///
    /// Blocks until the frame slot being reused has finished on the GPU. A
    /// size change waits for the device to go idle and releases every
    /// transient memory block, since the old block sizes no longer fit.
    pub fn begin_frame(&mut self, size: Extent2d) -> Result<()> {
        profile_function!();

        match self.state {
            FrameState::Lost => return Err(RhiError::DeviceLost),
            FrameState::FrameBegun => return Err(ValidationError::FrameAlreadyBegun.into()),
            FrameState::Idle => {}
        }

        if let Some(previous) = self.frame_size
            && previous != size
        {
            let resized = self.release_for_resize(previous, size);
            self.note(resized)?;
        }
        self.frame_size = Some(size);

        let slot_index = self.slot_index();
        let waited = self.slots[slot_index].wait();
        self.note(waited)?;
        self.slots[slot_index].recycle();

        let mut graph = RenderGraph::new();
        for (index, resource) in self.persistent.iter().enumerate() {
            if let Some(resource) = resource {
                let handle = AttachmentHandle::new(
                    index as u32,
                    HandleScope::Persistent(self.persistent_generation),
                );
                graph.registry_mut().add_persistent(
                    handle,
                    resource.name.clone(),
                    resource.kind.clone(),
                    resource.binding,
                    resource.state,
                );
            }
        }
        self.graph = Some(graph);
        self.state = FrameState::FrameBegun;

        log::trace!(
            "Began frame {} in slot {} ({}x{})",
            self.frame_index,
            slot_index,
            size.width,
            size.height
        );
        Ok(())
    }

    fn release_for_resize(&mut self, previous: Extent2d, size: Extent2d) -> Result<()> {
        log::info!(
            "Frame size changed from {}x{} to {}x{}, releasing transient memory",
            previous.width,
            previous.height,
            size.width,
            size.height
        );
        self.backend.wait_idle()?;
        for slot in &mut self.slots {
            slot.wait()?;
            slot.recycle();
            slot.allocator.release_blocks();
        }
        self.retired_semaphores.clear();
        Ok(())
    }

    /// The graph of the frame being built.
    pub fn graph(&self) -> Option<&RenderGraph> {
        self.graph.as_ref()
    }

    fn graph_mut(&mut self) -> Result<&mut RenderGraph> {
        match self.state {
            FrameState::Lost => Err(RhiError::DeviceLost),
            FrameState::Idle => Err(ValidationError::FrameNotBegun.into()),
            FrameState::FrameBegun => self
                .graph
                .as_mut()
                .ok_or_else(|| ValidationError::FrameNotBegun.into()),
        }
    }

    /// Add a pass to the current frame. See [`RenderGraph::add_pass`].
    pub fn add_pass<D, S, E>(
        &mut self,
        name: impl Into<String>,
        queue: QueueType,
        setup: S,
        execute: E,
    ) -> Result<PassHandle>
    where
        D: Send + 'static,
        S: FnOnce(&mut PassBuilder<'_>) -> Result<D>,
        E: FnOnce(D, &mut PassContext<'_>) -> Result<()> + Send + 'static,
    {
        self.graph_mut()?.add_pass(name, queue, setup, execute)
    }

    /// Declare a transient image for the current frame.
    pub fn create_transient_image(&mut self, desc: TextureDescriptor) -> Result<AttachmentHandle> {
        self.graph_mut()?.create_transient_image(desc)
    }

    /// Declare a transient buffer for the current frame.
    pub fn create_transient_buffer(&mut self, desc: BufferDescriptor) -> Result<AttachmentHandle> {
        self.graph_mut()?.create_transient_buffer(desc)
    }

    /// Import an external image for the current frame only.
    ///
    /// Its end-of-frame state is not tracked; use
    /// [`register_image`](Self::register_image) for that.
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        image: ImageHandle,
        desc: TextureDescriptor,
        state: ResourceState,
    ) -> Result<AttachmentHandle> {
        self.graph_mut()?
            .import_image(name, image, desc, state, false)
    }

    /// Import an external buffer for the current frame only.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: BufferHandle,
        desc: BufferDescriptor,
        state: ResourceState,
    ) -> Result<AttachmentHandle> {
        self.graph_mut()?.import_buffer(name, buffer, desc, state)
    }

    /// Acquire the next image of `swapchain` and import it as a presentable attachment.
    ///
    /// At most one swapchain image can be imported per frame. If acquisition
    /// reports [`RhiError::SurfaceOutOfDate`] the frame stays begun; abandon
    /// it and recreate the swapchain.
    pub fn import_swapchain(&mut self, swapchain: SwapchainHandle) -> Result<AttachmentHandle> {
        profile_function!();

        self.graph_mut()?;
        if self.acquired.is_some() {
            return Err(ValidationError::SwapchainAlreadyImported.into());
        }

        let slot_index = self.slot_index();
        let semaphore = self.slots[slot_index]
            .semaphores
            .acquire(&self.backend)?;
        let image_index = match self.backend.acquire_next_image(swapchain, semaphore) {
            Ok(index) => index,
            Err(err) => {
                if err == BackendError::SurfaceOutOfDate {
                    log::warn!("Swapchain out of date while acquiring the next image");
                }
                return self.note(Err(err.into()));
            }
        };

        let resolved = self.backend.swapchain_image(swapchain, image_index).and_then(|image| {
            let desc = self.backend.swapchain_descriptor(swapchain)?;
            Ok((image, desc))
        });
        let (image, desc) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                self.retire_semaphore(slot_index, semaphore);
                return self.note(Err(err.into()));
            }
        };

        let layout = self
            .swapchain_states
            .get(&image)
            .copied()
            .unwrap_or(TextureLayout::Undefined);
        let initial = ResourceState::new(
            layout,
            AccessFlags::empty(),
            PipelineStage::COLOR_ATTACHMENT_OUTPUT,
        );
        let attachment = self.graph_mut()?.import_image(
            format!("swapchain_image_{image_index}"),
            image,
            desc,
            initial,
            true,
        )?;

        self.acquired = Some(AcquiredImage {
            swapchain,
            image_index,
            image,
            semaphore,
            attachment,
        });
        log::trace!("Acquired swapchain image {}", image_index);
        Ok(attachment)
    }

    /// Compile, record, submit and present the current frame.
    ///
    /// Validation errors, transient memory exhaustion and failing passes
    /// discard the frame without submitting anything. A failed submission
    /// leaves the scheduler [`Lost`](FrameState::Lost).
    pub fn end_frame(&mut self) -> Result<FrameStats> {
        profile_function!();

        self.graph_mut()?;
        let mut graph = self
            .graph
            .take()
            .ok_or(ValidationError::FrameNotBegun)?;
        self.state = FrameState::Idle;
        let acquired = self.acquired.take();
        let slot_index = self.slot_index();

        let (compiled, placements, lists) =
            match self.prepare_frame(&mut graph, slot_index) {
                Ok(prepared) => prepared,
                Err(err) => {
                    log::warn!("Frame {} discarded: {}", self.frame_index, err);
                    self.slots[slot_index].release_frame_resources();
                    if let Some(acquired) = acquired {
                        self.retire_acquired(slot_index, acquired);
                    }
                    return self.note(Err(err));
                }
            };

        let handoffs = self.queue_handoffs(&graph);
        let present_semaphore = match self.submit(
            &graph,
            &compiled,
            &lists,
            &handoffs,
            slot_index,
            acquired.as_ref(),
        ) {
                Ok(semaphore) => semaphore,
                Err(err) => {
                    log::error!("Frame {} submission failed: {}", self.frame_index, err);
                    self.state = FrameState::Lost;
                    return Err(err);
                }
            };

        let mut presented = false;
        let mut outcome = Ok(());
        if let Some(acquired) = acquired {
            let present = graph
                .registry()
                .resolve(acquired.attachment)
                .ok()
                .and_then(|id| compiled.presents().iter().find(|p| p.attachment == id));
            if let (Some(present), Some(wait)) = (present, present_semaphore) {
                profile_scope!("present");
                match self.backend.present(
                    present.queue,
                    acquired.swapchain,
                    acquired.image_index,
                    &[wait],
                ) {
                    Ok(()) => presented = true,
                    Err(err) => {
                        if err == BackendError::SurfaceOutOfDate {
                            log::warn!("Swapchain out of date at present");
                        }
                        outcome = Err(RhiError::from(err));
                    }
                }
                self.swapchain_states
                    .insert(acquired.image, TextureLayout::PresentSrc);
            }
        }

        self.store_final_states(&graph, &compiled);

        let stats = FrameStats {
            frame_index: self.frame_index,
            pass_count: compiled.pass_count(),
            barrier_count: compiled.barrier_count(),
            submission_count: compiled.submissions().len(),
            semaphore_count: compiled.semaphore_edges().len() + handoffs.len(),
            placements,
            presented,
        };
        self.frame_index += 1;
        frame_mark!();
        profile_plot!("barriers", stats.barrier_count as f64);

        log::debug!(
            "Frame {}: {} passes, {} barriers, {} submissions, {} transients",
            stats.frame_index,
            stats.pass_count,
            stats.barrier_count,
            stats.submission_count,
            stats.placements.len()
        );

        self.note(outcome)?;
        Ok(stats)
    }

    /// Drop the current frame without submitting anything.
    ///
    /// A swapchain image acquired for the frame is never presented; its
    /// acquire semaphore is kept alive until the device is known to be idle.
    pub fn abandon_frame(&mut self) -> Result<()> {
        match self.state {
            FrameState::Lost => return Err(RhiError::DeviceLost),
            FrameState::Idle => return Err(ValidationError::FrameNotBegun.into()),
            FrameState::FrameBegun => {}
        }

        let slot_index = self.slot_index();
        self.graph = None;
        if let Some(acquired) = self.acquired.take() {
            self.retire_acquired(slot_index, acquired);
        }
        self.slots[slot_index].release_frame_resources();
        self.state = FrameState::Idle;

        log::debug!("Abandoned frame {}", self.frame_index);
        Ok(())
    }

    /// Block until the device and every frame slot are idle.
    pub fn wait_idle(&mut self) -> Result<()> {
        if self.state == FrameState::Lost {
            return Err(RhiError::DeviceLost);
        }
        let result = self.wait_all();
        self.note(result)
    }

    fn wait_all(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        for slot in &mut self.slots {
            slot.wait()?;
        }
        self.retired_semaphores.clear();
        Ok(())
    }

    // === end_frame stages ===

    fn prepare_frame(
        &mut self,
        graph: &mut RenderGraph,
        slot_index: usize,
    ) -> Result<(CompiledGraph, Vec<TransientPlacement>, Vec<CommandListHandle>)> {
        let compiled = graph.compile()?;
        let placements = self.allocate_transients(graph, &compiled, slot_index)?;
        let lists = self.record(graph, &compiled, slot_index)?;
        Ok((compiled, placements, lists))
    }

    /// Place every transient in memory, walking the passes in order.
    ///
    /// Before pass `i`, transients whose release point is `i` return their
    /// memory, then transients first used by `i` are allocated, so memory
    /// freed by finished resources is reused by the next ones.
    fn allocate_transients(
        &mut self,
        graph: &mut RenderGraph,
        compiled: &CompiledGraph,
        slot_index: usize,
    ) -> Result<Vec<TransientPlacement>> {
        profile_scope!("allocate_transients");

        let frame_size = self.frame_size.unwrap_or_default();
        let pass_count = compiled.pass_count();
        let backend = self.backend.as_ref();
        let slot = &mut self.slots[slot_index];

        let mut live: Vec<(AttachmentId, Allocation)> = Vec::new();
        let mut placements = Vec::new();
        let mut bindings = Vec::new();

        for step in 0..=pass_count {
            for lifetime in compiled.lifetimes() {
                if lifetime.release_before.map(PassHandle::index) != Some(step) {
                    continue;
                }
                if let Some(position) = live.iter().position(|(id, _)| *id == lifetime.attachment) {
                    let (_, allocation) = live.swap_remove(position);
                    slot.allocator.free(allocation);
                }
            }

            for lifetime in compiled.lifetimes() {
                // Unused transients get memory after the last pass.
                let starts_here = match lifetime.first_pass {
                    Some(first) => first.index() == step,
                    None => step == pass_count,
                };
                if !starts_here {
                    continue;
                }

                let attachment = graph.registry().attachment(lifetime.attachment);
                let (binding, allocation) =
                    create_transient(backend, slot, attachment.kind(), frame_size)?;
                live.push((lifetime.attachment, allocation));
                bindings.push((lifetime.attachment, binding));
                placements.push(TransientPlacement {
                    attachment: lifetime.attachment,
                    name: attachment.name().to_owned(),
                    allocation,
                    lifetime: *lifetime,
                });
            }
        }

        for (_, allocation) in live.drain(..) {
            slot.allocator.free(allocation);
        }
        for (id, binding) in bindings {
            graph.registry_mut().bind(id, binding);
        }

        log::trace!(
            "Placed {} transients in {} blocks",
            placements.len(),
            slot.allocator.block_count()
        );
        Ok(placements)
    }

    /// Record every pass into its own command list.
    fn record(
        &mut self,
        graph: &mut RenderGraph,
        compiled: &CompiledGraph,
        slot_index: usize,
    ) -> Result<Vec<CommandListHandle>> {
        profile_scope!("record_passes");

        let render_area = self.frame_size.unwrap_or_default();
        let executors: Vec<_> = (0..graph.pass_count())
            .map(|index| graph.take_executor(PassHandle::new(index as u32)))
            .collect();

        let registry = graph.registry();
        let backend = self.backend.as_ref();
        let slot = &mut self.slots[slot_index];
        let mut lists = Vec::with_capacity(executors.len());

        for ((index, pass), executor) in graph.passes().iter().enumerate().zip(executors) {
            let handle = PassHandle::new(index as u32);
            let list = backend.allocate_command_list(pass.queue())?;
            slot.track_command_list(list);
            lists.push(list);

            record_barriers(backend, list, registry, compiled.barriers_before(handle));

            let rendering = pass
                .has_render_targets(registry)
                .then(|| rendering_info(registry, pass, render_area));
            if let Some(info) = &rendering {
                backend.cmd_begin_rendering(list, info);
            }
            if let Some(executor) = executor {
                let mut ctx = PassContext::new(backend, registry, list, pass, render_area);
                executor.execute(&mut ctx)?;
            }
            if rendering.is_some() {
                backend.cmd_end_rendering(list);
            }

            record_barriers(backend, list, registry, compiled.barriers_after(handle));
        }

        Ok(lists)
    }

    /// Submit every batch in order. Returns the present-ready semaphore, if any.
    fn submit(
        &mut self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
        lists: &[CommandListHandle],
        handoffs: &[QueueHandoff],
        slot_index: usize,
        acquired: Option<&AcquiredImage>,
    ) -> Result<Option<SemaphoreHandle>> {
        profile_scope!("submit");

        let slot = &mut self.slots[slot_index];
        let edge_semaphores = compiled
            .semaphore_edges()
            .iter()
            .map(|_| slot.semaphores.acquire(&self.backend))
            .collect::<Result<Vec<_>>>()?;

        // Only the image acquired by the scheduler has semaphores to wait on.
        let swapchain_id =
            acquired.and_then(|acquired| graph.registry().resolve(acquired.attachment).ok());
        let present_semaphore = match swapchain_id {
            Some(_) => Some(slot.semaphores.acquire(&self.backend)?),
            None => None,
        };

        // An empty batch on the earlier queue signals once everything
        // submitted there before it has finished.
        let mut handoff_waits: Vec<(QueueType, SemaphoreHandle, PipelineStage)> = Vec::new();
        for src in QueueType::ALL {
            let targets: Vec<&QueueHandoff> = handoffs.iter().filter(|h| h.src == src).collect();
            if targets.is_empty() {
                continue;
            }
            let signals = targets
                .iter()
                .map(|_| slot.semaphores.acquire(&self.backend))
                .collect::<Result<Vec<_>>>()?;
            log::trace!("Queue hand-off from {} ({} waiters)", src, signals.len());
            self.backend
                .submit(&SubmitInfo {
                    queue: src,
                    command_lists: &[],
                    wait_semaphores: &[],
                    signal_semaphores: &signals,
                    fence: None,
                })
                .map_err(submit_error)?;
            handoff_waits.extend(
                targets
                    .iter()
                    .zip(signals)
                    .map(|(handoff, semaphore)| (handoff.dst, semaphore, handoff.stages)),
            );
        }

        for submission in compiled.submissions() {
            let command_lists: Vec<CommandListHandle> = submission
                .passes
                .iter()
                .map(|pass| lists[pass.index()])
                .collect();
            let mut waits: Vec<(SemaphoreHandle, PipelineStage)> = submission
                .waits
                .iter()
                .filter_map(|wait| {
                    let semaphore = match wait.semaphore {
                        SemaphoreSlot::Edge(edge) => Some(edge_semaphores[edge]),
                        SemaphoreSlot::SwapchainAcquired(id) if Some(id) == swapchain_id => {
                            acquired.map(|acquired| acquired.semaphore)
                        }
                        _ => None,
                    }?;
                    Some((semaphore, wait.stages))
                })
                .collect();
            // The first submission of each queue takes its hand-off waits.
            handoff_waits.retain(|&(queue, semaphore, stages)| {
                let take = queue == submission.queue;
                if take {
                    waits.push((semaphore, stages));
                }
                !take
            });
            let signals: Vec<SemaphoreHandle> = submission
                .signals
                .iter()
                .filter_map(|signal| match *signal {
                    SemaphoreSlot::Edge(edge) => Some(edge_semaphores[edge]),
                    SemaphoreSlot::PresentReady(id) if Some(id) == swapchain_id => {
                        present_semaphore
                    }
                    _ => None,
                })
                .collect();
            let fence = submission
                .signal_fence
                .then(|| slot.fence(submission.queue));

            self.backend
                .submit(&SubmitInfo {
                    queue: submission.queue,
                    command_lists: &command_lists,
                    wait_semaphores: &waits,
                    signal_semaphores: &signals,
                    fence,
                })
                .map_err(submit_error)?;
            if fence.is_some() {
                slot.mark_fence_submitted(submission.queue);
            }
        }

        Ok(present_semaphore)
    }

    /// Queue hand-offs of persistent resources from frames still in flight.
    ///
    /// A resource used on one queue by an earlier frame and on another queue
    /// now is only safe once the earlier queue's work has finished. Frames
    /// whose slot was already waited on need nothing.
    fn queue_handoffs(&self, graph: &RenderGraph) -> Vec<QueueHandoff> {
        let frames = self.slots.len() as u64;
        let registry = graph.registry();
        let mut handoffs: Vec<QueueHandoff> = Vec::new();

        for (index, resource) in self.persistent.iter().enumerate() {
            let Some(resource) = resource else { continue };
            let handle = AttachmentHandle::new(
                index as u32,
                HandleScope::Persistent(self.persistent_generation),
            );
            let Ok(id) = registry.resolve(handle) else {
                continue;
            };
            for (_, attachment_use) in registry.timeline(id) {
                let dst = attachment_use.queue;
                for src in QueueType::ALL {
                    if src == dst {
                        continue;
                    }
                    let Some(frame) = resource.queue_frames[src.index()] else {
                        continue;
                    };
                    let slot = (frame % frames) as usize;
                    if self.frame_index.saturating_sub(frame) >= frames
                        || !self.slots[slot].is_queue_pending(src)
                    {
                        continue;
                    }
                    match handoffs.iter_mut().find(|h| h.src == src && h.dst == dst) {
                        Some(handoff) => handoff.stages |= attachment_use.stages,
                        None => handoffs.push(QueueHandoff {
                            src,
                            dst,
                            stages: attachment_use.stages,
                        }),
                    }
                }
            }
        }
        handoffs
    }

    fn store_final_states(&mut self, graph: &RenderGraph, compiled: &CompiledGraph) {
        let registry = graph.registry();
        for final_state in compiled.final_states() {
            let handle = registry.attachment(final_state.attachment).handle();
            if !handle.is_persistent() {
                continue;
            }
            if let Some(index) = self.persistent_index(handle)
                && let Some(resource) = self.persistent[index].as_mut()
            {
                resource.state = final_state.state;
                for (_, attachment_use) in registry.timeline(final_state.attachment) {
                    resource.queue_frames[attachment_use.queue.index()] = Some(self.frame_index);
                }
            }
        }
    }

    // === Helpers ===

    fn slot_index(&self) -> usize {
        (self.frame_index % self.slots.len() as u64) as usize
    }

    fn retire_acquired(&mut self, slot_index: usize, acquired: AcquiredImage) {
        log::warn!(
            "Swapchain image {} was acquired but will not be presented",
            acquired.image_index
        );
        self.retire_semaphore(slot_index, acquired.semaphore);
    }

    fn retire_semaphore(&mut self, slot_index: usize, semaphore: SemaphoreHandle) {
        if let Some(semaphore) = self.slots[slot_index].semaphores.retire(semaphore) {
            self.retired_semaphores.push(semaphore);
        }
    }

    /// Enter [`FrameState::Lost`] if `result` carries a fatal error.
    fn note<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_fatal_to_scheduler()
        {
            log::error!("Frame scheduler lost: {}", err);
            self.state = FrameState::Lost;
            self.graph = None;
        }
        result
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        let slot_index = self.slot_index();
        if let Some(acquired) = self.acquired.take() {
            self.retire_acquired(slot_index, acquired);
        }
        if self.state == FrameState::Lost {
            log::warn!("Dropping a lost frame scheduler without waiting for the device");
        } else if let Err(err) = self.wait_all() {
            log::warn!("Failed to wait for the device during shutdown: {}", err);
        }
        log::debug!("Frame scheduler dropped after {} frames", self.frame_index);
    }
}

fn submit_error(err: BackendError) -> RhiError {
    match err {
        BackendError::DeviceLost => RhiError::DeviceLost,
        other => RhiError::SubmissionFailed(other.to_string()),
    }
}

fn create_transient(
    backend: &dyn Backend,
    slot: &mut FrameSlot,
    kind: &AttachmentKind,
    frame_size: Extent2d,
) -> Result<(ResourceBinding, Allocation)> {
    match kind {
        AttachmentKind::Image(desc) => {
            let image = backend.create_image(desc, desc.size.resolve(frame_size))?;
            slot.track_image(image);
            let allocation = slot.allocator.allocate_image(image)?;
            Ok((ResourceBinding::Image(image), allocation))
        }
        AttachmentKind::Buffer(desc) => {
            let buffer = backend.create_buffer(desc)?;
            slot.track_buffer(buffer);
            let allocation = slot.allocator.allocate_buffer(buffer)?;
            Ok((ResourceBinding::Buffer(buffer), allocation))
        }
    }
}

fn barrier_resource(registry: &AttachmentRegistry, attachment: AttachmentId) -> Option<BarrierResource> {
    registry
        .attachment(attachment)
        .binding()
        .map(|binding| match binding {
            ResourceBinding::Image(image) => BarrierResource::Image(image),
            ResourceBinding::Buffer(buffer) => BarrierResource::Buffer(buffer),
        })
}

fn record_barriers(
    backend: &dyn Backend,
    list: CommandListHandle,
    registry: &AttachmentRegistry,
    barriers: &[Barrier],
) {
    if barriers.is_empty() {
        return;
    }
    let commands: Vec<BarrierCommand> = barriers
        .iter()
        .filter_map(|barrier| {
            Some(BarrierCommand {
                resource: barrier_resource(registry, barrier.attachment)?,
                range: barrier.range,
                src: barrier.src,
                dst: barrier.dst,
                queue_transfer: barrier.queue_transfer,
            })
        })
        .collect();
    backend.cmd_pipeline_barrier(list, &commands);
}

fn rendering_info(registry: &AttachmentRegistry, pass: &Pass, render_area: Extent2d) -> RenderingInfo {
    let mut info = RenderingInfo {
        render_area,
        color_attachments: Vec::new(),
        depth_attachment: None,
    };

    for &index in pass.uses() {
        let attachment_use = registry.use_at(index);
        let Some(ResourceBinding::Image(image)) =
            registry.attachment(attachment_use.attachment).binding()
        else {
            continue;
        };
        let SubresourceRange::Image(range) = attachment_use.range else {
            continue;
        };
        let target = RenderingAttachment {
            image,
            range,
            layout: attachment_use.state().layout,
            load_op: attachment_use.load_op,
            store_op: attachment_use.store_op,
        };
        match attachment_use.usage {
            AttachmentUsage::RenderTarget => info.color_attachments.push(target),
            AttachmentUsage::DepthStencil => info.depth_attachment = Some(target),
            _ => {}
        }
    }
    info
}

static_assertions::assert_impl_all!(FrameScheduler: Send);
