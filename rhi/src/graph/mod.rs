//! Render graph infrastructure.
//!
//! The render graph is a declarative description of one frame: a list of
//! passes, each declaring how it uses a set of attachments. Dependencies are
//! never stated explicitly; they follow from shared attachments in
//! declaration order. The graph compiler turns the description into:
//!
//! - Barriers between consecutive uses of every attachment
//! - Queue ownership transfers and semaphores between queues
//! - Per-queue submission batches
//! - Transient resource lifetimes for memory aliasing
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Schedule | [`FrameScheduler`](crate::scheduler::FrameScheduler) | Frames in flight, submission, present |
//! | Compile | [`CompiledGraph`](crate::compiler::CompiledGraph) | Barriers, semaphores, lifetimes |
//! | **Graph** | [`RenderGraph`] | Attachments and passes (this module) |
//! | Pass | [`Pass`], [`PassBuilder`] | Single unit of GPU work |
//!
//! # Example
//!
//! ```ignore
//! use redlilium_rhi::{LoadOp, QueueType, RenderGraph, StoreOp, TextureDescriptor};
//!
//! let mut graph = RenderGraph::new();
//! let hdr = graph.create_transient_image(TextureDescriptor::frame_relative(
//!     1.0,
//!     TextureFormat::Rgba16Float,
//!     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
//! ))?;
//!
//! graph.add_pass("geometry", QueueType::Graphics, |builder| {
//!     builder.write_color(hdr, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0), StoreOp::Store)?;
//!     Ok(())
//! }, |(), ctx| {
//!     ctx.backend().cmd_draw(ctx.command_list(), 3, 1);
//!     Ok(())
//! })?;
//!
//! let compiled = graph.compile()?;
//! ```

mod pass;
mod registry;
mod resource;
mod resource_usage;

use std::fmt;

pub use pass::{Pass, PassBuilder, PassContext, PassExecutor, buffer_range, image_range};
pub use registry::{
    Attachment, AttachmentKind, AttachmentRegistry, Lifetime, PassAttachmentUse,
    ResourceBinding, Timeline,
};
pub use resource::{AttachmentHandle, AttachmentId, HandleScope, UseIndex};
pub use resource_usage::{Access, AttachmentUsage, LoadOp, StoreOp, UseDesc};

pub(crate) use pass::TypedExecutor;
pub(crate) use resource::next_generation;

use crate::backend::{BufferHandle, ImageHandle};
use crate::compiler::{self, CompiledGraph};
use crate::error::{Result, ValidationError};
use crate::types::{BufferDescriptor, QueueType, ResourceState, TextureDescriptor};

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The render graph describes one frame's GPU work.
///
/// # Construction
///
/// Create attachments, then add passes in the order they must execute on
/// their queue:
///
/// ```ignore
/// let mut graph = RenderGraph::new();
/// let shadow = graph.create_transient_image(shadow_desc)?;
/// graph.add_pass("shadow", QueueType::Graphics, |b| { b.write_depth(shadow, LoadOp::clear_depth(1.0), StoreOp::Store)?; Ok(()) }, draw_shadows)?;
/// graph.add_pass("lighting", QueueType::Graphics, |b| { b.read_texture(shadow)?; Ok(()) }, draw_lighting)?;
/// ```
///
/// # Execution
///
/// The graph is compiled once; afterwards it no longer accepts passes or
/// attachments:
///
/// ```ignore
/// let compiled = graph.compile()?;
/// ```
#[derive(Default)]
pub struct RenderGraph {
    registry: AttachmentRegistry,
    passes: Vec<Pass>,
    executors: Vec<Option<Box<dyn PassExecutor>>>,
    compiled: bool,
}

impl RenderGraph {
    /// Create a new empty render graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an image whose memory is owned and aliased by the graph.
    pub fn create_transient_image(&mut self, desc: TextureDescriptor) -> Result<AttachmentHandle> {
        self.ensure_open()?;
        let name = self.attachment_name(desc.label.as_deref(), "image");
        Ok(self.registry.add(
            name,
            AttachmentKind::Image(desc),
            Lifetime::Transient,
            None,
            ResourceState::UNDEFINED,
            false,
        ))
    }

    /// Create a buffer whose memory is owned and aliased by the graph.
    pub fn create_transient_buffer(&mut self, desc: BufferDescriptor) -> Result<AttachmentHandle> {
        self.ensure_open()?;
        let name = self.attachment_name(desc.label.as_deref(), "buffer");
        Ok(self.registry.add(
            name,
            AttachmentKind::Buffer(desc),
            Lifetime::Transient,
            None,
            ResourceState::UNDEFINED,
            false,
        ))
    }

    /// Wrap an externally owned image for this graph.
    ///
    /// `state` is the state the image is in when the frame starts.
    /// Presentable images end the frame in the present layout.
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        image: ImageHandle,
        desc: TextureDescriptor,
        state: ResourceState,
        presentable: bool,
    ) -> Result<AttachmentHandle> {
        self.ensure_open()?;
        Ok(self.registry.add(
            name,
            AttachmentKind::Image(desc),
            Lifetime::Persistent,
            Some(ResourceBinding::Image(image)),
            state,
            presentable,
        ))
    }

    /// Wrap an externally owned buffer for this graph.
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        buffer: BufferHandle,
        desc: BufferDescriptor,
        state: ResourceState,
    ) -> Result<AttachmentHandle> {
        self.ensure_open()?;
        Ok(self.registry.add(
            name,
            AttachmentKind::Buffer(desc),
            Lifetime::Persistent,
            Some(ResourceBinding::Buffer(buffer)),
            state,
            false,
        ))
    }

    /// Add a pass.
    ///
    /// `setup` runs immediately and declares the pass's attachment uses; the
    /// data it returns is handed to `execute` when the frame is recorded.
    /// If `setup` fails, the graph is left unchanged.
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
        self.ensure_open()?;
        let name = name.into();
        let handle = PassHandle::new(self.passes.len() as u32);

        let mut builder = PassBuilder::new(&self.registry, &name, queue);
        let data = setup(&mut builder)?;
        let (mut pass, uses) = builder.finish(handle)?;

        for attachment_use in uses {
            let index = self.registry.push_use(attachment_use);
            pass.push_use(index);
        }
        log::trace!(
            "Added pass '{}' on {} queue with {} uses",
            pass.name(),
            queue,
            pass.uses().len()
        );

        self.passes.push(pass);
        self.executors
            .push(Some(Box::new(TypedExecutor { data, execute })));
        Ok(handle)
    }

    /// Compile the graph.
    ///
    /// Afterwards the graph rejects new passes and attachments.
    pub fn compile(&mut self) -> Result<CompiledGraph> {
        let compiled = compiler::compile(self)?;
        self.compiled = true;
        Ok(compiled)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    /// Get all passes in the graph.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass(&self, handle: PassHandle) -> &Pass {
        &self.passes[handle.index()]
    }

    /// Get the number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub(crate) fn registry_mut(&mut self) -> &mut AttachmentRegistry {
        &mut self.registry
    }

    /// Take a pass's executor for recording; each executor runs at most once.
    pub(crate) fn take_executor(&mut self, handle: PassHandle) -> Option<Box<dyn PassExecutor>> {
        self.executors.get_mut(handle.index())?.take()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.compiled {
            Err(ValidationError::GraphCompiled.into())
        } else {
            Ok(())
        }
    }

    fn attachment_name(&self, label: Option<&str>, kind: &str) -> String {
        match label {
            Some(label) => label.to_owned(),
            None => format!("transient_{kind}_{}", self.registry.len()),
        }
    }
}

impl fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraph")
            .field("attachments", &self.registry.len())
            .field("passes", &self.passes)
            .field("compiled", &self.compiled)
            .finish()
    }
}
