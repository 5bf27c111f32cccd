//! Passes, pass setup and pass execution.
//!
//! A pass is added in two phases:
//!
//! 1. **Setup** runs immediately inside [`RenderGraph::add_pass`](super::RenderGraph::add_pass).
//!    It receives a [`PassBuilder`], declares every attachment use and returns
//!    a plain data struct with whatever the pass needs later.
//! 2. **Execute** runs when the scheduler records the frame. It receives the
//!    data struct by value together with a [`PassContext`] for recording.
//!
//! Setup data is owned by the graph between the two phases, so the execute
//! closure never borrows pass-local state.

use crate::backend::{Backend, BufferHandle, CommandListHandle, ImageHandle};
use crate::error::{Result, ValidationError};
use crate::types::{
    BufferRange, Extent2d, ImageSubresourceRange, PassKind, QueueType, SubresourceRange,
};

use super::registry::{AttachmentKind, AttachmentRegistry, PassAttachmentUse, ResourceBinding};
use super::resource::{AttachmentHandle, AttachmentId, UseIndex};
use super::resource_usage::{Access, AttachmentUsage, LoadOp, StoreOp, UseDesc};
use super::PassHandle;

/// A node of the render graph.
#[derive(Debug, Clone)]
pub struct Pass {
    name: String,
    queue: QueueType,
    kind: PassKind,
    uses: Vec<UseIndex>,
}

impl Pass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue the pass is submitted to.
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Attachment uses in declaration order.
    pub fn uses(&self) -> &[UseIndex] {
        &self.uses
    }

    /// Returns true if begin/end rendering must wrap this pass.
    pub fn has_render_targets(&self, registry: &AttachmentRegistry) -> bool {
        self.kind == PassKind::Graphics
            && self.uses.iter().any(|&index| {
                matches!(
                    registry.use_at(index).usage,
                    AttachmentUsage::RenderTarget | AttachmentUsage::DepthStencil
                )
            })
    }

    pub(crate) fn push_use(&mut self, index: UseIndex) {
        self.uses.push(index);
    }
}

/// Type-erased execute callback together with its setup data.
pub trait PassExecutor: Send {
    fn execute(self: Box<Self>, ctx: &mut PassContext<'_>) -> Result<()>;
}

pub(crate) struct TypedExecutor<D, E> {
    pub(crate) data: D,
    pub(crate) execute: E,
}

impl<D, E> PassExecutor for TypedExecutor<D, E>
where
    D: Send,
    E: FnOnce(D, &mut PassContext<'_>) -> Result<()> + Send,
{
    fn execute(self: Box<Self>, ctx: &mut PassContext<'_>) -> Result<()> {
        let this = *self;
        (this.execute)(this.data, ctx)
    }
}

/// Declares the attachment uses of one pass.
///
/// Uses are validated as they are declared and committed to the graph only
/// after setup returns successfully, so a failed setup leaves the graph
/// untouched.
///
/// # Example
///
/// ```ignore
/// graph.add_pass("blur", QueueType::Compute, |builder| {
///     builder.read_texture(hdr)?;
///     builder.write_storage(blurred)?;
///     Ok(BlurData { hdr, blurred })
/// }, |data, ctx| {
///     let list = ctx.command_list();
///     ctx.backend().cmd_dispatch(list, 120, 68, 1);
///     Ok(())
/// })?;
/// ```
pub struct PassBuilder<'a> {
    registry: &'a AttachmentRegistry,
    name: &'a str,
    queue: QueueType,
    kind: PassKind,
    pending: Vec<(AttachmentId, UseDesc)>,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(registry: &'a AttachmentRegistry, name: &'a str, queue: QueueType) -> Self {
        Self {
            registry,
            name,
            queue,
            kind: PassKind::for_queue(queue),
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Override the pass kind. Defaults to the natural kind of the queue.
    pub fn set_kind(&mut self, kind: PassKind) -> &mut Self {
        self.kind = kind;
        self
    }

    /// Descriptor of an attachment, for sizing dispatches and copies.
    pub fn attachment_kind(&self, handle: AttachmentHandle) -> Result<&AttachmentKind> {
        let id = self.registry.resolve(handle)?;
        Ok(self.registry.attachment(id).kind())
    }

    /// Declare a use with full control over stages and range.
    pub fn declare(&mut self, handle: AttachmentHandle, desc: UseDesc) -> Result<&mut Self> {
        let id = self.registry.resolve(handle)?;
        let attachment = self.registry.attachment(id);

        if !desc.usage.is_valid_for(attachment.kind()) || !desc.usage.allows(desc.access) {
            return Err(ValidationError::IncompatibleUsage {
                attachment: attachment.name().to_owned(),
                usage: desc.usage,
            }
            .into());
        }

        if let Some(range) = desc.range {
            if range.is_empty() {
                return Err(ValidationError::EmptyRange {
                    attachment: attachment.name().to_owned(),
                }
                .into());
            }
            if !attachment.kind().whole_range().contains(&range) {
                return Err(ValidationError::RangeOutOfBounds {
                    attachment: attachment.name().to_owned(),
                }
                .into());
            }
        }

        self.pending.push((id, desc));
        Ok(self)
    }

    /// Color render target.
    pub fn write_color(
        &mut self,
        handle: AttachmentHandle,
        load_op: LoadOp,
        store_op: StoreOp,
    ) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::attachment(AttachmentUsage::RenderTarget, load_op, store_op),
        )
    }

    /// Writable depth/stencil attachment.
    pub fn write_depth(
        &mut self,
        handle: AttachmentHandle,
        load_op: LoadOp,
        store_op: StoreOp,
    ) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::attachment(AttachmentUsage::DepthStencil, load_op, store_op),
        )
    }

    /// Read-only depth/stencil attachment.
    pub fn read_depth(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::new(AttachmentUsage::DepthStencil, Access::Read),
        )
    }

    /// Sampled texture or uniform buffer.
    pub fn read_texture(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::new(AttachmentUsage::ShaderResource, Access::Read),
        )
    }

    pub fn read_storage(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(handle, UseDesc::new(AttachmentUsage::Storage, Access::Read))
    }

    pub fn write_storage(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(handle, UseDesc::new(AttachmentUsage::Storage, Access::Write))
    }

    pub fn read_write_storage(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::new(AttachmentUsage::Storage, Access::ReadWrite),
        )
    }

    pub fn copy_src(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(handle, UseDesc::new(AttachmentUsage::CopySrc, Access::Read))
    }

    pub fn copy_dst(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(handle, UseDesc::new(AttachmentUsage::CopyDst, Access::Write))
    }

    /// Indirect draw or dispatch arguments.
    pub fn read_indirect(&mut self, handle: AttachmentHandle) -> Result<&mut Self> {
        self.declare(
            handle,
            UseDesc::new(AttachmentUsage::IndirectArgs, Access::Read),
        )
    }

    /// Validate the pass as a whole and turn pending declarations into uses.
    pub(crate) fn finish(self, pass: PassHandle) -> Result<(Pass, Vec<PassAttachmentUse>)> {
        if !self.kind.supported_on(self.queue) {
            return Err(ValidationError::QueueMismatch {
                pass: self.name.to_owned(),
                kind: self.kind,
                queue: self.queue,
            }
            .into());
        }

        let mut uses = Vec::with_capacity(self.pending.len());
        for (id, desc) in self.pending {
            let attachment = self.registry.attachment(id);
            if !usage_supported_in(desc.usage, self.kind) {
                return Err(ValidationError::IncompatibleUsage {
                    attachment: attachment.name().to_owned(),
                    usage: desc.usage,
                }
                .into());
            }
            let range = desc
                .range
                .unwrap_or_else(|| attachment.kind().whole_range());
            uses.push(PassAttachmentUse::new(
                id,
                pass,
                self.queue,
                desc.usage,
                desc.access,
                desc.stages
                    .unwrap_or_else(|| desc.usage.default_stages(self.kind)),
                range,
                desc.load_op,
                desc.store_op,
            ));
        }

        let pass = Pass {
            name: self.name.to_owned(),
            queue: self.queue,
            kind: self.kind,
            uses: Vec::new(),
        };
        Ok((pass, uses))
    }
}

fn usage_supported_in(usage: AttachmentUsage, kind: PassKind) -> bool {
    match usage {
        AttachmentUsage::RenderTarget | AttachmentUsage::DepthStencil => kind == PassKind::Graphics,
        AttachmentUsage::ShaderResource | AttachmentUsage::Storage => kind != PassKind::Transfer,
        AttachmentUsage::IndirectArgs => kind != PassKind::Transfer,
        AttachmentUsage::CopySrc | AttachmentUsage::CopyDst => true,
    }
}

/// Recording context handed to a pass executor.
pub struct PassContext<'a> {
    backend: &'a dyn Backend,
    registry: &'a AttachmentRegistry,
    command_list: CommandListHandle,
    name: &'a str,
    queue: QueueType,
    render_area: Extent2d,
}

impl<'a> PassContext<'a> {
    pub(crate) fn new(
        backend: &'a dyn Backend,
        registry: &'a AttachmentRegistry,
        command_list: CommandListHandle,
        pass: &'a Pass,
        render_area: Extent2d,
    ) -> Self {
        Self {
            backend,
            registry,
            command_list,
            name: pass.name(),
            queue: pass.queue(),
            render_area,
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend
    }

    /// Command list the pass records into.
    pub fn command_list(&self) -> CommandListHandle {
        self.command_list
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Frame size of the current frame.
    pub fn render_area(&self) -> Extent2d {
        self.render_area
    }

    /// Backend image bound to an attachment.
    pub fn image(&self, handle: AttachmentHandle) -> Result<ImageHandle> {
        match self.binding(handle)? {
            ResourceBinding::Image(image) => Ok(image),
            ResourceBinding::Buffer(_) => Err(ValidationError::UnknownAttachment(handle).into()),
        }
    }

    /// Backend buffer bound to an attachment.
    pub fn buffer(&self, handle: AttachmentHandle) -> Result<BufferHandle> {
        match self.binding(handle)? {
            ResourceBinding::Buffer(buffer) => Ok(buffer),
            ResourceBinding::Image(_) => Err(ValidationError::UnknownAttachment(handle).into()),
        }
    }

    fn binding(&self, handle: AttachmentHandle) -> Result<ResourceBinding> {
        let id = self.registry.resolve(handle)?;
        self.registry
            .attachment(id)
            .binding()
            .ok_or_else(|| ValidationError::UnknownAttachment(handle).into())
    }
}

/// Byte range `offset..offset + size` of a buffer, for [`UseDesc::with_range`].
pub fn buffer_range(offset: u64, size: u64) -> SubresourceRange {
    SubresourceRange::Buffer(BufferRange::new(offset, size))
}

/// Range of selected mips and layers of an image, for [`UseDesc::with_range`].
pub fn image_range(
    base_mip_level: u32,
    mip_level_count: u32,
    base_array_layer: u32,
    array_layer_count: u32,
) -> SubresourceRange {
    SubresourceRange::Image(ImageSubresourceRange::new(
        base_mip_level,
        mip_level_count,
        base_array_layer,
        array_layer_count,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Lifetime;
    use crate::types::{
        BufferDescriptor, BufferUsage, ResourceState, TextureDescriptor, TextureFormat,
        TextureUsage,
    };

    fn registry_with_image() -> (AttachmentRegistry, AttachmentHandle) {
        let mut registry = AttachmentRegistry::new();
        let handle = registry.add(
            "color",
            AttachmentKind::Image(
                TextureDescriptor::new_2d(
                    64,
                    64,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                )
                .with_mip_levels(4),
            ),
            Lifetime::Transient,
            None,
            ResourceState::UNDEFINED,
            false,
        );
        (registry, handle)
    }

    #[test]
    fn test_builder_records_defaults() {
        let (registry, color) = registry_with_image();
        let mut builder = PassBuilder::new(&registry, "main", QueueType::Graphics);
        builder
            .write_color(color, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0), StoreOp::Store)
            .unwrap();
        let (pass, uses) = builder.finish(PassHandle::new(0)).unwrap();

        assert_eq!(pass.kind(), PassKind::Graphics);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].access, Access::Write);
        assert_eq!(
            uses[0].range,
            SubresourceRange::Image(ImageSubresourceRange::whole(4, 1))
        );
    }

    #[test]
    fn test_render_target_rejected_on_compute() {
        let (registry, color) = registry_with_image();
        let mut builder = PassBuilder::new(&registry, "cs", QueueType::Compute);
        builder
            .write_color(color, LoadOp::DontCare, StoreOp::Store)
            .unwrap();
        let err = builder.finish(PassHandle::new(0)).unwrap_err();
        assert!(matches!(
            err,
            crate::RhiError::Validation(ValidationError::IncompatibleUsage { .. })
        ));
    }

    #[test]
    fn test_graphics_kind_rejected_on_transfer_queue() {
        let (registry, _) = registry_with_image();
        let mut builder = PassBuilder::new(&registry, "upload", QueueType::Transfer);
        builder.set_kind(PassKind::Graphics);
        let err = builder.finish(PassHandle::new(0)).unwrap_err();
        assert!(matches!(
            err,
            crate::RhiError::Validation(ValidationError::QueueMismatch { .. })
        ));
    }

    #[test]
    fn test_range_validation() {
        let (registry, color) = registry_with_image();
        let mut builder = PassBuilder::new(&registry, "main", QueueType::Graphics);

        let out_of_bounds = UseDesc::new(AttachmentUsage::ShaderResource, Access::Read)
            .with_range(image_range(3, 2, 0, 1));
        assert!(builder.declare(color, out_of_bounds).is_err());

        let empty = UseDesc::new(AttachmentUsage::ShaderResource, Access::Read)
            .with_range(image_range(0, 0, 0, 1));
        assert!(builder.declare(color, empty).is_err());

        let mip = UseDesc::new(AttachmentUsage::ShaderResource, Access::Read)
            .with_range(image_range(3, 1, 0, 1));
        assert!(builder.declare(color, mip).is_ok());
    }

    #[test]
    fn test_usage_flags_are_checked() {
        let mut registry = AttachmentRegistry::new();
        let buffer = registry.add(
            "args",
            AttachmentKind::Buffer(BufferDescriptor::new(64, BufferUsage::STORAGE)),
            Lifetime::Transient,
            None,
            ResourceState::UNDEFINED,
            false,
        );
        let mut builder = PassBuilder::new(&registry, "cull", QueueType::Compute);
        assert!(builder.write_storage(buffer).is_ok());
        assert!(builder.read_indirect(buffer).is_err());
        assert!(builder.copy_dst(buffer).is_err());
    }
}
