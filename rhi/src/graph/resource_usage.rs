//! Attachment usage declarations.
//!
//! Every time a pass touches an attachment it declares *how*: the usage
//! (render target, sampled, storage, copy, ...), whether it reads and/or
//! writes, and optionally the pipeline stages and sub-resource range. From
//! that declaration the graph derives the [`ResourceState`] the attachment
//! must be in while the pass runs.

use crate::types::{
    AccessFlags, BufferUsage, ClearValue, PassKind, PipelineStage, ResourceState,
    SubresourceRange, TextureLayout, TextureUsage,
};

use super::AttachmentKind;

/// How an attachment is used within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentUsage {
    /// Color attachment of a graphics pass.
    RenderTarget,
    /// Depth/stencil attachment of a graphics pass.
    DepthStencil,
    /// Sampled texture, or uniform/storage buffer read in a shader.
    ShaderResource,
    /// Storage image or storage buffer.
    Storage,
    /// Source of a copy.
    CopySrc,
    /// Destination of a copy.
    CopyDst,
    /// Indirect draw/dispatch arguments.
    IndirectArgs,
}

impl AttachmentUsage {
    /// Returns true if the resource's kind and usage flags allow this usage.
    pub fn is_valid_for(self, kind: &AttachmentKind) -> bool {
        match kind {
            AttachmentKind::Image(desc) => {
                let usage = desc.usage;
                match self {
                    Self::RenderTarget => {
                        usage.contains(TextureUsage::RENDER_ATTACHMENT)
                            && !desc.format.is_depth_stencil()
                    }
                    Self::DepthStencil => {
                        usage.contains(TextureUsage::RENDER_ATTACHMENT)
                            && desc.format.is_depth_stencil()
                    }
                    Self::ShaderResource => usage.contains(TextureUsage::TEXTURE_BINDING),
                    Self::Storage => usage.contains(TextureUsage::STORAGE_BINDING),
                    Self::CopySrc => usage.contains(TextureUsage::COPY_SRC),
                    Self::CopyDst => usage.contains(TextureUsage::COPY_DST),
                    Self::IndirectArgs => false,
                }
            }
            AttachmentKind::Buffer(desc) => {
                let usage = desc.usage;
                match self {
                    Self::RenderTarget | Self::DepthStencil => false,
                    Self::ShaderResource => {
                        usage.intersects(BufferUsage::UNIFORM | BufferUsage::STORAGE)
                    }
                    Self::Storage => usage.contains(BufferUsage::STORAGE),
                    Self::CopySrc => usage.contains(BufferUsage::COPY_SRC),
                    Self::CopyDst => usage.contains(BufferUsage::COPY_DST),
                    Self::IndirectArgs => usage.contains(BufferUsage::INDIRECT),
                }
            }
        }
    }

    /// Returns true if `access` makes sense for this usage.
    pub fn allows(self, access: Access) -> bool {
        match self {
            Self::ShaderResource | Self::CopySrc | Self::IndirectArgs => access == Access::Read,
            Self::CopyDst => access == Access::Write,
            Self::RenderTarget | Self::DepthStencil | Self::Storage => true,
        }
    }

    /// Stages that perform this usage when not declared explicitly.
    pub fn default_stages(self, kind: PassKind) -> PipelineStage {
        match self {
            Self::RenderTarget => PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencil => {
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS
            }
            Self::ShaderResource | Self::Storage => match kind {
                PassKind::Graphics => {
                    PipelineStage::VERTEX_SHADER | PipelineStage::FRAGMENT_SHADER
                }
                PassKind::Compute => PipelineStage::COMPUTE_SHADER,
                PassKind::Transfer => PipelineStage::TRANSFER,
            },
            Self::CopySrc | Self::CopyDst => PipelineStage::TRANSFER,
            Self::IndirectArgs => PipelineStage::DRAW_INDIRECT,
        }
    }

    /// Image layout required by this usage.
    pub fn layout(self, access: Access) -> TextureLayout {
        match self {
            Self::RenderTarget => TextureLayout::ColorAttachment,
            Self::DepthStencil if access.writes() => TextureLayout::DepthStencilAttachment,
            Self::DepthStencil => TextureLayout::DepthStencilReadOnly,
            Self::ShaderResource => TextureLayout::ShaderReadOnly,
            Self::Storage => TextureLayout::General,
            Self::CopySrc => TextureLayout::TransferSrc,
            Self::CopyDst => TextureLayout::TransferDst,
            Self::IndirectArgs => TextureLayout::Undefined,
        }
    }

    /// Memory access mask of this usage.
    pub fn access_flags(self, access: Access) -> AccessFlags {
        let (read, write) = match self {
            Self::RenderTarget => (
                AccessFlags::COLOR_ATTACHMENT_READ,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            Self::DepthStencil => (
                AccessFlags::DEPTH_STENCIL_READ,
                AccessFlags::DEPTH_STENCIL_WRITE,
            ),
            Self::ShaderResource | Self::Storage => {
                (AccessFlags::SHADER_READ, AccessFlags::SHADER_WRITE)
            }
            Self::CopySrc | Self::CopyDst => {
                (AccessFlags::TRANSFER_READ, AccessFlags::TRANSFER_WRITE)
            }
            Self::IndirectArgs => (AccessFlags::INDIRECT_COMMAND_READ, AccessFlags::empty()),
        };
        let mut flags = AccessFlags::empty();
        if access.reads() {
            flags |= read;
        }
        if access.writes() {
            flags |= write;
        }
        flags
    }
}

/// Read/write classification of a use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read-only access.
    Read,
    /// Write-only access.
    Write,
    /// Read and write access.
    ReadWrite,
}

impl Access {
    /// Check if this access includes reading.
    pub fn reads(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Check if this access includes writing.
    pub fn writes(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Access implied by render-pass load and store operations.
    ///
    /// Loading previous contents reads the attachment; storing or clearing
    /// writes it.
    pub fn from_load_store(load: LoadOp, store: StoreOp) -> Self {
        let reads = load == LoadOp::Load;
        let writes = store == StoreOp::Store || matches!(load, LoadOp::Clear(_));
        match (reads, writes) {
            (true, true) => Self::ReadWrite,
            (true, false) => Self::Read,
            _ => Self::Write,
        }
    }
}

/// Operation to perform when loading an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp {
    /// Clear the attachment with a specified value.
    Clear(ClearValue),
    /// Load the existing contents of the attachment.
    #[default]
    Load,
    /// Don't care about the existing contents (may be undefined).
    DontCare,
}

impl LoadOp {
    /// Create a clear operation with a color value.
    pub fn clear_color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Clear(ClearValue::color(r, g, b, a))
    }

    /// Create a clear operation with a depth value.
    pub fn clear_depth(depth: f32) -> Self {
        Self::Clear(ClearValue::depth(depth))
    }
}

/// Operation to perform when storing an attachment at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Store the attachment contents for later use.
    #[default]
    Store,
    /// Don't care about the contents after the pass (may be discarded).
    DontCare,
}

/// Full declaration of one attachment use.
///
/// The typed helpers on [`PassBuilder`](super::PassBuilder) build these; use
/// [`PassBuilder::declare`](super::PassBuilder::declare) directly to supply
/// explicit stages or a sub-resource range.
///
/// # Example
///
/// ```ignore
/// // Write mip 1 of a storage image from a compute pass
/// builder.declare(
///     image,
///     UseDesc::new(AttachmentUsage::Storage, Access::Write)
///         .with_range(ImageSubresourceRange::mip(1, 1).into()),
/// )?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UseDesc {
    pub usage: AttachmentUsage,
    pub access: Access,
    /// Stages; `None` picks [`AttachmentUsage::default_stages`].
    pub stages: Option<PipelineStage>,
    /// Range; `None` covers the whole resource.
    pub range: Option<SubresourceRange>,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl UseDesc {
    pub fn new(usage: AttachmentUsage, access: Access) -> Self {
        Self {
            usage,
            access,
            stages: None,
            range: None,
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
        }
    }

    /// Render target or depth use whose access follows the load/store ops.
    pub fn attachment(usage: AttachmentUsage, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            load_op,
            store_op,
            ..Self::new(usage, Access::from_load_store(load_op, store_op))
        }
    }

    pub fn with_stages(mut self, stages: PipelineStage) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn with_range(mut self, range: SubresourceRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// State an attachment must be in for a use.
pub(crate) fn use_state(
    usage: AttachmentUsage,
    access: Access,
    stages: PipelineStage,
    is_image: bool,
) -> ResourceState {
    let layout = if is_image {
        usage.layout(access)
    } else {
        TextureLayout::Undefined
    };
    ResourceState::new(layout, usage.access_flags(access), stages)
}
