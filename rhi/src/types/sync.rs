//! Synchronization state: pipeline stages, access masks and texture layouts.
//!
//! A [`ResourceState`] is the triple a barrier transitions between. The
//! render graph derives one for every attachment use and the compiler emits
//! barriers whenever two ordered uses disagree.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages that access a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
        const ALL_COMMANDS = 1 << 11;
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Memory access types performed on a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_READ = 1 << 6;
        const COLOR_ATTACHMENT_WRITE = 1 << 7;
        const DEPTH_STENCIL_READ = 1 << 8;
        const DEPTH_STENCIL_WRITE = 1 << 9;
        const TRANSFER_READ = 1 << 10;
        const TRANSFER_WRITE = 1 << 11;
        const MEMORY_READ = 1 << 12;
        const MEMORY_WRITE = 1 << 13;
    }
}

impl AccessFlags {
    /// Every access bit that modifies memory.
    pub const WRITES: Self = Self::SHADER_WRITE
        .union(Self::COLOR_ATTACHMENT_WRITE)
        .union(Self::DEPTH_STENCIL_WRITE)
        .union(Self::TRANSFER_WRITE)
        .union(Self::MEMORY_WRITE);

    /// Returns true if any bit is a write.
    pub fn has_writes(self) -> bool {
        self.intersects(Self::WRITES)
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Image layout states that textures can be in.
///
/// Buffers have no layout; their states always carry [`TextureLayout::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Contents undefined. Can transition to any layout.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Optimal for depth read-only (sampling + depth testing).
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Optimal for presentation to swapchain.
    PresentSrc,
    /// General layout, used for storage images.
    General,
}

impl TextureLayout {
    /// Check if this is a depth/stencil layout.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::DepthStencilAttachment | Self::DepthStencilReadOnly
        )
    }
}

/// Layout, access and stages of a resource at one point of its timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceState {
    /// Image layout ([`TextureLayout::Undefined`] for buffers).
    pub layout: TextureLayout,
    /// Memory accesses performed in this state.
    pub access: AccessFlags,
    /// Stages performing those accesses.
    pub stages: PipelineStage,
}

impl ResourceState {
    /// The state of freshly allocated memory.
    pub const UNDEFINED: Self = Self {
        layout: TextureLayout::Undefined,
        access: AccessFlags::empty(),
        stages: PipelineStage::empty(),
    };

    /// Ready for presentation.
    pub const PRESENT: Self = Self {
        layout: TextureLayout::PresentSrc,
        access: AccessFlags::empty(),
        stages: PipelineStage::BOTTOM_OF_PIPE,
    };

    pub fn new(layout: TextureLayout, access: AccessFlags, stages: PipelineStage) -> Self {
        Self {
            layout,
            access,
            stages,
        }
    }

    /// A resting layout with no pending accesses, e.g. a texture uploaded
    /// and transitioned by code outside the render graph.
    pub fn resting(layout: TextureLayout) -> Self {
        Self::new(layout, AccessFlags::empty(), PipelineStage::empty())
    }

    /// Returns true if this state modifies memory.
    pub fn is_write(&self) -> bool {
        self.access.has_writes()
    }
}
