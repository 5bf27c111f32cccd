//! Buffer descriptors.

use bitflags::bitflags;

use super::BufferRange;

bitflags! {
    /// How a buffer may be used by passes.
    ///
    /// A pass declaring a use the flags do not allow is rejected when the
    /// pass is added.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        /// Read through a uniform binding (`read_texture` on a buffer).
        const UNIFORM = 1 << 2;
        /// Read or written through a storage binding.
        const STORAGE = 1 << 3;
        /// Indirect draw or dispatch arguments.
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

/// Describes a buffer attachment.
///
/// Transient buffers are created from this descriptor by the scheduler;
/// for imported and registered buffers it only serves validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label; also the attachment name for transients.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Span covering every byte of the buffer.
    pub fn whole_range(&self) -> BufferRange {
        BufferRange::whole(self.size)
    }
}
