//! Texture descriptors.

use bitflags::bitflags;

use super::{Extent2d, Extent3d, ImageSubresourceRange};

/// Pixel format of an image attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R32Float,
    R32Uint,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    /// Common swapchain format.
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Returns true for depth and depth/stencil formats.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32Float)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8)
    }

    /// Bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
            _ => 4,
        }
    }
}

bitflags! {
    /// How an image may be used by passes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        /// Sampled in a shader (`read_texture`).
        const TEXTURE_BINDING = 1 << 2;
        /// Read or written as a storage image.
        const STORAGE_BINDING = 1 << 3;
        /// Color or depth/stencil target of a graphics pass.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Size of a texture, either fixed or derived from the frame size.
///
/// Frame-relative textures are re-created with a new extent whenever the
/// scheduler observes a frame size change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Fixed extent.
    Absolute(Extent3d),
    /// Frame size multiplied by a scale factor (e.g. 0.5 for half resolution).
    FrameRelative {
        /// Horizontal scale.
        scale_x: f32,
        /// Vertical scale.
        scale_y: f32,
    },
}

impl TextureSize {
    /// Resolve to a concrete extent for the given frame size.
    ///
    /// Relative sizes never resolve below one pixel.
    pub fn resolve(&self, frame: Extent2d) -> Extent3d {
        match *self {
            Self::Absolute(extent) => extent,
            Self::FrameRelative { scale_x, scale_y } => {
                let width = ((frame.width as f32 * scale_x).round() as u32).max(1);
                let height = ((frame.height as f32 * scale_y).round() as u32).max(1);
                Extent3d::new_2d(width, height)
            }
        }
    }
}

impl Default for TextureSize {
    fn default() -> Self {
        Self::Absolute(Extent3d::default())
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: TextureSize,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Array layer count.
    pub array_layer_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor with a fixed size.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: TextureSize::Absolute(Extent3d::new_2d(width, height)),
            format,
            usage,
            ..Self::default()
        }
    }

    /// Create a 2D texture descriptor sized relative to the frame.
    pub fn frame_relative(scale: f32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: TextureSize::FrameRelative {
                scale_x: scale,
                scale_y: scale,
            },
            format,
            usage,
            ..Self::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the array layer count.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layer_count = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Returns true if the texture follows the frame size.
    pub fn is_frame_relative(&self) -> bool {
        matches!(self.size, TextureSize::FrameRelative { .. })
    }

    /// Every mip level and array layer.
    pub fn whole_range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange::whole(self.mip_level_count.max(1), self.array_layer_count.max(1))
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: TextureSize::default(),
            mip_level_count: 1,
            array_layer_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_relative_resolve() {
        let desc = TextureDescriptor::frame_relative(
            0.5,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT,
        );
        assert!(desc.is_frame_relative());
        assert_eq!(
            desc.size.resolve(Extent2d::new(1920, 1080)),
            Extent3d::new_2d(960, 540)
        );
    }

    #[test]
    fn test_relative_never_zero() {
        let size = TextureSize::FrameRelative {
            scale_x: 0.25,
            scale_y: 0.25,
        };
        assert_eq!(size.resolve(Extent2d::new(2, 2)), Extent3d::new_2d(1, 1));
    }

    #[test]
    fn test_absolute_ignores_frame() {
        let desc = TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT,
        );
        assert_eq!(
            desc.size.resolve(Extent2d::new(1920, 1080)),
            Extent3d::new_2d(256, 256)
        );
        assert!(desc.format.is_depth_stencil());
    }

    #[test]
    fn test_whole_range_counts_mips_and_layers() {
        let desc = TextureDescriptor::new_2d(
            512,
            512,
            TextureFormat::Rgba16Float,
            TextureUsage::STORAGE_BINDING,
        )
        .with_mip_levels(10)
        .with_array_layers(6);
        assert_eq!(desc.whole_range(), ImageSubresourceRange::new(0, 10, 0, 6));
    }
}
