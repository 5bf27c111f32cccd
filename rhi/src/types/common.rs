//! Extents and clear values.

/// Width and height in pixels; the frame size and render area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero (e.g. a minimized window).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Extent of an image; `depth` is 1 for 2D images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self::new_3d(width, height, 1)
    }

    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

impl From<Extent2d> for Extent3d {
    fn from(extent: Extent2d) -> Self {
        Self::new_2d(extent.width, extent.height)
    }
}

/// Value written by [`LoadOp::Clear`](crate::graph::LoadOp::Clear).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color { r: f32, g: f32, b: f32, a: f32 },
    Depth(f32),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    pub fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color { r, g, b, a }
    }

    pub fn depth(value: f32) -> Self {
        Self::Depth(value)
    }

    pub fn depth_stencil(depth: f32, stencil: u32) -> Self {
        Self::DepthStencil { depth, stencil }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_extent_to_image_extent() {
        assert_eq!(
            Extent3d::from(Extent2d::new(640, 480)),
            Extent3d::new_3d(640, 480, 1)
        );
    }

    #[test]
    fn test_minimized_frame_is_empty() {
        assert!(Extent2d::new(0, 720).is_empty());
        assert!(!Extent2d::new(1, 1).is_empty());
    }
}
