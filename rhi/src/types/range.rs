//! Sub-resource ranges.
//!
//! Every attachment use covers a range of its resource: a mip/layer rectangle
//! for images or a byte span for buffers. Uses that do not declare a range
//! cover the whole resource. Barrier placement only orders uses whose ranges
//! overlap, so clients that supply disjoint ranges get independent timelines
//! for each part of the resource.

/// A rectangle of mip levels and array layers within an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSubresourceRange {
    /// First mip level.
    pub base_mip_level: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// First array layer.
    pub base_array_layer: u32,
    /// Number of array layers.
    pub array_layer_count: u32,
}

impl ImageSubresourceRange {
    /// Create a range from explicit bounds.
    pub fn new(
        base_mip_level: u32,
        mip_level_count: u32,
        base_array_layer: u32,
        array_layer_count: u32,
    ) -> Self {
        Self {
            base_mip_level,
            mip_level_count,
            base_array_layer,
            array_layer_count,
        }
    }

    /// Range covering every mip level and layer of an image.
    pub fn whole(mip_level_count: u32, array_layer_count: u32) -> Self {
        Self::new(0, mip_level_count, 0, array_layer_count)
    }

    /// A single mip level across all layers.
    pub fn mip(level: u32, array_layer_count: u32) -> Self {
        Self::new(level, 1, 0, array_layer_count)
    }

    /// One past the last mip level.
    pub fn mip_end(&self) -> u32 {
        self.base_mip_level + self.mip_level_count
    }

    /// One past the last array layer.
    pub fn layer_end(&self) -> u32 {
        self.base_array_layer + self.array_layer_count
    }

    pub fn is_empty(&self) -> bool {
        self.mip_level_count == 0 || self.array_layer_count == 0
    }

    /// Returns true if the two ranges share at least one subresource.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns true if `other` lies entirely inside this range.
    pub fn contains(&self, other: &Self) -> bool {
        other.base_mip_level >= self.base_mip_level
            && other.mip_end() <= self.mip_end()
            && other.base_array_layer >= self.base_array_layer
            && other.layer_end() <= self.layer_end()
    }

    /// The subresources present in both ranges.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let mip_start = self.base_mip_level.max(other.base_mip_level);
        let mip_end = self.mip_end().min(other.mip_end());
        let layer_start = self.base_array_layer.max(other.base_array_layer);
        let layer_end = self.layer_end().min(other.layer_end());
        if mip_start >= mip_end || layer_start >= layer_end {
            return None;
        }
        Some(Self::new(
            mip_start,
            mip_end - mip_start,
            layer_start,
            layer_end - layer_start,
        ))
    }
}

/// A byte span within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// Offset in bytes.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl BufferRange {
    /// Create a range from an offset and size.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Range covering the whole buffer.
    pub fn whole(size: u64) -> Self {
        Self::new(0, size)
    }

    /// One past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns true if the two spans share at least one byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// Returns true if `other` lies entirely inside this span.
    pub fn contains(&self, other: &Self) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// The bytes present in both spans.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.offset.max(other.offset);
        let end = self.end().min(other.end());
        (start < end).then(|| Self::new(start, end - start))
    }
}

/// Range of an attachment touched by a single use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubresourceRange {
    /// Mip/layer range of an image.
    Image(ImageSubresourceRange),
    /// Byte range of a buffer.
    Buffer(BufferRange),
}

impl SubresourceRange {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Image(range) => range.is_empty(),
            Self::Buffer(range) => range.is_empty(),
        }
    }

    /// Returns true if both ranges are of the same kind and overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns true if both ranges are of the same kind and `other` lies inside `self`.
    pub fn contains(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Image(a), Self::Image(b)) => a.contains(b),
            (Self::Buffer(a), Self::Buffer(b)) => a.contains(b),
            _ => false,
        }
    }

    /// Intersection of two ranges of the same kind.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Image(a), Self::Image(b)) => a.intersection(b).map(Self::Image),
            (Self::Buffer(a), Self::Buffer(b)) => a.intersection(b).map(Self::Buffer),
            _ => None,
        }
    }
}

impl From<ImageSubresourceRange> for SubresourceRange {
    fn from(range: ImageSubresourceRange) -> Self {
        Self::Image(range)
    }
}

impl From<BufferRange> for SubresourceRange {
    fn from(range: BufferRange) -> Self {
        Self::Buffer(range)
    }
}
