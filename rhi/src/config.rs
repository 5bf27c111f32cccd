//! Scheduler and allocator configuration.

/// 1 GiB. Heaps at or below this size are considered small.
const DEFAULT_SMALL_HEAP_MAX_SIZE: u64 = 1024 * 1024 * 1024;

/// 256 MiB block size for large heaps.
const DEFAULT_LARGE_HEAP_BLOCK_SIZE: u64 = 256 * 1024 * 1024;

/// Default block alignment in bytes.
const DEFAULT_BLOCK_ALIGNMENT: u64 = 32;

/// Maximum supported frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Transient allocator block-sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Heaps up to this size get blocks of one eighth of the heap.
    pub small_heap_max_size: u64,
    /// Block size used for heaps larger than `small_heap_max_size`.
    pub large_heap_block_size: u64,
    /// Block sizes are rounded up to this alignment.
    pub block_alignment: u64,
}

impl AllocatorConfig {
    /// Set the small heap threshold.
    pub fn with_small_heap_max_size(mut self, size: u64) -> Self {
        self.small_heap_max_size = size;
        self
    }

    /// Set the block size for large heaps.
    pub fn with_large_heap_block_size(mut self, size: u64) -> Self {
        self.large_heap_block_size = size;
        self
    }

    /// Set the block alignment.
    pub fn with_block_alignment(mut self, alignment: u64) -> Self {
        self.block_alignment = alignment.max(1);
        self
    }

    /// Preferred size of a new block carved from a heap of `heap_size` bytes.
    pub fn preferred_block_size(&self, heap_size: u64) -> u64 {
        let size = if heap_size <= self.small_heap_max_size {
            heap_size / 8
        } else {
            self.large_heap_block_size
        };
        align_up(size, self.block_alignment).unwrap_or(size)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            small_heap_max_size: DEFAULT_SMALL_HEAP_MAX_SIZE,
            large_heap_block_size: DEFAULT_LARGE_HEAP_BLOCK_SIZE,
            block_alignment: DEFAULT_BLOCK_ALIGNMENT,
        }
    }
}

/// Frame scheduler configuration.
///
/// # Example
///
/// ```ignore
/// let config = SchedulerConfig::default()
///     .with_frames_in_flight(3)
///     .with_allocator(AllocatorConfig::default().with_block_alignment(256));
/// let scheduler = FrameScheduler::new(backend, config)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of frames the CPU may record ahead of the GPU (1..=3).
    pub frames_in_flight: usize,
    /// Transient allocator policy.
    pub allocator: AllocatorConfig,
}

impl SchedulerConfig {
    /// Set the number of frames in flight, clamped to `1..=MAX_FRAMES_IN_FLIGHT`.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.clamp(1, MAX_FRAMES_IN_FLIGHT);
        self
    }

    /// Set the allocator policy.
    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = allocator;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            allocator: AllocatorConfig::default(),
        }
    }
}

/// Round `value` up to a multiple of `alignment`, or `None` on overflow.
pub(crate) fn align_up(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }
    value.div_ceil(alignment).checked_mul(alignment)
}
