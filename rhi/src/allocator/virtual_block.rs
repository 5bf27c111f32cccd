//! Offset-only range allocator.
//!
//! A [`VirtualBlock`] manages the address space of one device-memory block
//! without touching the memory itself. It hands out aligned byte ranges and
//! takes them back, coalescing neighbouring free ranges, so the transient
//! allocator can tell which parts of a block are in use at any point of the
//! frame.
//!
//! # Example
//!
//! ```ignore
//! let mut block = VirtualBlock::new(1024);
//! let a = block.allocate(256, 256).unwrap();
//! let b = block.allocate(256, 256).unwrap();
//! block.free(a);
//! // The freed range is handed out again
//! assert_eq!(block.allocate(128, 64).unwrap().offset, 0);
//! ```

use crate::config::align_up;

/// A range handed out by a [`VirtualBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualAllocation {
    /// Byte offset into the block.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

impl VirtualAllocation {
    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Returns true if the two allocations share any byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// First-fit free-list allocator over `0..size`.
///
/// Free ranges are kept sorted by offset and never adjacent to each other.
#[derive(Debug, Clone)]
pub struct VirtualBlock {
    size: u64,
    free: Vec<VirtualAllocation>,
    allocation_count: usize,
}

impl VirtualBlock {
    /// Create an empty block of `size` bytes.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            free: vec![VirtualAllocation { offset: 0, size }],
            allocation_count: 0,
        }
    }

    /// Total size of the block.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Returns true if nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.allocation_count == 0
    }

    /// Total free bytes (possibly fragmented).
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|range| range.size).sum()
    }

    /// Allocate `size` bytes at an offset that is a multiple of `alignment`.
    ///
    /// Returns `None` if no free range can hold the request.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Option<VirtualAllocation> {
        debug_assert!(
            alignment == 0 || alignment.is_power_of_two(),
            "alignment must be power of 2"
        );
        let size = size.max(1);

        let (index, offset) = self.free.iter().enumerate().find_map(|(i, range)| {
            let offset = align_up(range.offset, alignment)?;
            let end = offset.checked_add(size)?;
            (end <= range.end()).then_some((i, offset))
        })?;

        let range = self.free.remove(index);
        let mut insert_at = index;
        // Alignment padding stays free in front of the allocation
        if offset > range.offset {
            self.free.insert(
                insert_at,
                VirtualAllocation {
                    offset: range.offset,
                    size: offset - range.offset,
                },
            );
            insert_at += 1;
        }
        let end = offset + size;
        if end < range.end() {
            self.free.insert(
                insert_at,
                VirtualAllocation {
                    offset: end,
                    size: range.end() - end,
                },
            );
        }

        self.allocation_count += 1;
        Some(VirtualAllocation { offset, size })
    }

    /// Return a range to the free list.
    ///
    /// The allocation must have been produced by this block and not yet freed.
    pub fn free(&mut self, allocation: VirtualAllocation) {
        debug_assert!(allocation.end() <= self.size, "allocation outside block");
        debug_assert!(
            !self.free.iter().any(|range| range.overlaps(&allocation)),
            "double free of {allocation:?}"
        );

        let index = self
            .free
            .partition_point(|range| range.offset < allocation.offset);
        self.free.insert(index, allocation);

        // Coalesce with the following range
        if index + 1 < self.free.len() && self.free[index].end() == self.free[index + 1].offset {
            let next = self.free.remove(index + 1);
            self.free[index].size += next.size;
        }
        // Coalesce with the preceding range
        if index > 0 && self.free[index - 1].end() == self.free[index].offset {
            let current = self.free.remove(index);
            self.free[index - 1].size += current.size;
        }

        self.allocation_count = self.allocation_count.saturating_sub(1);
    }

    /// Free every allocation at once.
    pub fn reset(&mut self) {
        self.free.clear();
        self.free.push(VirtualAllocation {
            offset: 0,
            size: self.size,
        });
        self.allocation_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocations() {
        let mut block = VirtualBlock::new(1024);
        let a = block.allocate(100, 1).unwrap();
        let b = block.allocate(100, 1).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 100);
        assert_eq!(block.allocation_count(), 2);
        assert_eq!(block.free_bytes(), 824);
    }

    #[test]
    fn test_alignment_padding_stays_free() {
        let mut block = VirtualBlock::new(1024);
        block.allocate(10, 1).unwrap();
        let b = block.allocate(100, 256).unwrap();
        assert_eq!(b.offset, 256);

        // The padding between 10 and 256 can still be used
        let c = block.allocate(200, 8).unwrap();
        assert_eq!(c.offset, 16);
    }

    #[test]
    fn test_full_block_rejects() {
        let mut block = VirtualBlock::new(512);
        assert!(block.allocate(512, 256).is_some());
        assert!(block.allocate(1, 1).is_none());
    }

    #[test]
    fn test_oversized_request_after_offset_rejects() {
        let mut block = VirtualBlock::new(1024);
        block.allocate(10, 1).unwrap();
        assert!(block.allocate(u64::MAX, 1).is_none());
        assert!(block.allocate(u64::MAX - 8, 256).is_none());
        assert_eq!(block.allocation_count(), 1);
    }

    #[test]
    fn test_free_coalesces() {
        let mut block = VirtualBlock::new(300);
        let a = block.allocate(100, 1).unwrap();
        let b = block.allocate(100, 1).unwrap();
        let c = block.allocate(100, 1).unwrap();

        block.free(a);
        block.free(c);
        assert!(block.allocate(200, 1).is_none());

        block.free(b);
        assert!(block.is_empty());
        let whole = block.allocate(300, 1).unwrap();
        assert_eq!(whole.offset, 0);
    }

    #[test]
    fn test_freed_range_is_reused() {
        let mut block = VirtualBlock::new(1024);
        let a = block.allocate(512, 256).unwrap();
        block.free(a);
        let b = block.allocate(512, 256).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset() {
        let mut block = VirtualBlock::new(256);
        block.allocate(128, 1).unwrap();
        block.allocate(128, 1).unwrap();
        block.reset();
        assert!(block.is_empty());
        assert_eq!(block.free_bytes(), 256);
    }
}
