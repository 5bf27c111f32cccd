//! Transient resource memory allocator.
//!
//! Transient attachments live for a single frame. Instead of allocating
//! device memory for each of them, the [`TransientAllocator`] keeps a pool of
//! large memory blocks and sub-allocates ranges from them through a
//! [`VirtualBlock`] per block. Freeing a transient only returns its range to
//! the virtual block, so a resource whose lifetime starts after another one
//! ended can land on the same bytes (aliasing).
//!
//! # Block sizing
//!
//! When no existing block can hold a request, a new block of
//! `max(request, preferred_block_size(heap))` bytes is created, see
//! [`AllocatorConfig::preferred_block_size`]. Blocks are only returned to the
//! device by [`TransientAllocator::release_blocks`] or when the allocator is
//! dropped.
//!
//! # Failure
//!
//! Running out of device memory while creating a block is reported as
//! [`RhiError::OutOfMemory`]. The allocator never retries with a smaller
//! block.

mod virtual_block;

pub use virtual_block::{VirtualAllocation, VirtualBlock};

use std::sync::Arc;

use crate::backend::{
    Backend, BackendError, BufferHandle, ImageHandle, MemoryHandle, MemoryProperties,
    MemoryPropertyFlags, MemoryRequirements,
};
use crate::config::{AllocatorConfig, align_up};
use crate::error::{Result, RhiError};

/// Index of a block inside a [`TransientAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sub-allocated range of a memory block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// Block the range belongs to.
    pub block: BlockId,
    /// Device memory of that block.
    pub memory: MemoryHandle,
    /// Byte offset into the block.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Allocation {
    /// Returns true if both allocations share a byte of the same block.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.block == other.block
            && self.offset < other.offset + other.size
            && other.offset < self.offset + self.size
    }

    fn virtual_range(&self) -> VirtualAllocation {
        VirtualAllocation {
            offset: self.offset,
            size: self.size,
        }
    }
}

#[derive(Debug)]
struct Block {
    memory: MemoryHandle,
    memory_type_index: u32,
    virtual_block: VirtualBlock,
}

/// Block-pool allocator for transient resources.
///
/// Not thread-safe; the frame scheduler owns one allocator per frame slot.
#[derive(Debug)]
pub struct TransientAllocator {
    backend: Arc<dyn Backend>,
    config: AllocatorConfig,
    memory_properties: MemoryProperties,
    blocks: Vec<Block>,
    /// `allocate` calls since the last reset.
    allocation_count: usize,
}

impl TransientAllocator {
    /// Create an allocator with no blocks.
    pub fn new(backend: Arc<dyn Backend>, config: AllocatorConfig) -> Self {
        let memory_properties = backend.memory_properties();
        Self {
            backend,
            config,
            memory_properties,
            blocks: Vec::new(),
            allocation_count: 0,
        }
    }

    /// Number of device memory blocks owned by the allocator.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of `allocate` calls since the last [`reset`](Self::reset).
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of ranges currently allocated across all blocks.
    pub fn live_allocation_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| block.virtual_block.allocation_count())
            .sum()
    }

    /// Total device memory held by the allocator.
    pub fn total_block_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .map(|block| block.virtual_block.size())
            .sum()
    }

    /// Sub-allocate a range satisfying `requirements`.
    ///
    /// Existing blocks with a compatible memory type are tried first; a new
    /// block is created only if none of them has room.
    pub fn allocate(&mut self, requirements: MemoryRequirements) -> Result<Allocation> {
        profile_scope!("transient_allocate");

        for (index, block) in self.blocks.iter_mut().enumerate() {
            if requirements.memory_type_bits & (1 << block.memory_type_index) == 0 {
                continue;
            }
            if let Some(range) = block
                .virtual_block
                .allocate(requirements.size, requirements.alignment)
            {
                self.allocation_count += 1;
                return Ok(Allocation {
                    block: BlockId(index as u32),
                    memory: block.memory,
                    offset: range.offset,
                    size: range.size,
                });
            }
        }

        let memory_type_index = self.select_memory_type(requirements.memory_type_bits)?;
        let heap_size = self
            .memory_properties
            .heap_size_of(memory_type_index)
            .unwrap_or(self.config.large_heap_block_size);
        let block_size = align_up(requirements.size, self.config.block_alignment)
            .ok_or(RhiError::OutOfMemory {
                requested: requirements.size,
            })?
            .max(self.config.preferred_block_size(heap_size));

        let memory = self
            .backend
            .allocate_memory(memory_type_index, block_size)
            .map_err(|err| match err {
                BackendError::OutOfDeviceMemory { .. } => RhiError::OutOfMemory {
                    requested: block_size,
                },
                other => RhiError::from(other),
            })?;
        log::debug!(
            "Transient allocator: new block {} of {} bytes (memory type {})",
            self.blocks.len(),
            block_size,
            memory_type_index
        );

        let mut virtual_block = VirtualBlock::new(block_size);
        let range = virtual_block
            .allocate(requirements.size, requirements.alignment)
            .ok_or(RhiError::OutOfMemory {
                requested: requirements.size,
            })?;
        let block = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            memory,
            memory_type_index,
            virtual_block,
        });
        self.allocation_count += 1;

        Ok(Allocation {
            block,
            memory,
            offset: range.offset,
            size: range.size,
        })
    }

    /// Allocate memory for `image` and bind it.
    pub fn allocate_image(&mut self, image: ImageHandle) -> Result<Allocation> {
        let requirements = self.backend.image_memory_requirements(image)?;
        let allocation = self.allocate(requirements)?;
        if let Err(err) =
            self.backend
                .bind_image_memory(image, allocation.memory, allocation.offset)
        {
            self.free(allocation);
            return Err(err.into());
        }
        Ok(allocation)
    }

    /// Allocate memory for `buffer` and bind it.
    pub fn allocate_buffer(&mut self, buffer: BufferHandle) -> Result<Allocation> {
        let requirements = self.backend.buffer_memory_requirements(buffer)?;
        let allocation = self.allocate(requirements)?;
        if let Err(err) =
            self.backend
                .bind_buffer_memory(buffer, allocation.memory, allocation.offset)
        {
            self.free(allocation);
            return Err(err.into());
        }
        Ok(allocation)
    }

    /// Return an allocation's range to its block.
    ///
    /// Device memory stays with the allocator.
    pub fn free(&mut self, allocation: Allocation) {
        match self.blocks.get_mut(allocation.block.index()) {
            Some(block) => block.virtual_block.free(allocation.virtual_range()),
            None => log::warn!("Transient allocator: free of unknown {:?}", allocation),
        }
    }

    /// Free every range in every block, keeping the blocks.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.virtual_block.reset();
        }
        self.allocation_count = 0;
    }

    /// Return all blocks to the device.
    ///
    /// Every resource bound to a block must have been destroyed first.
    pub fn release_blocks(&mut self) {
        for block in self.blocks.drain(..) {
            self.backend.free_memory(block.memory);
        }
        self.allocation_count = 0;
    }

    fn select_memory_type(&self, memory_type_bits: u32) -> Result<u32> {
        let compatible = |index: &u32| memory_type_bits & (1 << index) != 0;
        let types = &self.memory_properties.memory_types;
        let count = types.len() as u32;

        (0..count)
            .filter(compatible)
            .find(|&i| {
                types[i as usize]
                    .property_flags
                    .contains(MemoryPropertyFlags::DEVICE_LOCAL)
            })
            .or_else(|| (0..count).find(compatible))
            .ok_or_else(|| {
                RhiError::Backend(format!(
                    "no memory type matches mask {memory_type_bits:#b}"
                ))
            })
    }
}

impl Drop for TransientAllocator {
    fn drop(&mut self) {
        self.release_blocks();
    }
}

static_assertions::assert_impl_all!(TransientAllocator: Send, Sync);
