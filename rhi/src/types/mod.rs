//! Common types and descriptors for render graph resources.
//!
//! This module contains format enums, usage flags, descriptor structs and
//! the synchronization vocabulary (stages, access masks, layouts) shared by
//! the graph, compiler and backends.

mod buffer;
mod common;
mod queue;
mod range;
mod sync;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{ClearValue, Extent2d, Extent3d};
pub use queue::{PassKind, QueueTransfer, QueueType};
pub use range::{BufferRange, ImageSubresourceRange, SubresourceRange};
pub use sync::{AccessFlags, PipelineStage, ResourceState, TextureLayout};
pub use texture::{TextureDescriptor, TextureFormat, TextureSize, TextureUsage};
