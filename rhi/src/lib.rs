//! # RedLilium RHI
//!
//! Render hardware interface core for RedLilium: a frame graph compiler, a
//! transient memory allocator and a frame scheduler, on top of an abstract
//! GPU [`Backend`].
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Declarative description of a frame's passes and attachments
//! - [`CompiledGraph`] - Barriers, queue transfers, semaphores and transient lifetimes
//! - [`TransientAllocator`](allocator::TransientAllocator) - Block pool with memory aliasing
//! - [`FrameScheduler`] - Frames in flight, submission and presentation
//! - [`Backend`] - Trait for native graphics API adapters, plus the
//!   [`DummyBackend`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_rhi::{DummyBackend, FrameScheduler, SchedulerConfig};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let mut scheduler = FrameScheduler::new(backend, SchedulerConfig::default())?;
//!
//! scheduler.begin_frame(Extent2d::new(1280, 720))?;
//! let hdr = scheduler.create_transient_image(hdr_desc)?;
//! scheduler.add_pass("geometry", QueueType::Graphics, |b| { ... }, |data, ctx| { ... })?;
//! scheduler.end_frame()?;
//! ```

#[macro_use]
pub mod profiling;

pub mod allocator;
pub mod backend;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod scheduler;
pub mod types;

// Re-export main types for convenience
pub use backend::{Backend, BackendError};
#[cfg(any(test, feature = "dummy"))]
pub use backend::{BackendEvent, DummyBackend, DummyConfig};
pub use compiler::CompiledGraph;
pub use config::{AllocatorConfig, SchedulerConfig};
pub use error::{Result, RhiError, ValidationError};
pub use graph::{AttachmentHandle, LoadOp, PassHandle, RenderGraph, StoreOp};
pub use scheduler::{FrameScheduler, FrameState, FrameStats};
pub use types::{
    BufferDescriptor, BufferUsage, ClearValue, Extent2d, Extent3d, QueueType, ResourceState,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// RHI library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the RHI.
///
/// Only logs the version; backends are created explicitly.
pub fn init() {
    log::info!("RedLilium RHI v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_empty_graph_compiles() {
        let mut graph = RenderGraph::new();
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_count(), 0);
        assert!(compiled.submissions().is_empty());
    }

    #[test]
    fn test_scheduler_on_dummy_backend() {
        let backend = Arc::new(DummyBackend::new());
        assert_eq!(backend.name(), "Dummy");
        let scheduler = FrameScheduler::new(backend, SchedulerConfig::default()).unwrap();
        assert_eq!(scheduler.state(), FrameState::Idle);
    }
}
