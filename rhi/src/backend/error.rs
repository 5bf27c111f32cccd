//! Backend error types.

use thiserror::Error;

/// Errors reported by a [`Backend`](super::Backend) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A device memory allocation could not be satisfied.
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfDeviceMemory { requested: u64 },
    /// The device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// The swapchain no longer matches the surface.
    #[error("surface out of date")]
    SurfaceOutOfDate,
    /// A handle was not created by this backend or was already destroyed.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    /// The requested feature is not supported.
    #[error("feature not supported: {0}")]
    Unsupported(String),
    /// Internal backend error.
    #[error("internal backend error: {0}")]
    Internal(String),
}

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;
