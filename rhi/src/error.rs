//! Error types.
//!
//! Errors fall into four classes with different recovery rules:
//!
//! | Class | Type | Scope |
//! |-------|------|-------|
//! | Misuse of the graph API | [`ValidationError`] | current graph, never retried |
//! | Transient memory exhaustion | [`RhiError::OutOfMemory`] | current frame only |
//! | Device loss / failed submission | [`RhiError::DeviceLost`], [`RhiError::SubmissionFailed`] | whole scheduler |
//! | Swapchain out of date | [`RhiError::SurfaceOutOfDate`] | recoverable on the next frame |

use thiserror::Error;

use crate::backend::BackendError;
use crate::graph::{AttachmentHandle, AttachmentUsage};
use crate::types::{PassKind, QueueType};

/// Misuse of the render graph or scheduler API.
///
/// Validation errors are detected before any GPU work of the frame is
/// submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The handle was never created by this graph, or belongs to a previous frame.
    #[error("unknown attachment {0:?}")]
    UnknownAttachment(AttachmentHandle),
    /// A pass or attachment was added after the graph was compiled.
    #[error("render graph has already been compiled")]
    GraphCompiled,
    /// The first use of a transient attachment only reads it.
    #[error("transient attachment '{attachment}' is read by pass '{pass}' before being written")]
    ReadBeforeWrite { attachment: String, pass: String },
    /// The usage does not fit the attachment's resource kind or flags.
    #[error("attachment '{attachment}' cannot be used as {usage:?}")]
    IncompatibleUsage {
        attachment: String,
        usage: AttachmentUsage,
    },
    /// The declared sub-resource range lies outside the resource.
    #[error("range is out of bounds for attachment '{attachment}'")]
    RangeOutOfBounds { attachment: String },
    /// The declared sub-resource range is empty.
    #[error("empty range declared for attachment '{attachment}'")]
    EmptyRange { attachment: String },
    /// The pass kind cannot run on the requested queue.
    #[error("{kind:?} pass '{pass}' cannot run on the {queue} queue")]
    QueueMismatch {
        pass: String,
        kind: PassKind,
        queue: QueueType,
    },
    /// A presentable attachment was imported but no pass uses it.
    #[error("presentable attachment '{attachment}' is never used")]
    UnusedPresentable { attachment: String },
    /// A swapchain image was already imported this frame.
    #[error("a swapchain image was already imported this frame")]
    SwapchainAlreadyImported,
    /// `begin_frame` was called while a frame is in progress.
    #[error("begin_frame called while a frame is already in progress")]
    FrameAlreadyBegun,
    /// A frame operation was called outside of `begin_frame`/`end_frame`.
    #[error("no frame in progress")]
    FrameNotBegun,
}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    /// Misuse of the graph API.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    /// The transient allocator could not grow its block pool.
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },
    /// The device was lost; the scheduler must be recreated.
    #[error("GPU device lost")]
    DeviceLost,
    /// A queue submission failed; the scheduler must be recreated.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    /// The presentation surface changed; resize and retry on the next frame.
    #[error("surface out of date")]
    SurfaceOutOfDate,
    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl RhiError {
    /// Returns true if the caller can continue with the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SurfaceOutOfDate)
    }

    /// Returns true if the scheduler instance is unusable after this error.
    pub fn is_fatal_to_scheduler(&self) -> bool {
        matches!(self, Self::DeviceLost | Self::SubmissionFailed(_))
    }
}

impl From<BackendError> for RhiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfDeviceMemory { requested } => Self::OutOfMemory { requested },
            BackendError::DeviceLost => Self::DeviceLost,
            BackendError::SurfaceOutOfDate => Self::SurfaceOutOfDate,
            other => Self::Backend(other.to_string()),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RhiError>;
