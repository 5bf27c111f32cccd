//! Queue and pass classification.

use std::fmt;

/// An independent GPU execution stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    /// Graphics queue; also capable of compute and transfer work.
    Graphics,
    /// Async compute queue.
    Compute,
    /// Dedicated copy queue.
    Transfer,
}

impl QueueType {
    /// All queue types, in index order.
    pub const ALL: [QueueType; 3] = [Self::Graphics, Self::Compute, Self::Transfer];

    /// Number of queue types.
    pub const COUNT: usize = 3;

    /// Dense index for per-queue tables.
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Transfer => 2,
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graphics => write!(f, "graphics"),
            Self::Compute => write!(f, "compute"),
            Self::Transfer => write!(f, "transfer"),
        }
    }
}

/// Queue-family ownership transfer carried by a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueTransfer {
    /// Queue releasing ownership.
    pub src: QueueType,
    /// Queue acquiring ownership.
    pub dst: QueueType,
}

/// Kind of work a pass records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Rasterization work with render targets.
    Graphics,
    /// Compute dispatches.
    Compute,
    /// Copies only.
    Transfer,
}

impl PassKind {
    /// The natural kind for work submitted to `queue`.
    pub fn for_queue(queue: QueueType) -> Self {
        match queue {
            QueueType::Graphics => Self::Graphics,
            QueueType::Compute => Self::Compute,
            QueueType::Transfer => Self::Transfer,
        }
    }

    /// Returns true if a pass of this kind can execute on `queue`.
    pub fn supported_on(self, queue: QueueType) -> bool {
        match self {
            Self::Graphics => queue == QueueType::Graphics,
            Self::Compute => matches!(queue, QueueType::Graphics | QueueType::Compute),
            Self::Transfer => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_indices_are_dense() {
        for (i, queue) in QueueType::ALL.iter().enumerate() {
            assert_eq!(queue.index(), i);
        }
    }

    #[test]
    fn test_pass_kind_capabilities() {
        assert!(PassKind::Graphics.supported_on(QueueType::Graphics));
        assert!(!PassKind::Graphics.supported_on(QueueType::Compute));
        assert!(PassKind::Compute.supported_on(QueueType::Graphics));
        assert!(!PassKind::Compute.supported_on(QueueType::Transfer));
        assert!(PassKind::Transfer.supported_on(QueueType::Compute));
    }
}
