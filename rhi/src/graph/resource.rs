//! Attachment handles.

use std::sync::atomic::{AtomicU32, Ordering};

/// Allocate a process-unique generation for graphs and persistent registrations.
pub(crate) fn next_generation() -> u32 {
    static GENERATION: AtomicU32 = AtomicU32::new(1);
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Where an [`AttachmentHandle`] is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleScope {
    /// Created by one render graph; valid for that graph (one frame) only.
    Graph(u32),
    /// Registered with the frame scheduler; valid until unregistered.
    Persistent(u32),
}

/// Handle to an attachment.
///
/// Handles carry the generation of the graph or registration that created
/// them, so a handle from a previous frame is reported as unknown instead of
/// silently aliasing a new attachment with the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentHandle {
    index: u32,
    scope: HandleScope,
}

impl AttachmentHandle {
    pub(crate) fn new(index: u32, scope: HandleScope) -> Self {
        Self { index, scope }
    }

    /// Index within the owning graph or persistent table.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn scope(&self) -> HandleScope {
        self.scope
    }

    /// Returns true for handles registered with the scheduler.
    pub fn is_persistent(&self) -> bool {
        matches!(self.scope, HandleScope::Persistent(_))
    }
}

/// Dense, graph-local attachment index used by compiled output.
///
/// Unlike [`AttachmentHandle`], ids of two graphs built the same way compare
/// equal, which keeps compiled graphs comparable across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub(crate) u32);

impl AttachmentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a [`PassAttachmentUse`](super::PassAttachmentUse) in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UseIndex(pub(crate) u32);

impl UseIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_are_unique() {
        let a = next_generation();
        let b = next_generation();
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_scope() {
        let graph = AttachmentHandle::new(0, HandleScope::Graph(7));
        let persistent = AttachmentHandle::new(0, HandleScope::Persistent(7));
        assert_ne!(graph, persistent);
        assert!(persistent.is_persistent());
        assert!(!graph.is_persistent());
    }
}
