//! Attachment registry.
//!
//! The registry owns every attachment participating in one render graph and
//! an arena of [`PassAttachmentUse`] records. Each attachment keeps the index
//! of its first and last use; each use links to the previous and next use of
//! the same attachment. Following those links yields the attachment's
//! timeline in declaration order, which is what barrier placement walks.
//!
//! The arena is discarded with the graph at the end of every frame, so the
//! links never outlive the uses they point at.

use std::collections::HashMap;

use crate::backend::{BufferHandle, ImageHandle};
use crate::error::ValidationError;
use crate::types::{
    BufferDescriptor, PipelineStage, QueueType, ResourceState, SubresourceRange,
    TextureDescriptor,
};

use super::resource::{AttachmentHandle, AttachmentId, HandleScope, UseIndex, next_generation};
use super::resource_usage::{Access, AttachmentUsage, LoadOp, StoreOp, use_state};
use super::PassHandle;

/// Resource kind and description of an attachment.
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentKind {
    Image(TextureDescriptor),
    Buffer(BufferDescriptor),
}

impl AttachmentKind {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Range covering the whole resource.
    pub fn whole_range(&self) -> SubresourceRange {
        match self {
            Self::Image(desc) => SubresourceRange::Image(desc.whole_range()),
            Self::Buffer(desc) => SubresourceRange::Buffer(desc.whole_range()),
        }
    }

    /// Debug label of the underlying descriptor.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Image(desc) => desc.label.as_deref(),
            Self::Buffer(desc) => desc.label.as_deref(),
        }
    }
}

/// Who owns an attachment's backing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Created by the client; outlives the graph and never aliases.
    Persistent,
    /// Created, placed and destroyed by the graph within one frame.
    Transient,
}

/// Backend resource backing an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBinding {
    Image(ImageHandle),
    Buffer(BufferHandle),
}

/// A logical image or buffer participating in a render graph.
#[derive(Debug, Clone)]
pub struct Attachment {
    name: String,
    handle: AttachmentHandle,
    kind: AttachmentKind,
    lifetime: Lifetime,
    binding: Option<ResourceBinding>,
    initial_state: ResourceState,
    presentable: bool,
    first_use: Option<UseIndex>,
    last_use: Option<UseIndex>,
}

impl Attachment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle the client refers to this attachment by.
    pub fn handle(&self) -> AttachmentHandle {
        self.handle
    }

    pub fn kind(&self) -> &AttachmentKind {
        &self.kind
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn is_transient(&self) -> bool {
        self.lifetime == Lifetime::Transient
    }

    /// Backing resource; `None` for transients until the scheduler allocates them.
    pub fn binding(&self) -> Option<ResourceBinding> {
        self.binding
    }

    /// State before the first use of this frame.
    pub fn initial_state(&self) -> ResourceState {
        self.initial_state
    }

    /// Presentable attachments end the frame in the present layout.
    pub fn is_presentable(&self) -> bool {
        self.presentable
    }

    pub fn first_use(&self) -> Option<UseIndex> {
        self.first_use
    }

    pub fn last_use(&self) -> Option<UseIndex> {
        self.last_use
    }
}

/// One pass's use of one attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct PassAttachmentUse {
    pub attachment: AttachmentId,
    pub pass: PassHandle,
    pub queue: QueueType,
    pub usage: AttachmentUsage,
    pub access: Access,
    pub stages: PipelineStage,
    pub range: SubresourceRange,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    prev: Option<UseIndex>,
    next: Option<UseIndex>,
}

impl PassAttachmentUse {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        attachment: AttachmentId,
        pass: PassHandle,
        queue: QueueType,
        usage: AttachmentUsage,
        access: Access,
        stages: PipelineStage,
        range: SubresourceRange,
        load_op: LoadOp,
        store_op: StoreOp,
    ) -> Self {
        Self {
            attachment,
            pass,
            queue,
            usage,
            access,
            stages,
            range,
            load_op,
            store_op,
            prev: None,
            next: None,
        }
    }

    /// Previous use of the same attachment.
    pub fn prev(&self) -> Option<UseIndex> {
        self.prev
    }

    /// Next use of the same attachment.
    pub fn next(&self) -> Option<UseIndex> {
        self.next
    }

    /// State the attachment must be in during this use.
    pub fn state(&self) -> ResourceState {
        use_state(
            self.usage,
            self.access,
            self.stages,
            matches!(self.range, SubresourceRange::Image(_)),
        )
    }

    /// Returns true if previous contents are irrelevant to this use.
    pub fn discards_contents(&self) -> bool {
        !self.access.reads() || matches!(self.load_op, LoadOp::Clear(_) | LoadOp::DontCare)
    }
}

/// Attachments and their use timelines for one render graph.
#[derive(Debug)]
pub struct AttachmentRegistry {
    generation: u32,
    attachments: Vec<Attachment>,
    uses: Vec<PassAttachmentUse>,
    persistent: HashMap<AttachmentHandle, AttachmentId>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self {
            generation: next_generation(),
            attachments: Vec::new(),
            uses: Vec::new(),
            persistent: HashMap::new(),
        }
    }

    /// Register a graph-scoped attachment.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: AttachmentKind,
        lifetime: Lifetime,
        binding: Option<ResourceBinding>,
        initial_state: ResourceState,
        presentable: bool,
    ) -> AttachmentHandle {
        let index = self.attachments.len() as u32;
        let handle = AttachmentHandle::new(index, HandleScope::Graph(self.generation));
        self.attachments.push(Attachment {
            name: name.into(),
            handle,
            kind,
            lifetime,
            binding,
            initial_state,
            presentable,
            first_use: None,
            last_use: None,
        });
        handle
    }

    /// Mirror a scheduler-registered persistent resource into this graph.
    pub(crate) fn add_persistent(
        &mut self,
        handle: AttachmentHandle,
        name: impl Into<String>,
        kind: AttachmentKind,
        binding: ResourceBinding,
        initial_state: ResourceState,
    ) -> AttachmentId {
        let id = AttachmentId(self.attachments.len() as u32);
        self.attachments.push(Attachment {
            name: name.into(),
            handle,
            kind,
            lifetime: Lifetime::Persistent,
            binding: Some(binding),
            initial_state,
            presentable: false,
            first_use: None,
            last_use: None,
        });
        self.persistent.insert(handle, id);
        id
    }

    /// Translate a client handle into a graph-local id.
    pub fn resolve(&self, handle: AttachmentHandle) -> Result<AttachmentId, ValidationError> {
        match handle.scope() {
            HandleScope::Graph(generation) => {
                if generation == self.generation
                    && (handle.index() as usize) < self.attachments.len()
                {
                    Ok(AttachmentId(handle.index()))
                } else {
                    Err(ValidationError::UnknownAttachment(handle))
                }
            }
            HandleScope::Persistent(_) => self
                .persistent
                .get(&handle)
                .copied()
                .ok_or(ValidationError::UnknownAttachment(handle)),
        }
    }

    pub fn attachment(&self, id: AttachmentId) -> &Attachment {
        &self.attachments[id.index()]
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Ids of all attachments, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = AttachmentId> + '_ {
        (0..self.attachments.len() as u32).map(AttachmentId)
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Append a use to its attachment's timeline.
    pub(crate) fn push_use(&mut self, mut attachment_use: PassAttachmentUse) -> UseIndex {
        let index = UseIndex(self.uses.len() as u32);
        let attachment = &mut self.attachments[attachment_use.attachment.index()];

        attachment_use.prev = attachment.last_use;
        attachment_use.next = None;
        if let Some(prev) = attachment.last_use {
            self.uses[prev.index()].next = Some(index);
        }
        if attachment.first_use.is_none() {
            attachment.first_use = Some(index);
        }
        attachment.last_use = Some(index);

        self.uses.push(attachment_use);
        index
    }

    pub fn use_at(&self, index: UseIndex) -> &PassAttachmentUse {
        &self.uses[index.index()]
    }

    /// All uses, in declaration order.
    pub fn uses(&self) -> &[PassAttachmentUse] {
        &self.uses
    }

    /// Uses of one attachment, following the timeline links.
    pub fn timeline(&self, id: AttachmentId) -> Timeline<'_> {
        Timeline {
            registry: self,
            cursor: self.attachment(id).first_use,
        }
    }

    /// Passes touching an attachment, in order, without duplicates.
    pub fn passes_using(&self, id: AttachmentId) -> Vec<PassHandle> {
        let mut passes: Vec<PassHandle> = Vec::new();
        for (_, attachment_use) in self.timeline(id) {
            if passes.last() != Some(&attachment_use.pass) {
                passes.push(attachment_use.pass);
            }
        }
        passes
    }

    /// Attach the backend resource allocated for a transient.
    pub(crate) fn bind(&mut self, id: AttachmentId, binding: ResourceBinding) {
        self.attachments[id.index()].binding = Some(binding);
    }
}

impl Default for AttachmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over an attachment's timeline.
pub struct Timeline<'a> {
    registry: &'a AttachmentRegistry,
    cursor: Option<UseIndex>,
}

impl<'a> Iterator for Timeline<'a> {
    type Item = (UseIndex, &'a PassAttachmentUse);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let attachment_use = self.registry.use_at(index);
        self.cursor = attachment_use.next;
        Some((index, attachment_use))
    }
}
