//! Render graph compilation.
//!
//! This module turns a [`RenderGraph`] into an execution plan
//! ([`CompiledGraph`]). Compilation walks the passes in declaration order and
//! performs:
//!
//! 1. **Barrier placement** - every pair of consecutive uses on an
//!    attachment's timeline gets a transition, unless both are identical
//!    reads on the same queue.
//! 2. **Queue ownership** - a pair spanning two queues becomes a release
//!    barrier after the producer and an acquire barrier before the consumer.
//! 3. **Semaphores** - one edge per cross-queue producer/consumer pair that is
//!    not already ordered by an earlier edge.
//! 4. **Batching** - consecutive passes of a queue are grouped into
//!    submissions, split wherever a semaphore is waited on or signaled.
//! 5. **Lifetimes** - every transient attachment gets the first pass at which
//!    its memory may be handed to another transient.
//!
//! Barriers are tracked per sub-resource: uses that declare disjoint mip,
//! layer or byte ranges never synchronize with each other. Uses without an
//! explicit range cover the whole resource.
//!
//! # Example
//!
//! ```ignore
//! let compiled = graph.compile()?;
//! for submission in compiled.submissions() {
//!     for &pass in &submission.passes {
//!         let before = compiled.barriers_before(pass);
//!         // record barriers, then the pass
//!     }
//! }
//! ```

mod tracking;

use std::collections::HashMap;

use fixedbitset::FixedBitSet;

use crate::error::{Result, ValidationError};
use crate::graph::{
    AttachmentId, AttachmentRegistry, Lifetime, PassAttachmentUse, PassHandle, RenderGraph,
};
use crate::types::{
    AccessFlags, PipelineStage, QueueTransfer, QueueType, ResourceState, SubresourceRange,
    TextureLayout,
};

use tracking::SubresourceTracker;

/// Where a barrier is recorded relative to its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierPlacement {
    BeforePass,
    AfterPass,
}

/// A state transition of one attachment range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Barrier {
    pub attachment: AttachmentId,
    /// Pass whose command list records the barrier.
    pub pass: PassHandle,
    pub placement: BarrierPlacement,
    /// Queue executing the barrier.
    pub queue: QueueType,
    pub range: SubresourceRange,
    pub src: ResourceState,
    pub dst: ResourceState,
    /// Set on both halves of a queue ownership transfer.
    pub queue_transfer: Option<QueueTransfer>,
}

impl Barrier {
    /// Check if this barrier changes the image layout.
    pub fn is_layout_transition(&self) -> bool {
        self.src.layout != self.dst.layout
    }

    /// Returns true for the producer half of an ownership transfer.
    pub fn is_release(&self) -> bool {
        self.queue_transfer.is_some() && self.placement == BarrierPlacement::AfterPass
    }

    /// Returns true for the consumer half of an ownership transfer.
    pub fn is_acquire(&self) -> bool {
        self.queue_transfer.is_some() && self.placement == BarrierPlacement::BeforePass
    }
}

/// Cross-queue dependency between two passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreEdge {
    pub producer: PassHandle,
    pub consumer: PassHandle,
    pub src_queue: QueueType,
    pub dst_queue: QueueType,
    /// Stages of the consumer that wait.
    pub wait_stages: PipelineStage,
}

/// Semaphore referenced by a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreSlot {
    /// Index into [`CompiledGraph::semaphore_edges`].
    Edge(usize),
    /// Signaled when the presentable image of the attachment is acquired.
    SwapchainAcquired(AttachmentId),
    /// Signaled when rendering to the presentable attachment is finished.
    PresentReady(AttachmentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionWait {
    pub semaphore: SemaphoreSlot,
    pub stages: PipelineStage,
}

/// A batch of consecutive passes submitted to one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub queue: QueueType,
    pub passes: Vec<PassHandle>,
    pub waits: Vec<SubmissionWait>,
    pub signals: Vec<SemaphoreSlot>,
    /// Set on the last submission of each queue; signals the frame fence.
    pub signal_fence: bool,
}

impl Submission {
    fn new(queue: QueueType) -> Self {
        Self {
            queue,
            passes: Vec::new(),
            waits: Vec::new(),
            signals: Vec::new(),
            signal_fence: false,
        }
    }
}

/// Memory lifetime of a transient attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceLifetime {
    pub attachment: AttachmentId,
    /// `None` if no pass uses the attachment.
    pub first_pass: Option<PassHandle>,
    pub last_pass: Option<PassHandle>,
    /// First pass whose resources may reuse this memory.
    ///
    /// Every pass using the attachment happens before this pass and every
    /// pass after it. `None` keeps the memory until the end of the frame.
    pub release_before: Option<PassHandle>,
}

/// State a persistent attachment is left in at the end of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalState {
    pub attachment: AttachmentId,
    pub state: ResourceState,
}

/// Presentation of a presentable attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentInfo {
    pub attachment: AttachmentId,
    /// Queue of the last use; presents from here.
    pub queue: QueueType,
    pub pass: PassHandle,
}

/// A compiled render graph ready for execution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    before: Vec<Vec<Barrier>>,
    after: Vec<Vec<Barrier>>,
    semaphore_edges: Vec<SemaphoreEdge>,
    submissions: Vec<Submission>,
    lifetimes: Vec<ResourceLifetime>,
    final_states: Vec<FinalState>,
    presents: Vec<PresentInfo>,
}

impl CompiledGraph {
    pub fn pass_count(&self) -> usize {
        self.before.len()
    }

    /// Barriers recorded before a pass.
    pub fn barriers_before(&self, pass: PassHandle) -> &[Barrier] {
        self.before
            .get(pass.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Barriers recorded after a pass.
    pub fn barriers_after(&self, pass: PassHandle) -> &[Barrier] {
        self.after
            .get(pass.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All barriers in recording order.
    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> {
        self.before
            .iter()
            .zip(&self.after)
            .flat_map(|(before, after)| before.iter().chain(after))
    }

    pub fn barrier_count(&self) -> usize {
        self.before.iter().chain(&self.after).map(Vec::len).sum()
    }

    pub fn semaphore_edges(&self) -> &[SemaphoreEdge] {
        &self.semaphore_edges
    }

    /// Submissions in the order they must be submitted.
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// Lifetimes of transient attachments, in creation order.
    pub fn lifetimes(&self) -> &[ResourceLifetime] {
        &self.lifetimes
    }

    pub fn lifetime(&self, attachment: AttachmentId) -> Option<&ResourceLifetime> {
        self.lifetimes.iter().find(|l| l.attachment == attachment)
    }

    /// End-of-frame states of persistent attachments that were used.
    pub fn final_states(&self) -> &[FinalState] {
        &self.final_states
    }

    pub fn presents(&self) -> &[PresentInfo] {
        &self.presents
    }
}

/// Compile a render graph.
///
/// # Errors
///
/// - [`ValidationError::ReadBeforeWrite`] if a transient range is read before
///   any use writes it
/// - [`ValidationError::UnusedPresentable`] if a presentable attachment has
///   no uses
pub fn compile(graph: &RenderGraph) -> Result<CompiledGraph> {
    profile_function!();

    let mut compiler = Compiler::new(graph);
    let trackers = compiler.link_uses()?;
    let (final_states, presents) = compiler.resolve_tails(&trackers)?;
    let lifetimes = compiler.lifetimes();
    let submissions = compiler.build_submissions();

    let compiled = CompiledGraph {
        before: compiler.before,
        after: compiler.after,
        semaphore_edges: compiler.edges,
        submissions,
        lifetimes,
        final_states,
        presents,
    };

    log::debug!(
        "Compiled render graph: {} passes, {} barriers, {} semaphores, {} submissions",
        compiled.pass_count(),
        compiled.barrier_count(),
        compiled.semaphore_edges.len(),
        compiled.submissions.len()
    );
    Ok(compiled)
}

struct Compiler<'g> {
    graph: &'g RenderGraph,
    registry: &'g AttachmentRegistry,
    before: Vec<Vec<Barrier>>,
    after: Vec<Vec<Barrier>>,
    edges: Vec<SemaphoreEdge>,
    edge_lookup: HashMap<(PassHandle, PassHandle), usize>,
    /// `reach[p]`: passes guaranteed to complete before pass `p` starts, plus `p`.
    reach: Vec<FixedBitSet>,
    /// First use of each presentable image and the stages that wait for it.
    acquire_waits: Vec<(PassHandle, AttachmentId, PipelineStage)>,
    present_signals: Vec<(PassHandle, AttachmentId)>,
}

impl<'g> Compiler<'g> {
    fn new(graph: &'g RenderGraph) -> Self {
        let pass_count = graph.pass_count();
        Self {
            graph,
            registry: graph.registry(),
            before: vec![Vec::new(); pass_count],
            after: vec![Vec::new(); pass_count],
            edges: Vec::new(),
            edge_lookup: HashMap::new(),
            reach: Vec::with_capacity(pass_count),
            acquire_waits: Vec::new(),
            present_signals: Vec::new(),
        }
    }

    /// Walk all uses in declaration order, emitting barriers and edges.
    fn link_uses(&mut self) -> Result<Vec<SubresourceTracker>> {
        let registry = self.registry;
        let pass_count = self.graph.pass_count();
        let mut trackers: Vec<SubresourceTracker> = registry
            .attachments()
            .iter()
            .map(|attachment| SubresourceTracker::new(attachment.kind()))
            .collect();
        let mut last_on_queue: [Option<PassHandle>; QueueType::COUNT] = [None; QueueType::COUNT];

        for (index, pass) in self.graph.passes().iter().enumerate() {
            let handle = PassHandle::new(index as u32);
            let queue_slot = &mut last_on_queue[pass.queue().index()];
            let mut reach = match *queue_slot {
                Some(prev) => self.reach[prev.index()].clone(),
                None => FixedBitSet::with_capacity(pass_count),
            };
            reach.insert(index);
            self.reach.push(reach);
            *queue_slot = Some(handle);

            for &use_index in pass.uses() {
                let next = registry.use_at(use_index);
                let regions =
                    trackers[next.attachment.index()].advance(&next.range, use_index);
                for (prev, range) in regions {
                    match prev {
                        None => self.link_head(next, range)?,
                        Some(prev) => self.link_pair(registry.use_at(prev), next, range),
                    }
                }
            }
        }
        Ok(trackers)
    }

    /// First use of a range this frame.
    fn link_head(&mut self, next: &PassAttachmentUse, range: SubresourceRange) -> Result<()> {
        let attachment = self.registry.attachment(next.attachment);
        let dst = next.state();

        let src = match attachment.lifetime() {
            Lifetime::Transient => {
                if !next.access.writes() {
                    return Err(ValidationError::ReadBeforeWrite {
                        attachment: attachment.name().to_owned(),
                        pass: self.graph.pass(next.pass).name().to_owned(),
                    }
                    .into());
                }
                // Waits on everything previously placed in aliased memory.
                ResourceState::new(
                    TextureLayout::Undefined,
                    AccessFlags::empty(),
                    PipelineStage::ALL_COMMANDS,
                )
            }
            Lifetime::Persistent => {
                let mut initial = attachment.initial_state();
                if attachment.is_presentable() {
                    if !self
                        .acquire_waits
                        .iter()
                        .any(|&(_, id, _)| id == next.attachment)
                    {
                        self.acquire_waits.push((next.pass, next.attachment, dst.stages));
                    }
                    // Chains with the acquire semaphore wait.
                    initial.stages = dst.stages;
                }

                let unchanged_read = initial == dst && !dst.is_write();
                let resting = initial.layout == dst.layout && initial.access.is_empty();
                if unchanged_read || resting {
                    return Ok(());
                }
                initial
            }
        };

        self.push(Barrier {
            attachment: next.attachment,
            pass: next.pass,
            placement: BarrierPlacement::BeforePass,
            queue: next.queue,
            range,
            src,
            dst,
            queue_transfer: None,
        });
        Ok(())
    }

    /// Consecutive uses of the same range.
    fn link_pair(
        &mut self,
        prev: &PassAttachmentUse,
        next: &PassAttachmentUse,
        range: SubresourceRange,
    ) {
        let src = prev.state();
        let dst = next.state();

        if prev.queue == next.queue {
            if src == dst && !prev.access.writes() && !next.access.writes() {
                return;
            }
            self.push(Barrier {
                attachment: next.attachment,
                pass: next.pass,
                placement: BarrierPlacement::BeforePass,
                queue: next.queue,
                range,
                src,
                dst,
                queue_transfer: None,
            });
            return;
        }

        let transfer = QueueTransfer {
            src: prev.queue,
            dst: next.queue,
        };
        self.push(Barrier {
            attachment: next.attachment,
            pass: prev.pass,
            placement: BarrierPlacement::AfterPass,
            queue: prev.queue,
            range,
            src,
            dst: ResourceState::new(dst.layout, AccessFlags::empty(), PipelineStage::BOTTOM_OF_PIPE),
            queue_transfer: Some(transfer),
        });
        self.push(Barrier {
            attachment: next.attachment,
            pass: next.pass,
            placement: BarrierPlacement::BeforePass,
            queue: next.queue,
            range,
            src: ResourceState::new(src.layout, AccessFlags::empty(), PipelineStage::TOP_OF_PIPE),
            dst,
            queue_transfer: Some(transfer),
        });
        self.add_edge(prev, next);
    }

    fn add_edge(&mut self, prev: &PassAttachmentUse, next: &PassAttachmentUse) {
        let key = (prev.pass, next.pass);
        if let Some(&index) = self.edge_lookup.get(&key) {
            self.edges[index].wait_stages |= next.stages;
            return;
        }
        if self.reach[next.pass.index()].contains(prev.pass.index()) {
            log::trace!(
                "Pass {} already ordered after pass {}, no semaphore",
                next.pass.index(),
                prev.pass.index()
            );
            return;
        }

        self.edge_lookup.insert(key, self.edges.len());
        self.edges.push(SemaphoreEdge {
            producer: prev.pass,
            consumer: next.pass,
            src_queue: prev.queue,
            dst_queue: next.queue,
            wait_stages: next.stages,
        });
        let producer_reach = self.reach[prev.pass.index()].clone();
        self.reach[next.pass.index()].union_with(&producer_reach);
    }

    fn push(&mut self, barrier: Barrier) {
        log::trace!(
            "Barrier {:?} pass {} attachment {}: {:?} -> {:?}",
            barrier.placement,
            barrier.pass.index(),
            barrier.attachment.index(),
            barrier.src.layout,
            barrier.dst.layout
        );
        let list = match barrier.placement {
            BarrierPlacement::BeforePass => &mut self.before[barrier.pass.index()],
            BarrierPlacement::AfterPass => &mut self.after[barrier.pass.index()],
        };
        list.push(barrier);
    }

    /// Present transitions and end-of-frame states of persistent attachments.
    fn resolve_tails(
        &mut self,
        trackers: &[SubresourceTracker],
    ) -> Result<(Vec<FinalState>, Vec<PresentInfo>)> {
        let registry = self.registry;
        let mut final_states = Vec::new();
        let mut presents = Vec::new();

        for id in registry.ids() {
            let attachment = registry.attachment(id);
            if attachment.is_transient() {
                continue;
            }
            let Some(last_use) = attachment.last_use() else {
                if attachment.is_presentable() {
                    return Err(ValidationError::UnusedPresentable {
                        attachment: attachment.name().to_owned(),
                    }
                    .into());
                }
                continue;
            };
            let last = registry.use_at(last_use);
            let regions = trackers[id.index()].regions();

            if attachment.is_presentable() {
                for (owner, range) in regions {
                    let Some(owner) = owner else { continue };
                    let owner = registry.use_at(owner);
                    let src = owner.state();
                    if src != ResourceState::PRESENT {
                        self.push(Barrier {
                            attachment: id,
                            pass: owner.pass,
                            placement: BarrierPlacement::AfterPass,
                            queue: owner.queue,
                            range,
                            src,
                            dst: ResourceState::PRESENT,
                            queue_transfer: None,
                        });
                    }
                }
                self.present_signals.push((last.pass, id));
                presents.push(PresentInfo {
                    attachment: id,
                    queue: last.queue,
                    pass: last.pass,
                });
                final_states.push(FinalState {
                    attachment: id,
                    state: ResourceState::PRESENT,
                });
                continue;
            }

            // Leave every range in the layout of the last use.
            let layout = last.state().layout;
            let mut access = AccessFlags::empty();
            let mut stages = PipelineStage::empty();
            for (owner, range) in regions {
                let (pass, queue, src) = match owner {
                    Some(owner) => {
                        let owner = registry.use_at(owner);
                        (owner.pass, owner.queue, owner.state())
                    }
                    None => (last.pass, last.queue, attachment.initial_state()),
                };
                access |= src.access;
                stages |= src.stages;
                if src.layout != layout {
                    self.push(Barrier {
                        attachment: id,
                        pass,
                        placement: BarrierPlacement::AfterPass,
                        queue,
                        range,
                        src,
                        dst: ResourceState::new(
                            layout,
                            AccessFlags::empty(),
                            PipelineStage::BOTTOM_OF_PIPE,
                        ),
                        queue_transfer: None,
                    });
                }
            }
            final_states.push(FinalState {
                attachment: id,
                state: ResourceState::new(layout, access, stages),
            });
        }
        Ok((final_states, presents))
    }

    /// Release points of transient attachments.
    ///
    /// `common[i]` holds the passes that happen before every pass from `i`
    /// on. Memory of a transient may be reused from the first pass `i` after
    /// its last use for which all of its passes are in `common[i]`.
    fn lifetimes(&self) -> Vec<ResourceLifetime> {
        let registry = self.registry;
        let pass_count = self.graph.pass_count();

        let mut common: Vec<FixedBitSet> = Vec::with_capacity(pass_count);
        for reach in self.reach.iter().rev() {
            let mut set = reach.clone();
            if let Some(later) = common.last() {
                set.intersect_with(later);
            }
            common.push(set);
        }
        common.reverse();

        registry
            .ids()
            .filter(|&id| registry.attachment(id).is_transient())
            .map(|id| {
                let passes = registry.passes_using(id);
                let first_pass = passes.first().copied();
                let last_pass = passes.last().copied();

                let release_before = last_pass.and_then(|last| {
                    let mut used = FixedBitSet::with_capacity(pass_count);
                    for pass in &passes {
                        used.insert(pass.index());
                    }
                    (last.index() + 1..pass_count)
                        .find(|&i| used.is_subset(&common[i]))
                        .map(|i| PassHandle::new(i as u32))
                });

                ResourceLifetime {
                    attachment: id,
                    first_pass,
                    last_pass,
                    release_before,
                }
            })
            .collect()
    }

    /// Group passes into per-queue submissions.
    ///
    /// A pass that waits on a semaphore starts a new submission; a pass that
    /// signals one ends its submission. Submissions are ordered by their first
    /// pass, so every semaphore is submitted for signaling before it is waited on.
    fn build_submissions(&self) -> Vec<Submission> {
        let mut open: [Option<Submission>; QueueType::COUNT] = std::array::from_fn(|_| None);
        let mut closed: Vec<Submission> = Vec::new();

        for (index, pass) in self.graph.passes().iter().enumerate() {
            let handle = PassHandle::new(index as u32);
            let queue = pass.queue();

            let mut waits: Vec<SubmissionWait> = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, edge)| edge.consumer == handle)
                .map(|(i, edge)| SubmissionWait {
                    semaphore: SemaphoreSlot::Edge(i),
                    stages: edge.wait_stages,
                })
                .collect();
            waits.extend(
                self.acquire_waits
                    .iter()
                    .filter(|&&(pass, _, _)| pass == handle)
                    .map(|&(_, attachment, stages)| SubmissionWait {
                        semaphore: SemaphoreSlot::SwapchainAcquired(attachment),
                        stages,
                    }),
            );

            let mut signals: Vec<SemaphoreSlot> = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, edge)| edge.producer == handle)
                .map(|(i, _)| SemaphoreSlot::Edge(i))
                .collect();
            signals.extend(
                self.present_signals
                    .iter()
                    .filter(|&&(pass, _)| pass == handle)
                    .map(|&(_, attachment)| SemaphoreSlot::PresentReady(attachment)),
            );

            let slot = &mut open[queue.index()];
            if !waits.is_empty()
                && let Some(batch) = slot.take()
            {
                closed.push(batch);
            }
            let ends_batch = !signals.is_empty();
            let batch = slot.get_or_insert_with(|| Submission::new(queue));
            batch.passes.push(handle);
            batch.waits.extend(waits);
            batch.signals.extend(signals);
            if ends_batch && let Some(batch) = slot.take() {
                closed.push(batch);
            }
        }

        closed.extend(open.into_iter().flatten());
        closed.sort_by_key(|submission| submission.passes.first().copied());
        for queue in QueueType::ALL {
            if let Some(last) = closed.iter_mut().rev().find(|s| s.queue == queue) {
                last.signal_fence = true;
            }
        }
        closed
    }
}
