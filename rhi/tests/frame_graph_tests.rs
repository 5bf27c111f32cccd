//! Frame graph integration tests.
//!
//! These tests drive the [`FrameScheduler`] end to end on the dummy backend
//! and check what reaches the backend: resource creation, memory placement,
//! barriers, submissions and presents.
//!
//! # Test Categories
//!
//! - **Transient Memory Tests**: Allocation per transient, aliasing, block reuse
//! - **Synchronization Tests**: Cross-queue semaphores, frames in flight
//! - **Swapchain Tests**: Acquire, present and out-of-date surfaces
//! - **Failure Tests**: Out of memory, device loss, abandoned frames
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p redlilium-rhi --test frame_graph_tests
//! ```

mod common;

use std::thread;
use std::time::Duration;

use rstest::rstest;

use common::{FRAME_SIZE, MIB, TestContext, color_target, storage_buffer};
use redlilium_rhi::types::{AccessFlags, TextureLayout};
use redlilium_rhi::{
    AttachmentHandle, Backend, BackendEvent, DummyConfig, Extent2d, FrameState, LoadOp, QueueType,
    ResourceState, RhiError, StoreOp, TextureDescriptor, TextureFormat, TextureUsage,
    ValidationError,
};

/// Compute chain where pass `i` reads buffer `i - 1` and writes buffer `i`.
///
/// At most two buffers are alive at any point of the frame.
fn add_buffer_chain(ctx: &mut TestContext, count: usize, size: u64) -> Vec<AttachmentHandle> {
    let buffers: Vec<_> = (0..count)
        .map(|i| {
            ctx.scheduler
                .create_transient_buffer(storage_buffer(size, &format!("chain_{i}")))
                .unwrap()
        })
        .collect();

    for (i, &buffer) in buffers.iter().enumerate() {
        let previous = i.checked_sub(1).map(|p| buffers[p]);
        ctx.scheduler
            .add_pass(
                format!("step_{i}"),
                QueueType::Compute,
                move |builder| {
                    if let Some(previous) = previous {
                        builder.read_storage(previous)?;
                    }
                    builder.write_storage(buffer)?;
                    Ok(())
                },
                |(), ctx| {
                    ctx.backend().cmd_dispatch(ctx.command_list(), 1, 1, 1);
                    Ok(())
                },
            )
            .unwrap();
    }

    let last = buffers[count - 1];
    ctx.scheduler
        .add_pass(
            "consume",
            QueueType::Compute,
            move |builder| {
                builder.read_storage(last)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    buffers
}

// ============================================================================
// Transient Memory Tests
// ============================================================================

#[rstest]
#[case::single(1)]
#[case::few(3)]
#[case::many(8)]
fn test_every_transient_gets_memory(#[case] count: usize) {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    add_buffer_chain(&mut ctx, count, 64 * 1024);
    let stats = ctx.scheduler.end_frame().unwrap();

    assert_eq!(stats.placements.len(), count);
    let binds = ctx.count_events(|e| matches!(e, BackendEvent::BindBuffer { .. }));
    assert_eq!(binds, count);
    let creates = ctx.count_events(|e| matches!(e, BackendEvent::CreateBuffer(_)));
    assert_eq!(creates, count);
}

#[test]
fn test_overlapping_lifetimes_never_share_memory() {
    let mut ctx = TestContext::with_device_heap(8 * MIB, 2);
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let buffers = add_buffer_chain(&mut ctx, 3, 512 * 1024);
    let stats = ctx.scheduler.end_frame().unwrap();

    let placement = |index: usize| {
        let name = format!("chain_{index}");
        stats
            .placements
            .iter()
            .find(|p| p.name == name)
            .unwrap()
            .allocation
    };
    assert_eq!(buffers.len(), 3);

    // Neighbours are alive in the same pass.
    assert!(!placement(0).overlaps(&placement(1)));
    assert!(!placement(1).overlaps(&placement(2)));
    // chain_0 is released before chain_2 is first written.
    assert!(placement(0).overlaps(&placement(2)));
}

#[test]
fn test_released_memory_is_reused_within_one_block() {
    // 8 MiB heap: 1 MiB blocks, each holding two 512 KiB buffers.
    let mut ctx = TestContext::with_device_heap(8 * MIB, 1);
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    add_buffer_chain(&mut ctx, 4, 512 * 1024);
    let stats = ctx.scheduler.end_frame().unwrap();

    assert_eq!(stats.placements.len(), 4);
    assert_eq!(ctx.scheduler.transient_block_count(), 1);
    assert_eq!(ctx.scheduler.allocator(0).unwrap().total_block_bytes(), MIB);
    let allocations = ctx.count_events(|e| matches!(e, BackendEvent::AllocateMemory { .. }));
    assert_eq!(allocations, 1);
}

#[test]
fn test_blocks_survive_across_frames() {
    let mut ctx = TestContext::with_device_heap(8 * MIB, 1);
    for _ in 0..3 {
        ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
        add_buffer_chain(&mut ctx, 4, 512 * 1024);
        ctx.scheduler.end_frame().unwrap();
    }

    let allocations = ctx.count_events(|e| matches!(e, BackendEvent::AllocateMemory { .. }));
    assert_eq!(allocations, 1);
    // Resources of earlier frames were destroyed when their slot was reused.
    assert_eq!(ctx.backend.live_buffer_count(), 4);
    assert_eq!(ctx.scheduler.deferred_destroy_count(), 4);
}

#[test]
fn test_resize_releases_blocks() {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let target = ctx.scheduler.create_transient_image(color_target("hdr")).unwrap();
    ctx.scheduler
        .add_pass(
            "draw",
            QueueType::Graphics,
            move |builder| {
                builder.write_color(target, LoadOp::DontCare, StoreOp::Store)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    ctx.scheduler.end_frame().unwrap();
    assert_eq!(ctx.scheduler.transient_block_count(), 1);

    ctx.backend.take_events();
    ctx.scheduler.begin_frame(Extent2d::new(128, 96)).unwrap();

    assert_eq!(ctx.scheduler.transient_block_count(), 0);
    assert_eq!(ctx.backend.live_memory_count(), 0);
    assert_eq!(ctx.backend.live_image_count(), 0);
    assert!(ctx.count_events(|e| matches!(e, BackendEvent::WaitIdle)) >= 1);
    ctx.scheduler.abandon_frame().unwrap();
}

// ============================================================================
// Synchronization Tests
// ============================================================================

#[test]
fn test_cross_queue_dependency_uses_semaphore() {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let particles = ctx
        .scheduler
        .create_transient_buffer(storage_buffer(4096, "particles"))
        .unwrap();
    let target = ctx.scheduler.create_transient_image(color_target("scene")).unwrap();

    ctx.scheduler
        .add_pass(
            "simulate",
            QueueType::Compute,
            move |builder| {
                builder.write_storage(particles)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    ctx.scheduler
        .add_pass(
            "render",
            QueueType::Graphics,
            move |builder| {
                builder.read_storage(particles)?;
                builder.write_color(target, LoadOp::clear_color(0.0, 0.0, 0.0, 1.0), StoreOp::Store)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    let stats = ctx.scheduler.end_frame().unwrap();

    assert_eq!(stats.semaphore_count, 1);
    let submits = ctx.submits();
    assert_eq!(submits.len(), 2);
    assert_eq!(submits[0].queue, QueueType::Compute);
    assert_eq!(submits[1].queue, QueueType::Graphics);
    assert_eq!(submits[0].signals.len(), 1);
    assert_eq!(submits[1].waits, submits[0].signals);
    assert!(submits.iter().all(|s| s.has_fence));

    // Release on compute, acquire on graphics.
    let transfers = ctx
        .barriers()
        .into_iter()
        .filter(|b| b.queue_transfer.is_some())
        .count();
    assert_eq!(transfers, 2);
}

#[test]
fn test_double_begin_frame_leaves_fences_untouched() {
    let mut ctx = TestContext::with_backend(DummyConfig::default(), 1);
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    add_buffer_chain(&mut ctx, 1, 1024);
    ctx.scheduler.end_frame().unwrap();

    ctx.backend.take_events();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let waits = ctx.count_events(|e| matches!(e, BackendEvent::WaitFences(_)));
    assert_eq!(waits, 1);

    assert_eq!(
        ctx.scheduler.begin_frame(FRAME_SIZE),
        Err(ValidationError::FrameAlreadyBegun.into())
    );
    assert_eq!(
        ctx.count_events(|e| matches!(e, BackendEvent::WaitFences(_))),
        waits
    );
    assert_eq!(ctx.scheduler.state(), FrameState::FrameBegun);
}

#[test]
fn test_begin_frame_waits_for_slot_fences() {
    let config = DummyConfig::default().with_deferred_completion(true);
    let mut ctx = TestContext::with_backend(config, 2);

    for _ in 0..2 {
        ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
        add_buffer_chain(&mut ctx, 2, 1024);
        ctx.scheduler.end_frame().unwrap();
    }
    assert_eq!(ctx.backend.pending_fence_count(), 2);
    assert_eq!(ctx.scheduler.pending_frame_count(), 2);

    // Frame 2 reuses slot 0 and must block until the GPU catches up.
    let backend = ctx.backend.clone();
    let gpu = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        backend.complete_pending_work();
    });
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    gpu.join().unwrap();

    assert_eq!(ctx.backend.pending_fence_count(), 0);
    assert_eq!(ctx.scheduler.pending_frame_count(), 1);
    ctx.scheduler.end_frame().unwrap();
}

#[test]
fn test_persistent_state_carried_across_frames() {
    let mut ctx = TestContext::new();
    let desc = TextureDescriptor::new_2d(
        FRAME_SIZE.width,
        FRAME_SIZE.height,
        TextureFormat::Rgba16Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    );
    let image = ctx
        .backend
        .create_image(&desc, desc.size.resolve(FRAME_SIZE))
        .unwrap();
    let history = ctx
        .scheduler
        .register_image("history", image, desc, ResourceState::UNDEFINED);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    ctx.scheduler
        .add_pass(
            "accumulate",
            QueueType::Graphics,
            move |builder| {
                builder.write_color(history, LoadOp::DontCare, StoreOp::Store)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    ctx.scheduler.end_frame().unwrap();

    let state = ctx.scheduler.persistent_state(history).unwrap();
    assert_eq!(state.layout, TextureLayout::ColorAttachment);
    assert!(state.access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE));

    ctx.backend.take_events();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let target = ctx.scheduler.create_transient_image(color_target("resolve")).unwrap();
    ctx.scheduler
        .add_pass(
            "resolve",
            QueueType::Graphics,
            move |builder| {
                builder.read_texture(history)?;
                builder.write_color(target, LoadOp::DontCare, StoreOp::Store)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    ctx.scheduler.end_frame().unwrap();

    assert!(ctx.barriers().iter().any(|b| {
        b.src.layout == TextureLayout::ColorAttachment
            && b.dst.layout == TextureLayout::ShaderReadOnly
            && b.src.access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE)
    }));
    let state = ctx.scheduler.persistent_state(history).unwrap();
    assert_eq!(state.layout, TextureLayout::ShaderReadOnly);
}

/// One frame with a single pass using `particles` on `queue`.
fn use_particles(ctx: &mut TestContext, particles: AttachmentHandle, queue: QueueType, write: bool) {
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    ctx.scheduler
        .add_pass(
            if write { "simulate" } else { "draw_particles" },
            queue,
            move |builder| {
                if write {
                    builder.write_storage(particles)?;
                } else {
                    builder.read_storage(particles)?;
                }
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();
    ctx.scheduler.end_frame().unwrap();
}

#[test]
fn test_persistent_queue_change_orders_after_earlier_frame() {
    let config = DummyConfig::default().with_deferred_completion(true);
    let mut ctx = TestContext::with_backend(config, 2);
    let desc = storage_buffer(4096, "particles");
    let buffer = ctx.backend.create_buffer(&desc).unwrap();
    let particles = ctx
        .scheduler
        .register_buffer("particles", buffer, desc, ResourceState::UNDEFINED);

    use_particles(&mut ctx, particles, QueueType::Compute, true);
    ctx.backend.take_events();

    // Frame 0 is still running on the compute queue.
    use_particles(&mut ctx, particles, QueueType::Graphics, false);
    let submits = ctx.submits();
    assert_eq!(submits.len(), 2);

    let handoff = &submits[0];
    assert_eq!(handoff.queue, QueueType::Compute);
    assert_eq!(handoff.list_count, 0);
    assert_eq!(handoff.signals.len(), 1);
    assert!(!handoff.has_fence);

    let draw = &submits[1];
    assert_eq!(draw.queue, QueueType::Graphics);
    assert_eq!(draw.waits, handoff.signals);
    assert!(draw.has_fence);
}

#[test]
fn test_persistent_queue_change_after_idle_needs_no_handoff() {
    let config = DummyConfig::default().with_deferred_completion(true);
    let mut ctx = TestContext::with_backend(config, 2);
    let desc = storage_buffer(4096, "particles");
    let buffer = ctx.backend.create_buffer(&desc).unwrap();
    let particles = ctx
        .scheduler
        .register_buffer("particles", buffer, desc, ResourceState::UNDEFINED);

    use_particles(&mut ctx, particles, QueueType::Compute, true);
    // Same queue again: submission order is enough.
    ctx.backend.take_events();
    use_particles(&mut ctx, particles, QueueType::Compute, false);
    assert!(ctx.submits().iter().all(|submit| submit.waits.is_empty()));

    ctx.scheduler.wait_idle().unwrap();
    ctx.backend.take_events();
    use_particles(&mut ctx, particles, QueueType::Graphics, false);
    let submits = ctx.submits();
    assert_eq!(submits.len(), 1);
    assert!(submits[0].waits.is_empty());
}

// ============================================================================
// Swapchain Tests
// ============================================================================

fn draw_to(ctx: &mut TestContext, backbuffer: AttachmentHandle) {
    ctx.scheduler
        .add_pass(
            "main",
            QueueType::Graphics,
            move |builder| {
                builder.write_color(backbuffer, LoadOp::clear_color(0.1, 0.2, 0.3, 1.0), StoreOp::Store)?;
                Ok(())
            },
            |(), ctx| {
                ctx.backend().cmd_draw(ctx.command_list(), 3, 1);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_swapchain_acquire_submit_present() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(2);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let backbuffer = ctx.scheduler.import_swapchain(swapchain).unwrap();
    assert_eq!(
        ctx.scheduler.import_swapchain(swapchain),
        Err(ValidationError::SwapchainAlreadyImported.into())
    );
    draw_to(&mut ctx, backbuffer);
    let stats = ctx.scheduler.end_frame().unwrap();
    assert!(stats.presented);

    let events = ctx.backend.events();
    let acquire_semaphore = events
        .iter()
        .find_map(|e| match e {
            BackendEvent::Acquire { signal, .. } => Some(*signal),
            _ => None,
        })
        .unwrap();
    let present_waits = events
        .iter()
        .find_map(|e| match e {
            BackendEvent::Present { waits, .. } => Some(waits.clone()),
            _ => None,
        })
        .unwrap();

    let submits = ctx.submits();
    assert_eq!(submits.len(), 1);
    assert!(submits[0].waits.contains(&acquire_semaphore));
    assert_eq!(submits[0].signals, present_waits);

    let barriers = ctx.barriers();
    assert!(barriers.iter().any(|b| {
        b.src.layout == TextureLayout::Undefined && b.dst.layout == TextureLayout::ColorAttachment
    }));
    assert!(barriers.iter().any(|b| {
        b.src.layout == TextureLayout::ColorAttachment && b.dst.layout == TextureLayout::PresentSrc
    }));
}

#[test]
fn test_swapchain_image_layout_remembered() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(1);

    for _ in 0..2 {
        ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
        let backbuffer = ctx.scheduler.import_swapchain(swapchain).unwrap();
        draw_to(&mut ctx, backbuffer);
        ctx.scheduler.end_frame().unwrap();
    }

    let from_present = ctx
        .barriers()
        .into_iter()
        .filter(|b| {
            b.src.layout == TextureLayout::PresentSrc
                && b.dst.layout == TextureLayout::ColorAttachment
        })
        .count();
    assert_eq!(from_present, 1);
}

#[test]
fn test_out_of_date_acquire_keeps_frame_open() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(2);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    ctx.backend.fail_next_acquire();
    let err = ctx.scheduler.import_swapchain(swapchain).unwrap_err();
    assert_eq!(err, RhiError::SurfaceOutOfDate);
    assert!(err.is_recoverable());
    assert_eq!(ctx.scheduler.state(), FrameState::FrameBegun);

    ctx.scheduler.abandon_frame().unwrap();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let backbuffer = ctx.scheduler.import_swapchain(swapchain).unwrap();
    draw_to(&mut ctx, backbuffer);
    assert!(ctx.scheduler.end_frame().unwrap().presented);
}

#[test]
fn test_out_of_date_present_reported_after_submit() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(2);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let backbuffer = ctx.scheduler.import_swapchain(swapchain).unwrap();
    draw_to(&mut ctx, backbuffer);
    ctx.backend.fail_next_present();

    assert_eq!(ctx.scheduler.end_frame(), Err(RhiError::SurfaceOutOfDate));
    assert_eq!(ctx.submits().len(), 1);
    assert_eq!(ctx.scheduler.state(), FrameState::Idle);
    assert_eq!(ctx.scheduler.frame_index(), 1);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    ctx.scheduler.end_frame().unwrap();
}

#[test]
fn test_unused_swapchain_image_rejected() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(2);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    ctx.scheduler.import_swapchain(swapchain).unwrap();
    let live_semaphores = ctx.backend.live_semaphore_count();

    assert!(matches!(
        ctx.scheduler.end_frame(),
        Err(RhiError::Validation(ValidationError::UnusedPresentable { .. }))
    ));
    assert!(ctx.submits().is_empty());
    assert_eq!(ctx.scheduler.state(), FrameState::Idle);

    // The acquire semaphore outlives the frame until the device is idle.
    assert_eq!(ctx.backend.live_semaphore_count(), live_semaphores);
    ctx.scheduler.wait_idle().unwrap();
    assert_eq!(ctx.backend.live_semaphore_count(), live_semaphores - 1);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_out_of_memory_is_atomic() {
    let mut ctx = TestContext::with_device_heap(8 * MIB, 2);
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let small = ctx
        .scheduler
        .create_transient_buffer(storage_buffer(1024, "small"))
        .unwrap();
    let huge = ctx
        .scheduler
        .create_transient_buffer(storage_buffer(16 * MIB, "huge"))
        .unwrap();
    ctx.scheduler
        .add_pass(
            "fill",
            QueueType::Compute,
            move |builder| {
                builder.write_storage(small)?;
                builder.write_storage(huge)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();

    let err = ctx.scheduler.end_frame().unwrap_err();
    assert!(matches!(err, RhiError::OutOfMemory { .. }));
    assert!(ctx.submits().is_empty());
    assert_eq!(ctx.backend.live_buffer_count(), 0);
    assert_eq!(ctx.scheduler.state(), FrameState::Idle);
    assert_eq!(ctx.scheduler.frame_index(), 0);

    // The scheduler is still usable.
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    add_buffer_chain(&mut ctx, 2, 1024);
    ctx.scheduler.end_frame().unwrap();
}

#[test]
fn test_oversized_buffer_reports_out_of_memory() {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let huge = ctx
        .scheduler
        .create_transient_buffer(storage_buffer(u64::MAX - 4, "huge"))
        .unwrap();
    ctx.scheduler
        .add_pass(
            "fill",
            QueueType::Compute,
            move |builder| {
                builder.write_storage(huge)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();

    let err = ctx.scheduler.end_frame().unwrap_err();
    assert!(matches!(err, RhiError::OutOfMemory { .. }));
    assert!(ctx.submits().is_empty());
    assert_eq!(ctx.backend.live_memory_count(), 0);
    assert_eq!(ctx.scheduler.state(), FrameState::Idle);
}

#[test]
fn test_device_loss_is_fatal() {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    add_buffer_chain(&mut ctx, 1, 1024);
    ctx.backend.fail_next_submit();

    let err = ctx.scheduler.end_frame().unwrap_err();
    assert_eq!(err, RhiError::DeviceLost);
    assert!(err.is_fatal_to_scheduler());
    assert_eq!(ctx.scheduler.state(), FrameState::Lost);
    assert_eq!(
        ctx.scheduler.begin_frame(FRAME_SIZE),
        Err(RhiError::DeviceLost)
    );
    assert_eq!(ctx.scheduler.wait_idle(), Err(RhiError::DeviceLost));
}

#[test]
fn test_abandon_frame_submits_nothing() {
    let mut ctx = TestContext::new();
    let swapchain = ctx.create_swapchain(2);

    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let backbuffer = ctx.scheduler.import_swapchain(swapchain).unwrap();
    draw_to(&mut ctx, backbuffer);
    add_buffer_chain(&mut ctx, 2, 1024);
    ctx.scheduler.abandon_frame().unwrap();

    assert!(ctx.submits().is_empty());
    assert_eq!(
        ctx.count_events(|e| matches!(e, BackendEvent::Present { .. })),
        0
    );
    assert_eq!(ctx.scheduler.state(), FrameState::Idle);
    assert_eq!(ctx.scheduler.frame_index(), 0);
    assert_eq!(
        ctx.scheduler.abandon_frame(),
        Err(ValidationError::FrameNotBegun.into())
    );

    // Handles of the abandoned frame are not valid in the next one.
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let stale = ctx.scheduler.add_pass(
        "stale",
        QueueType::Graphics,
        move |builder| {
            builder.read_texture(backbuffer)?;
            Ok(())
        },
        |(), _ctx| Ok(()),
    );
    assert_eq!(
        stale,
        Err(ValidationError::UnknownAttachment(backbuffer).into())
    );
    ctx.scheduler.end_frame().unwrap();
}

#[test]
fn test_transient_read_before_write_rejected() {
    let mut ctx = TestContext::new();
    ctx.scheduler.begin_frame(FRAME_SIZE).unwrap();
    let buffer = ctx
        .scheduler
        .create_transient_buffer(storage_buffer(1024, "uninitialized"))
        .unwrap();
    ctx.scheduler
        .add_pass(
            "read",
            QueueType::Compute,
            move |builder| {
                builder.read_storage(buffer)?;
                Ok(())
            },
            |(), _ctx| Ok(()),
        )
        .unwrap();

    assert!(matches!(
        ctx.scheduler.end_frame(),
        Err(RhiError::Validation(ValidationError::ReadBeforeWrite { .. }))
    ));
    assert_eq!(ctx.backend.live_buffer_count(), 0);
    assert_eq!(
        ctx.count_events(|e| matches!(e, BackendEvent::CreateBuffer(_))),
        0
    );
}
