//! Integration tests for context pooling, barrier batching and submission.
//!
//! Everything runs against the dummy backend, whose queues record each
//! submission so tests can inspect what reached the "GPU".
//!
//! ```bash
//! cargo test -p redlilium-commands --test context_tests
//! ```

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use rstest::rstest;

use common::{TestContext, barrier_batches, buffer};
use redlilium_commands::backend::dummy::{DummyDevice, RecordedCommand};
use redlilium_commands::{
    BarrierMode, ContextState, FenceValue, GpuResource, PipelineKind, PipelineState, Queue,
    QueueType, RawPipeline, RecordingConfig, RecordingError, ResourceStates, SubresourceData,
};

// ============================================================================
// Queue State Legality
// ============================================================================

#[rstest]
#[case::graphics_render_target(QueueType::Graphics, ResourceStates::RENDER_TARGET, true)]
#[case::graphics_present(QueueType::Graphics, ResourceStates::PRESENT, true)]
#[case::compute_uav(QueueType::Compute, ResourceStates::UNORDERED_ACCESS, true)]
#[case::compute_srv(QueueType::Compute, ResourceStates::NON_PIXEL_SHADER_RESOURCE, true)]
#[case::compute_render_target(QueueType::Compute, ResourceStates::RENDER_TARGET, false)]
#[case::compute_pixel_srv(QueueType::Compute, ResourceStates::PIXEL_SHADER_RESOURCE, false)]
#[case::copy_dest(QueueType::Copy, ResourceStates::COPY_DEST, true)]
#[case::copy_uav(QueueType::Copy, ResourceStates::UNORDERED_ACCESS, false)]
#[case::bundle_copy_dest(QueueType::Bundle, ResourceStates::COPY_DEST, false)]
fn test_transition_legality(
    #[case] queue_type: QueueType,
    #[case] state: ResourceStates,
    #[case] legal: bool,
) {
    let ctx = TestContext::new();
    let resource = buffer("target", 256, ResourceStates::COMMON);

    let mut context = ctx.manager.begin_on(queue_type, "legality").unwrap();
    let result = context.transition_resource(&resource, state, false);

    if legal {
        assert!(result.is_ok());
        assert_eq!(resource.state(), state);
    } else {
        assert_eq!(
            result,
            Err(RecordingError::UnsupportedTransition { queue_type, state })
        );
        assert_eq!(resource.state(), ResourceStates::COMMON);
        assert_eq!(context.pending_barriers(), 0);
    }
}

// ============================================================================
// Barrier Batching
// ============================================================================

#[test]
fn test_seventeenth_barrier_starts_new_batch() {
    let ctx = TestContext::new();
    let resources: Vec<Arc<GpuResource>> = (0..17)
        .map(|i| buffer(&format!("buffer_{i}"), 64, ResourceStates::COMMON))
        .collect();

    let mut context = ctx.manager.begin("batching").unwrap();
    for resource in &resources[..16] {
        context
            .transition_resource(resource, ResourceStates::COPY_DEST, false)
            .unwrap();
    }
    assert_eq!(context.barrier_flush_count(), 1);
    assert_eq!(context.pending_barriers(), 0);

    context
        .transition_resource(&resources[16], ResourceStates::COPY_DEST, false)
        .unwrap();
    assert_eq!(context.pending_barriers(), 1);
    context.finish(true, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    let submissions = queue.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(barrier_batches(&submissions[0].commands), vec![16, 1]);
}

#[rstest]
#[case::capacity_one(1)]
#[case::capacity_four(4)]
#[case::default_capacity(16)]
fn test_batches_never_exceed_capacity(#[case] capacity: usize) {
    let ctx = TestContext::with_device(
        DummyDevice::new(),
        RecordingConfig::new().with_barrier_batch_capacity(capacity),
    );
    let resources: Vec<Arc<GpuResource>> = (0..40)
        .map(|i| buffer(&format!("buffer_{i}"), 64, ResourceStates::COMMON))
        .collect();

    let mut context = ctx.manager.begin("capacity").unwrap();
    for resource in &resources {
        context
            .transition_resource(resource, ResourceStates::COPY_SOURCE, false)
            .unwrap();
    }
    context.finish(false, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    let batches = barrier_batches(&queue.submissions()[0].commands);
    assert_eq!(batches.iter().sum::<usize>(), 40);
    assert!(batches.iter().all(|&len| len >= 1 && len <= capacity));
}

#[test]
fn test_redundant_transition_records_nothing() {
    let ctx = TestContext::new();
    let resource = buffer("already_there", 64, ResourceStates::COPY_DEST);

    let mut context = ctx.manager.begin("redundant").unwrap();
    context
        .transition_resource(&resource, ResourceStates::COPY_DEST, true)
        .unwrap();
    assert_eq!(context.pending_barriers(), 0);
    assert_eq!(context.barrier_flush_count(), 0);
}

#[test]
fn test_uav_to_copy_dest_then_repeat() {
    let ctx = TestContext::new();
    let resource = buffer("particles", 1024, ResourceStates::UNORDERED_ACCESS);

    let mut context = ctx.manager.begin("uav").unwrap();
    context
        .transition_resource(&resource, ResourceStates::COPY_DEST, false)
        .unwrap();
    assert_eq!(context.pending_barriers(), 1);
    context
        .transition_resource(&resource, ResourceStates::COPY_DEST, false)
        .unwrap();
    assert_eq!(context.pending_barriers(), 1);
    context.finish(false, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    let RecordedCommand::Barriers(barriers) = &queue.submissions()[0].commands[0] else {
        panic!("expected a barrier batch");
    };
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].mode, BarrierMode::Full);
    assert_eq!(barriers[0].before, ResourceStates::UNORDERED_ACCESS);
    assert_eq!(barriers[0].after, ResourceStates::COPY_DEST);
}

#[test]
fn test_tracked_state_follows_each_request() {
    let ctx = TestContext::new();
    let resource = buffer("ping_pong", 256, ResourceStates::COMMON);
    let sequence = [
        ResourceStates::COPY_DEST,
        ResourceStates::VERTEX_AND_CONSTANT_BUFFER,
        ResourceStates::UNORDERED_ACCESS,
        ResourceStates::COPY_SOURCE,
        ResourceStates::GENERIC_READ,
    ];

    let mut context = ctx.manager.begin("sequence").unwrap();
    for (n, state) in sequence.into_iter().enumerate() {
        context.transition_resource(&resource, state, false).unwrap();
        assert_eq!(resource.state(), state);
        assert_eq!(context.pending_barriers(), n + 1);
    }
}

#[test]
fn test_flush_immediate_records_batch_at_once() {
    let ctx = TestContext::new();
    let a = buffer("a", 64, ResourceStates::COMMON);
    let b = buffer("b", 64, ResourceStates::COMMON);

    let mut context = ctx.manager.begin("immediate").unwrap();
    context
        .transition_resource(&a, ResourceStates::COPY_SOURCE, false)
        .unwrap();
    context
        .transition_resource(&b, ResourceStates::COPY_DEST, true)
        .unwrap();
    assert_eq!(context.pending_barriers(), 0);
    assert_eq!(context.barrier_flush_count(), 1);
    assert_eq!(context.flush_resource_barriers(), Ok(0));
}

#[test]
fn test_split_barrier_lifecycle() {
    let ctx = TestContext::new();
    let texture = Arc::new(GpuResource::texture_2d(
        "gbuffer",
        128,
        128,
        ResourceStates::RENDER_TARGET,
    ));

    let mut context = ctx.manager.begin("split").unwrap();
    context
        .begin_resource_transition(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, false)
        .unwrap();
    assert_eq!(texture.state(), ResourceStates::RENDER_TARGET);
    assert_eq!(
        texture.transitioning_state(),
        Some(ResourceStates::PIXEL_SHADER_RESOURCE)
    );

    context
        .transition_resource(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, false)
        .unwrap();
    assert_eq!(texture.state(), ResourceStates::PIXEL_SHADER_RESOURCE);
    assert_eq!(texture.transitioning_state(), None);
    context.finish(false, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    let submissions = queue.submissions();
    let RecordedCommand::Barriers(barriers) = &submissions[0].commands[0] else {
        panic!("expected a barrier batch, got {:?}", submissions[0].commands);
    };
    let modes: Vec<BarrierMode> = barriers.iter().map(|barrier| barrier.mode).collect();
    assert_eq!(modes, vec![BarrierMode::BeginSplit, BarrierMode::EndSplit]);
}

#[test]
fn test_diverging_transition_closes_open_split() {
    let ctx = TestContext::new();
    let resource = buffer("diverge", 64, ResourceStates::COMMON);

    let mut context = ctx.manager.begin("diverge").unwrap();
    context
        .begin_resource_transition(&resource, ResourceStates::COPY_SOURCE, false)
        .unwrap();
    context
        .transition_resource(&resource, ResourceStates::COPY_DEST, false)
        .unwrap();

    assert_eq!(resource.state(), ResourceStates::COPY_DEST);
    assert_eq!(resource.transitioning_state(), None);
    // BeginSplit, EndSplit, then the full transition.
    assert_eq!(context.pending_barriers(), 3);
}

// ============================================================================
// Context Pooling
// ============================================================================

#[test]
fn test_contexts_are_created_once_and_reused() {
    let ctx = TestContext::new();

    for round in 0..5 {
        let context = ctx.manager.begin(&format!("round_{round}")).unwrap();
        context.finish(false, false).unwrap();
    }

    let stats = ctx.manager.stats(QueueType::Graphics).unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(ctx.device.command_lists_created(), 1);

    let context = ctx.manager.begin("again").unwrap();
    assert_eq!(context.sessions(), 6);
    assert_eq!(context.id().index, 0);
}

#[test]
fn test_live_contexts_are_distinct() {
    let ctx = TestContext::new();

    let a = ctx.manager.begin("a").unwrap();
    let b = ctx.manager.begin("b").unwrap();
    assert_ne!(a.id(), b.id());
    drop(a);
    drop(b);

    assert_eq!(ctx.manager.stats(QueueType::Graphics).unwrap().created, 2);
    assert_eq!(ctx.manager.context_ids(QueueType::Graphics).unwrap().len(), 2);
}

#[test]
fn test_concurrent_allocation_yields_unique_fences() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 25;

    let ctx = TestContext::new();
    let manager = &ctx.manager;

    let fences: Vec<FenceValue> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|thread| {
                scope.spawn(move || {
                    let resource = buffer(&format!("thread_{thread}"), 64, ResourceStates::COMMON);
                    let mut fences = Vec::with_capacity(ROUNDS);
                    for round in 0..ROUNDS {
                        let mut context = manager
                            .begin(&format!("thread_{thread}_round_{round}"))
                            .unwrap();
                        let state = if round % 2 == 0 {
                            ResourceStates::COPY_DEST
                        } else {
                            ResourceStates::COMMON
                        };
                        context.transition_resource(&resource, state, false).unwrap();
                        fences.push(context.finish(false, false).unwrap());
                    }
                    fences
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: HashSet<FenceValue> = fences.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * ROUNDS);

    let stats = manager.stats(QueueType::Graphics).unwrap();
    assert!(stats.created <= THREADS);
    assert_eq!(stats.idle, stats.created);
}

#[test]
fn test_fences_increase_per_context() {
    let ctx = TestContext::new();

    let mut context = ctx.manager.begin("monotonic").unwrap();
    let first = context.flush(false).unwrap();
    let second = context.flush(true).unwrap();
    let third = context.finish(false, false).unwrap();

    assert!(first < second && second < third);
    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    assert_eq!(queue.last_submitted(), third);
}

#[test]
fn test_allocator_not_reissued_before_fence() {
    let ctx = TestContext::with_device(
        DummyDevice::new().with_manual_completion(),
        RecordingConfig::default(),
    );
    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();

    let fence = ctx.manager.begin("first").unwrap().finish(false, false).unwrap();
    assert!(!queue.is_complete(fence));

    // The only pooled allocator is still in flight.
    let second = ctx.manager.begin("second").unwrap();
    assert_eq!(ctx.manager.stats(QueueType::Graphics).unwrap().allocators_created, 2);
    second.finish(false, false).unwrap();

    queue.complete_all();
    let third = ctx.manager.begin("third").unwrap();
    assert_eq!(ctx.manager.stats(QueueType::Graphics).unwrap().allocators_created, 2);
    third.finish(false, false).unwrap();

    let allocators: Vec<Option<u64>> = queue
        .submissions()
        .iter()
        .map(|submission| submission.allocator_id)
        .collect();
    assert_ne!(allocators[0], allocators[1]);
    assert!(allocators[2] == allocators[0] || allocators[2] == allocators[1]);
}

#[test]
fn test_dropped_context_returns_to_pool() {
    let ctx = TestContext::new();
    let resource = buffer("discarded", 64, ResourceStates::COMMON);

    {
        let mut context = ctx.manager.begin("discard").unwrap();
        context
            .transition_resource(&resource, ResourceStates::COPY_DEST, false)
            .unwrap();
    }

    let stats = ctx.manager.stats(QueueType::Graphics).unwrap();
    assert_eq!(stats.idle, 1);
    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    assert_eq!(queue.submission_count(), 0);

    let context = ctx.manager.begin("after_discard").unwrap();
    assert_eq!(context.state(), ContextState::Recording);
    assert_eq!(context.pending_barriers(), 0);
}

#[test]
fn test_begin_twice_is_invalid_state() {
    let ctx = TestContext::new();
    let mut context = ctx.manager.begin("twice").unwrap();
    assert_eq!(
        context.begin("again"),
        Err(RecordingError::InvalidState {
            expected: ContextState::Idle,
            actual: ContextState::Recording,
        })
    );
}

#[test]
fn test_unsupported_queue_is_rejected() {
    let ctx = TestContext::with_device(
        DummyDevice::new().with_queues(&[QueueType::Graphics]),
        RecordingConfig::default(),
    );
    assert!(matches!(
        ctx.manager.allocate(QueueType::Compute),
        Err(RecordingError::InvalidArgument(_))
    ));
}

// ============================================================================
// Device Loss
// ============================================================================

#[test]
fn test_device_lost_propagates_from_flush() {
    let ctx = TestContext::new();
    let mut context = ctx.manager.begin("doomed").unwrap();
    context.flush(false).unwrap();

    ctx.device.lose_device();
    assert_eq!(context.flush(false), Err(RecordingError::DeviceLost));
    assert_eq!(context.finish(true, false), Err(RecordingError::DeviceLost));
    assert_eq!(ctx.manager.wait_idle(), Err(RecordingError::DeviceLost));
}

// ============================================================================
// Pipeline Rebinding
// ============================================================================

#[test]
fn test_pipeline_rebound_after_flush() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(PipelineState::new(
        "lighting",
        PipelineKind::Compute,
        RawPipeline::Dummy,
    ));

    let mut context = ctx.manager.begin_on(QueueType::Compute, "rebind").unwrap();
    context.set_pipeline_state(&pipeline).unwrap();
    context.flush(false).unwrap();
    context.finish(false, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Compute).unwrap();
    let submissions = queue.submissions();
    for submission in &submissions {
        assert!(matches!(
            submission.commands.first(),
            Some(RecordedCommand::SetPipeline(label)) if label == "lighting"
        ));
    }
}

#[test]
fn test_reset_clears_bound_pipeline() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(PipelineState::new(
        "forward",
        PipelineKind::Graphics,
        RawPipeline::Dummy,
    ));

    let mut context = ctx.manager.begin("bind").unwrap();
    context.set_pipeline_state(&pipeline).unwrap();
    context.finish(false, false).unwrap();

    let mut context = ctx.manager.begin("reuse").unwrap();
    assert!(context.pipeline_state().is_none());
    context.flush(false).unwrap();
    context.finish(false, false).unwrap();

    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();
    let submissions = queue.submissions();
    assert_eq!(submissions.len(), 3);
    assert!(matches!(
        submissions[0].commands.first(),
        Some(RecordedCommand::SetPipeline(label)) if label == "forward"
    ));
    for submission in &submissions[1..] {
        assert!(
            !submission
                .commands
                .iter()
                .any(|command| matches!(command, RecordedCommand::SetPipeline(_)))
        );
    }
}

#[test]
fn test_graphics_pipeline_rejected_on_compute() {
    let ctx = TestContext::new();
    let pipeline = Arc::new(PipelineState::new(
        "forward",
        PipelineKind::Graphics,
        RawPipeline::Dummy,
    ));
    let mut context = ctx.manager.begin_on(QueueType::Compute, "wrong_kind").unwrap();
    assert!(matches!(
        context.set_pipeline_state(&pipeline),
        Err(RecordingError::InvalidArgument(_))
    ));
    assert!(context.pipeline_state().is_none());
}

// ============================================================================
// Dynamic Memory
// ============================================================================

#[rstest]
#[case::constants(256)]
#[case::small(16)]
#[case::page(4096)]
fn test_dynamic_allocations_are_aligned(#[case] alignment: u64) {
    let ctx = TestContext::new();
    let mut context = ctx.manager.begin("dynamic").unwrap();

    let first = context.allocate_dynamic_space(100, alignment).unwrap();
    let second = context.allocate_dynamic_space(100, alignment).unwrap();

    assert_eq!(first.offset % alignment, 0);
    assert_eq!(second.offset % alignment, 0);
    assert!(second.offset >= first.end());
    assert_eq!(second.gpu_address - first.gpu_address, second.offset - first.offset);
    context.write_dynamic(&second, &[7u8; 100]).unwrap();
}

#[test]
fn test_dynamic_out_of_space() {
    let ctx = TestContext::with_device(
        DummyDevice::new(),
        RecordingConfig::new().with_dynamic_page_size(1024),
    );
    let mut context = ctx.manager.begin("overflow").unwrap();

    context.allocate_dynamic_space(1000, 256).unwrap();
    assert!(matches!(
        context.allocate_dynamic_space(100, 256),
        Err(RecordingError::OutOfSpace {
            requested: 100,
            available: 0,
        })
    ));
    assert!(matches!(
        context.allocate_dynamic_space(16, 3),
        Err(RecordingError::InvalidArgument(_))
    ));
}

#[test]
fn test_dynamic_page_rewinds_after_completion() {
    let ctx = TestContext::new();

    let mut context = ctx.manager.begin("frame_0").unwrap();
    let first = context.allocate_dynamic_space(512, 256).unwrap();
    context.finish(true, false).unwrap();

    let mut context = ctx.manager.begin("frame_1").unwrap();
    let second = context.allocate_dynamic_space(512, 256).unwrap();
    assert_eq!(second.offset, 0);
    assert_eq!(second.resource.id(), first.resource.id());
    assert_eq!(ctx.device.upload_pages_created(), 1);

    // Same page and offset, but the block belongs to the previous session.
    assert!(matches!(
        context.write_dynamic(&first, &[0xEE; 512]),
        Err(RecordingError::InvalidArgument(_))
    ));
    context.write_dynamic(&second, &[0x11; 512]).unwrap();
}

#[test]
fn test_dynamic_descriptors_not_reissued_before_fence() {
    let ctx = TestContext::with_device(
        DummyDevice::new().with_manual_completion(),
        RecordingConfig::default(),
    );
    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();

    let mut context = ctx.manager.begin("frame_0").unwrap();
    let first_slots = context.allocate_dynamic_descriptors(4).unwrap();
    let first_block = context.allocate_dynamic_space(256, 256).unwrap();
    let fence = context.finish(false, false).unwrap();
    assert!(!queue.is_complete(fence));

    let mut context = ctx.manager.begin("frame_1").unwrap();
    let second_slots = context.allocate_dynamic_descriptors(4).unwrap();
    let second_block = context.allocate_dynamic_space(256, 256).unwrap();
    assert!(second_slots.base >= first_slots.base + first_slots.count);
    assert_ne!(second_block.resource.id(), first_block.resource.id());
    context.finish(false, false).unwrap();

    queue.complete_all();
    let mut context = ctx.manager.begin("frame_2").unwrap();
    assert_eq!(context.allocate_dynamic_descriptors(4).unwrap().base, 0);
}

#[test]
fn test_finish_releases_dynamic_page_behind_fence() {
    let ctx = TestContext::with_device(
        DummyDevice::new().with_manual_completion(),
        RecordingConfig::default(),
    );
    let queue = ctx.manager.queue(QueueType::Graphics).unwrap();

    let mut context = ctx.manager.begin("frame_0").unwrap();
    let first = context.allocate_dynamic_space(128, 256).unwrap();
    let fence = context.finish(false, true).unwrap();
    assert!(!queue.is_complete(fence));

    // The page went back to the pool instead of staying with the context.
    let stats = ctx.manager.stats(QueueType::Graphics).unwrap();
    assert_eq!(stats.upload_pages_retired, 1);

    let mut context = ctx.manager.begin("frame_1").unwrap();
    assert_eq!(context.dynamic_bytes_used(), 0);
    let second = context.allocate_dynamic_space(128, 256).unwrap();
    assert_ne!(second.resource.id(), first.resource.id());
    assert_eq!(ctx.device.upload_pages_created(), 2);
    context.finish(false, true).unwrap();

    queue.complete_all();
    let mut context = ctx.manager.begin("frame_2").unwrap();
    let third = context.allocate_dynamic_space(128, 256).unwrap();
    let reused = third.resource.id();
    assert!(reused == first.resource.id() || reused == second.resource.id());
    assert_eq!(ctx.device.upload_pages_created(), 2);
}

// ============================================================================
// Resource Initialization
// ============================================================================

#[rstest]
#[case::copy_queue(vec![QueueType::Graphics, QueueType::Copy], QueueType::Copy)]
#[case::graphics_fallback(vec![QueueType::Graphics], QueueType::Graphics)]
fn test_initialize_buffer_leaves_common(
    #[case] queues: Vec<QueueType>,
    #[case] expected_queue: QueueType,
) {
    let ctx = TestContext::with_device(
        DummyDevice::new().with_queues(&queues),
        RecordingConfig::default(),
    );
    let dest = buffer("vertices", 1024, ResourceStates::COMMON);
    let data: Vec<u8> = (0..=255).collect();

    let fence = ctx.manager.initialize_buffer(&dest, &data, 128).unwrap();

    assert_eq!(dest.state(), ResourceStates::COMMON);
    let queue = ctx.manager.queue(expected_queue).unwrap();
    assert!(queue.is_complete(fence));
    let submissions = queue.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(submissions[0].commands.iter().any(|command| matches!(
        command,
        RecordedCommand::CopyBuffer { dst, dst_offset: 128, num_bytes: 256, .. } if *dst == dest.id()
    )));
}

#[test]
fn test_initialize_buffer_rejects_overflow() {
    let ctx = TestContext::new();
    let dest = buffer("small", 64, ResourceStates::COMMON);
    assert!(matches!(
        ctx.manager.initialize_buffer(&dest, &[0u8; 32], 48),
        Err(RecordingError::InvalidArgument(_))
    ));
    assert_eq!(ctx.manager.queue(QueueType::Copy).unwrap().submission_count(), 0);
}

#[test]
fn test_initialize_buffer_from_whole_source() {
    let ctx = TestContext::new();
    let src = buffer("staging", 512, ResourceStates::GENERIC_READ);
    let dest = buffer("indices", 1024, ResourceStates::COMMON);

    ctx.manager
        .initialize_buffer_from(&dest, &src, 128, None, 0)
        .unwrap();

    assert_eq!(dest.state(), ResourceStates::COMMON);
    let queue = ctx.manager.queue(QueueType::Copy).unwrap();
    assert!(queue.submissions()[0].commands.iter().any(|command| matches!(
        command,
        RecordedCommand::CopyBuffer { src_offset: 128, num_bytes: 384, .. }
    )));
}

#[test]
fn test_initialize_texture_pads_rows() {
    let ctx = TestContext::new();
    let texture = Arc::new(GpuResource::texture_2d("albedo", 4, 4, ResourceStates::COMMON));
    let texels = [0xABu8; 64];

    ctx.manager
        .initialize_texture(
            &texture,
            4,
            &[SubresourceData {
                data: &texels,
                row_pitch: 16,
            }],
        )
        .unwrap();

    assert_eq!(texture.state(), ResourceStates::COMMON);
    let queue = ctx.manager.queue(QueueType::Copy).unwrap();
    let copies: Vec<_> = queue.submissions()[0]
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::CopyBufferToTexture { footprint, .. } => Some(*footprint),
            _ => None,
        })
        .collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].row_pitch, 256);
    assert_eq!((copies[0].width, copies[0].height), (4, 4));
}

#[test]
fn test_initialize_texture_rejects_overflowing_pitch() {
    let ctx = TestContext::new();
    let texture = Arc::new(GpuResource::texture_2d("albedo", 4, 4, ResourceStates::COMMON));
    let texels = [0u8; 64];

    let result = ctx.manager.initialize_texture(
        &texture,
        4,
        &[SubresourceData {
            data: &texels,
            row_pitch: u64::MAX,
        }],
    );

    assert!(matches!(result, Err(RecordingError::InvalidArgument(_))));
    assert_eq!(texture.state(), ResourceStates::COMMON);
    assert_eq!(ctx.manager.queue(QueueType::Copy).unwrap().submission_count(), 0);
}
