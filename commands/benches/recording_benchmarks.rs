use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_commands::backend::dummy::DummyDevice;
use redlilium_commands::{ContextManager, GpuResource, RecordingConfig, ResourceStates};

fn buffers(count: usize) -> Vec<Arc<GpuResource>> {
    (0..count)
        .map(|i| {
            Arc::new(GpuResource::buffer(
                format!("buffer_{i}"),
                4096,
                ResourceStates::COMMON,
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Context pooling
// ---------------------------------------------------------------------------

fn bench_begin_finish(c: &mut Criterion) {
    let manager =
        ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default()).unwrap();
    c.bench_function("context_begin_finish", |b| {
        b.iter(|| {
            let context = manager.begin("bench").unwrap();
            black_box(context.finish(false, false).unwrap());
        });
    });
}

fn bench_begin_discard(c: &mut Criterion) {
    let manager =
        ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default()).unwrap();
    c.bench_function("context_begin_discard", |b| {
        b.iter(|| {
            let context = manager.begin("bench").unwrap();
            black_box(context.id());
        });
    });
}

// ---------------------------------------------------------------------------
// Barrier batching
// ---------------------------------------------------------------------------

fn bench_transitions_64(c: &mut Criterion) {
    let manager =
        ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default()).unwrap();
    let resources = buffers(64);
    let mut flip = false;
    c.bench_function("transition_64_buffers", |b| {
        b.iter(|| {
            flip = !flip;
            let state = if flip {
                ResourceStates::COPY_DEST
            } else {
                ResourceStates::PIXEL_SHADER_RESOURCE
            };
            let mut context = manager.begin("transitions").unwrap();
            for resource in &resources {
                context.transition_resource(resource, state, false).unwrap();
            }
            black_box(context.finish(false, false).unwrap());
        });
    });
}

fn bench_split_transitions_16(c: &mut Criterion) {
    let manager =
        ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default()).unwrap();
    let resources = buffers(16);
    let mut flip = false;
    c.bench_function("split_transition_16_buffers", |b| {
        b.iter(|| {
            flip = !flip;
            let state = if flip {
                ResourceStates::UNORDERED_ACCESS
            } else {
                ResourceStates::NON_PIXEL_SHADER_RESOURCE
            };
            let mut context = manager.begin("split").unwrap();
            for resource in &resources {
                context
                    .begin_resource_transition(resource, state, false)
                    .unwrap();
            }
            for resource in &resources {
                context.transition_resource(resource, state, false).unwrap();
            }
            black_box(context.finish(false, false).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Dynamic memory
// ---------------------------------------------------------------------------

fn bench_dynamic_allocations(c: &mut Criterion) {
    let manager =
        ContextManager::new(Arc::new(DummyDevice::new()), RecordingConfig::default()).unwrap();
    c.bench_function("dynamic_allocate_128_constants", |b| {
        b.iter(|| {
            let mut context = manager.begin("constants").unwrap();
            for _ in 0..128 {
                black_box(context.allocate_dynamic_space(256, 256).unwrap());
            }
            context.finish(true, false).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_begin_finish,
    bench_begin_discard,
    bench_transitions_64,
    bench_split_transitions_16,
    bench_dynamic_allocations,
);
criterion_main!(benches);
