//! Common utilities for context integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_commands::backend::dummy::{DummyApi, DummyDevice, RecordedCommand};
use redlilium_commands::{ContextManager, GpuResource, RecordingConfig, ResourceStates};

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A manager over a dummy device, plus the device for fault injection.
pub struct TestContext {
    pub device: Arc<DummyDevice>,
    pub manager: ContextManager<DummyApi>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_device(DummyDevice::new(), RecordingConfig::default())
    }

    pub fn with_device(device: DummyDevice, config: RecordingConfig) -> Self {
        init_logging();
        let device = Arc::new(device);
        let manager = ContextManager::new(Arc::clone(&device), config)
            .expect("dummy manager should always build");
        Self { device, manager }
    }
}

/// A buffer tracked without a backend object.
pub fn buffer(label: &str, size: u64, state: ResourceStates) -> Arc<GpuResource> {
    Arc::new(GpuResource::buffer(label, size, state))
}

/// Sizes of every batched barrier call, in recording order.
pub fn barrier_batches(commands: &[RecordedCommand]) -> Vec<usize> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::Barriers(barriers) => Some(barriers.len()),
            _ => None,
        })
        .collect()
}
