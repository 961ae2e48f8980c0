//! The context pool.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::allocator_pool::AllocatorPool;
use crate::arena::UploadPagePool;
use crate::backend::{Api, Device, Queue};
use crate::config::RecordingConfig;
use crate::error::{RecordingError, Result};
use crate::types::{FenceValue, QueueType};

use super::{CommandContext, ContextId, ContextInner};

/// Per-queue-type state of the manager.
pub(crate) struct QueueSlot<A: Api> {
    pub(crate) queue: A::Queue,
    pub(crate) allocators: AllocatorPool<A>,
    pub(crate) pages: UploadPagePool<A>,
    registry: Mutex<ContextRegistry<A>>,
}

struct ContextRegistry<A: Api> {
    /// Contexts ready to be handed out, oldest first.
    idle: VecDeque<Box<ContextInner<A>>>,
    /// Every context ever created for this queue type.
    created: Vec<ContextId>,
}

/// Counters of one queue type's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Contexts ever created.
    pub created: usize,
    /// Contexts currently pooled.
    pub idle: usize,
    /// Command allocators ever created.
    pub allocators_created: usize,
    /// Command allocators parked in the pool.
    pub allocators_retired: usize,
    /// Upload pages ever created.
    pub upload_pages_created: usize,
    /// Upload pages parked in the pool.
    pub upload_pages_retired: usize,
}

/// Thread-safe pool of recording contexts, keyed by queue type.
///
/// The manager owns one queue, one [`AllocatorPool`] and one
/// [`UploadPagePool`] per queue type the device supports. Contexts are
/// checked out as [`CommandContext`] guards that borrow the manager and hand
/// themselves back when finished or dropped.
///
/// # Thread Safety
///
/// `allocate` and `free` may be called from any thread. A context is never
/// handed to two callers at once.
pub struct ContextManager<A: Api> {
    slots: [Option<QueueSlot<A>>; QueueType::COUNT],
    config: RecordingConfig,
    device: Arc<A::Device>,
}

impl<A: Api> ContextManager<A> {
    /// Create a manager for every queue type `device` supports.
    pub fn new(device: Arc<A::Device>, config: RecordingConfig) -> Result<Self> {
        config.validate()?;

        let mut slots: [Option<QueueSlot<A>>; QueueType::COUNT] = Default::default();
        for queue_type in QueueType::ALL {
            if !device.supports_queue(queue_type) {
                continue;
            }
            slots[queue_type.index()] = Some(QueueSlot {
                queue: device.create_queue(queue_type)?,
                allocators: AllocatorPool::new(queue_type),
                pages: UploadPagePool::new(config.dynamic_page_size),
                registry: Mutex::new(ContextRegistry {
                    idle: VecDeque::new(),
                    created: Vec::new(),
                }),
            });
        }

        let supported: Vec<QueueType> = QueueType::ALL
            .into_iter()
            .filter(|queue_type| slots[queue_type.index()].is_some())
            .collect();
        log::info!(
            "ContextManager: created on '{}' with queues {:?}",
            device.name(),
            supported
        );

        Ok(Self {
            slots,
            config,
            device,
        })
    }

    pub fn device(&self) -> &A::Device {
        &self.device
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Whether contexts of `queue_type` can be allocated.
    pub fn supports(&self, queue_type: QueueType) -> bool {
        self.slots[queue_type.index()].is_some()
    }

    /// The submission queue of `queue_type`.
    pub fn queue(&self, queue_type: QueueType) -> Result<&A::Queue> {
        Ok(&self.slot(queue_type)?.queue)
    }

    pub(crate) fn slot(&self, queue_type: QueueType) -> Result<&QueueSlot<A>> {
        self.slots[queue_type.index()].as_ref().ok_or_else(|| {
            RecordingError::InvalidArgument(format!(
                "device '{}' has no {:?} queue",
                self.device.name(),
                queue_type
            ))
        })
    }

    /// Check out an idle context of `queue_type`, creating one if none is
    /// pooled.
    ///
    /// The context is ready to [`begin`](CommandContext::begin).
    pub fn allocate(&self, queue_type: QueueType) -> Result<CommandContext<'_, A>> {
        let slot = self.slot(queue_type)?;

        let pooled = slot.registry.lock().idle.pop_front();
        let mut inner = match pooled {
            Some(inner) => inner,
            None => {
                let id = {
                    let mut registry = slot.registry.lock();
                    let id = ContextId {
                        queue_type,
                        index: registry.created.len() as u32,
                    };
                    registry.created.push(id);
                    id
                };
                log::debug!("ContextManager: creating context {}", id);
                Box::new(ContextInner::new(id, &self.config))
            }
        };

        // Backend objects are created outside the registry lock.
        if let Err(err) = inner.prepare(&self.device, slot) {
            log::warn!(
                "ContextManager: failed to prepare context {}: {}",
                inner.id(),
                err
            );
            slot.registry.lock().idle.push_back(inner);
            return Err(err);
        }
        Ok(CommandContext::new(self, inner))
    }

    /// Allocate a graphics context and begin recording.
    pub fn begin(&self, label: &str) -> Result<CommandContext<'_, A>> {
        self.begin_on(QueueType::Graphics, label)
    }

    /// Allocate a context of `queue_type` and begin recording.
    pub fn begin_on(&self, queue_type: QueueType, label: &str) -> Result<CommandContext<'_, A>> {
        let mut context = self.allocate(queue_type)?;
        context.begin(label)?;
        Ok(context)
    }

    /// Return a context to the pool without waiting for the GPU.
    ///
    /// Same as dropping it.
    pub fn free(&self, context: CommandContext<'_, A>) {
        drop(context);
    }

    pub(crate) fn reclaim(&self, mut inner: Box<ContextInner<A>>) {
        let Some(slot) = self.slots[inner.queue_type().index()].as_ref() else {
            log::error!(
                "ContextManager: context {} has no queue slot, dropping it",
                inner.id()
            );
            return;
        };
        inner.retire(slot);
        log::trace!("ContextManager: context {} back in the pool", inner.id());
        slot.registry.lock().idle.push_back(inner);
    }

    /// Pool counters of `queue_type`.
    pub fn stats(&self, queue_type: QueueType) -> Result<PoolStats> {
        let slot = self.slot(queue_type)?;
        let (created, idle) = {
            let registry = slot.registry.lock();
            (registry.created.len(), registry.idle.len())
        };
        Ok(PoolStats {
            created,
            idle,
            allocators_created: slot.allocators.created(),
            allocators_retired: slot.allocators.retired(),
            upload_pages_created: slot.pages.created(),
            upload_pages_retired: slot.pages.retired(),
        })
    }

    /// Every context id created for `queue_type`, in creation order.
    pub fn context_ids(&self, queue_type: QueueType) -> Result<Vec<ContextId>> {
        Ok(self.slot(queue_type)?.registry.lock().created.clone())
    }

    /// Block until every queue has completed all submitted work.
    pub fn wait_idle(&self) -> Result<()> {
        for slot in self.slots.iter().flatten() {
            let last = slot.queue.last_submitted();
            if last > FenceValue::ZERO {
                slot.queue.wait(last)?;
            }
        }
        Ok(())
    }
}

impl<A: Api> Drop for ContextManager<A> {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::error!("ContextManager: failed to wait for idle GPU on drop: {}", err);
        }
        for slot in self.slots.iter().flatten() {
            let mut registry = slot.registry.lock();
            log::debug!(
                "ContextManager: destroying {} {:?} contexts",
                registry.created.len(),
                slot.queue.queue_type()
            );
            registry.idle.clear();
            slot.allocators.clear();
            slot.pages.clear();
        }
    }
}

impl<A: Api> std::fmt::Debug for ContextManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ContextManager");
        debug.field("device", &self.device.name());
        for queue_type in QueueType::ALL {
            if let Ok(stats) = self.stats(queue_type) {
                debug.field(&format!("{queue_type:?}"), &stats);
            }
        }
        debug.field("config", &self.config).finish()
    }
}
