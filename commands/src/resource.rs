//! GPU resources as seen by the recording layer.
//!
//! A [`GpuResource`] carries the backend handle the command list needs to
//! emit barriers and copies, and the synchronization state the context's
//! barrier tracker reads and updates. Creating the underlying memory is the
//! job of whoever owns the device; this crate only tracks it.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::ResourceStates;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Shape of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Linear buffer of `size` bytes.
    Buffer { size: u64 },
    /// Texture with a full mip chain and array layers.
    Texture {
        width: u32,
        height: u32,
        depth_or_layers: u32,
        mip_levels: u32,
    },
}

/// Backend-native handle of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawResource {
    /// No GPU object (dummy backend, tests).
    Dummy,
    /// Vulkan buffer.
    #[cfg(feature = "vulkan-backend")]
    VulkanBuffer(ash::vk::Buffer),
    /// Vulkan image and the aspects barriers should cover.
    #[cfg(feature = "vulkan-backend")]
    VulkanImage {
        image: ash::vk::Image,
        aspect: ash::vk::ImageAspectFlags,
    },
}

/// Synchronization bookkeeping of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TrackedState {
    /// State after every barrier recorded so far.
    pub authoritative: ResourceStates,
    /// Target of an open split barrier, if any.
    pub transitioning: Option<ResourceStates>,
}

/// A GPU buffer or texture whose state transitions are tracked.
///
/// Resources are shared as `Arc<GpuResource>`; recording contexts keep only
/// weak references in their barrier batches. Transitions of one resource
/// from several contexts at once must be serialized by the caller.
pub struct GpuResource {
    id: ResourceId,
    label: String,
    kind: ResourceKind,
    raw: RawResource,
    state: Mutex<TrackedState>,
}

impl GpuResource {
    /// Start tracking a resource that is currently in `initial_state`.
    pub fn new(
        label: impl Into<String>,
        kind: ResourceKind,
        raw: RawResource,
        initial_state: ResourceStates,
    ) -> Self {
        let resource = Self {
            id: ResourceId::next(),
            label: label.into(),
            kind,
            raw,
            state: Mutex::new(TrackedState {
                authoritative: initial_state,
                transitioning: None,
            }),
        };
        log::trace!(
            "GpuResource: tracking {:?} '{}' in {:?}",
            resource.id,
            resource.label,
            initial_state
        );
        resource
    }

    /// Track a buffer without a backend object.
    pub fn buffer(label: impl Into<String>, size: u64, initial_state: ResourceStates) -> Self {
        Self::new(
            label,
            ResourceKind::Buffer { size },
            RawResource::Dummy,
            initial_state,
        )
    }

    /// Track a single-mip 2D texture without a backend object.
    pub fn texture_2d(
        label: impl Into<String>,
        width: u32,
        height: u32,
        initial_state: ResourceStates,
    ) -> Self {
        Self::new(
            label,
            ResourceKind::Texture {
                width,
                height,
                depth_or_layers: 1,
                mip_levels: 1,
            },
            RawResource::Dummy,
            initial_state,
        )
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn raw(&self) -> RawResource {
        self.raw
    }

    /// Size in bytes for buffers, `None` for textures.
    pub fn buffer_size(&self) -> Option<u64> {
        match self.kind {
            ResourceKind::Buffer { size } => Some(size),
            ResourceKind::Texture { .. } => None,
        }
    }

    /// Number of subresources (mips times layers); 1 for buffers.
    pub fn subresource_count(&self) -> u32 {
        match self.kind {
            ResourceKind::Buffer { .. } => 1,
            ResourceKind::Texture {
                depth_or_layers,
                mip_levels,
                ..
            } => depth_or_layers.max(1) * mip_levels.max(1),
        }
    }

    /// State after every barrier recorded so far, flushed or not.
    pub fn state(&self) -> ResourceStates {
        self.state.lock().authoritative
    }

    /// Target state of an open split barrier.
    pub fn transitioning_state(&self) -> Option<ResourceStates> {
        self.state.lock().transitioning
    }

    pub(crate) fn tracked(&self) -> parking_lot::MutexGuard<'_, TrackedState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GpuResource")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("state", &state.authoritative)
            .field("transitioning", &state.transitioning)
            .finish()
    }
}

static_assertions::assert_impl_all!(GpuResource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_resource_has_no_open_split() {
        let buffer = GpuResource::buffer("vertices", 1024, ResourceStates::COPY_DEST);
        assert_eq!(buffer.state(), ResourceStates::COPY_DEST);
        assert_eq!(buffer.transitioning_state(), None);
        assert_eq!(buffer.buffer_size(), Some(1024));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = GpuResource::buffer("a", 16, ResourceStates::COMMON);
        let b = GpuResource::buffer("b", 16, ResourceStates::COMMON);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_subresource_count() {
        let texture = GpuResource::new(
            "shadow_atlas",
            ResourceKind::Texture {
                width: 512,
                height: 512,
                depth_or_layers: 4,
                mip_levels: 3,
            },
            RawResource::Dummy,
            ResourceStates::COMMON,
        );
        assert_eq!(texture.subresource_count(), 12);
        assert_eq!(texture.buffer_size(), None);
    }

    #[test]
    fn test_debug_shows_state() {
        let buffer = GpuResource::buffer("debug_me", 64, ResourceStates::UNORDERED_ACCESS);
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("debug_me"));
        assert!(debug.contains("UNORDERED_ACCESS"));
    }
}
