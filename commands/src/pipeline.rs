//! Pipeline state objects bound to recording contexts.
//!
//! Building pipelines is outside this crate. A context only remembers which
//! pipeline is bound (weakly) so it can rebind it after a mid-stream flush.

use crate::types::QueueType;

/// Which pipeline stage set a pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

impl PipelineKind {
    /// Whether a context of `queue_type` may bind a pipeline of this kind.
    pub fn is_bindable_on(self, queue_type: QueueType) -> bool {
        match self {
            PipelineKind::Graphics => {
                matches!(queue_type, QueueType::Graphics | QueueType::Bundle)
            }
            PipelineKind::Compute => !matches!(queue_type, QueueType::Copy),
        }
    }
}

/// Backend-native pipeline handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawPipeline {
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan(ash::vk::Pipeline),
}

/// A compiled pipeline state object.
#[derive(Debug)]
pub struct PipelineState {
    label: String,
    kind: PipelineKind,
    raw: RawPipeline,
}

impl PipelineState {
    pub fn new(label: impl Into<String>, kind: PipelineKind, raw: RawPipeline) -> Self {
        Self {
            label: label.into(),
            kind,
            raw,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn raw(&self) -> RawPipeline {
        self.raw
    }
}

static_assertions::assert_impl_all!(PipelineState: Send, Sync);
