//! Queue types, resource states and fence values.

use bitflags::bitflags;

use crate::error::{RecordingError, Result};

/// Kind of GPU queue a context records for.
///
/// The queue type decides which resource states a context may transition to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    /// Direct queue: draw, dispatch and copy.
    Graphics,
    /// Async compute queue.
    Compute,
    /// Transfer-only queue.
    Copy,
    /// Secondary recording replayed from a graphics context.
    Bundle,
}

impl QueueType {
    /// Number of queue types.
    pub const COUNT: usize = 4;

    /// All queue types, in index order.
    pub const ALL: [QueueType; Self::COUNT] = [
        QueueType::Graphics,
        QueueType::Compute,
        QueueType::Copy,
        QueueType::Bundle,
    ];

    /// Index of this queue type into per-type tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Look up a queue type by raw index.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            RecordingError::InvalidArgument(format!("unrecognized queue type index {index}"))
        })
    }

    /// Whether contexts of this type can record resource barriers at all.
    pub fn records_barriers(self) -> bool {
        !matches!(self, QueueType::Bundle)
    }

    /// States a context of this type may transition a resource into.
    ///
    /// `COMMON` is the empty set and therefore legal wherever barriers are.
    pub fn supported_states(self) -> ResourceStates {
        match self {
            QueueType::Graphics => ResourceStates::all(),
            QueueType::Compute => ResourceStates::COMPUTE_QUEUE_STATES,
            QueueType::Copy => ResourceStates::COPY_QUEUE_STATES,
            QueueType::Bundle => ResourceStates::empty(),
        }
    }

    /// Check that `state` can be requested on this queue type.
    pub fn validate_state(self, state: ResourceStates) -> Result<()> {
        if self.records_barriers() && self.supported_states().contains(state) {
            Ok(())
        } else {
            Err(RecordingError::UnsupportedTransition {
                queue_type: self,
                state,
            })
        }
    }
}

impl TryFrom<u32> for QueueType {
    type Error = RecordingError;

    fn try_from(value: u32) -> Result<Self> {
        Self::from_index(value as usize)
    }
}

bitflags! {
    /// Synchronization state of a GPU resource.
    ///
    /// Bit layout follows the D3D12 resource-state model; `COMMON` is the
    /// empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const UNORDERED_ACCESS = 1 << 3;
        const DEPTH_WRITE = 1 << 4;
        const DEPTH_READ = 1 << 5;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 6;
        const PIXEL_SHADER_RESOURCE = 1 << 7;
        const STREAM_OUT = 1 << 8;
        const INDIRECT_ARGUMENT = 1 << 9;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;
        const RESOLVE_DEST = 1 << 12;
        const RESOLVE_SOURCE = 1 << 13;
        const PRESENT = 1 << 14;

        /// Union of every read-only state a buffer can be in.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();

        /// States a compute queue can transition to.
        const COMPUTE_QUEUE_STATES = Self::UNORDERED_ACCESS.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::COPY_DEST.bits()
            | Self::COPY_SOURCE.bits();

        /// States a copy queue can transition to.
        const COPY_QUEUE_STATES = Self::COPY_DEST.bits() | Self::COPY_SOURCE.bits();
    }
}

impl ResourceStates {
    /// The common (decayed) state.
    pub const COMMON: Self = Self::empty();

    /// Whether this state permits GPU writes.
    pub fn is_write(self) -> bool {
        self.intersects(
            Self::RENDER_TARGET
                | Self::UNORDERED_ACCESS
                | Self::DEPTH_WRITE
                | Self::STREAM_OUT
                | Self::COPY_DEST
                | Self::RESOLVE_DEST,
        )
    }
}

impl Default for ResourceStates {
    fn default() -> Self {
        Self::COMMON
    }
}

/// A point on a queue's GPU timeline.
///
/// Every submission returns a strictly greater value than the previous one on
/// the same queue. A value is "reached" once the queue's completed value is
/// greater than or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FenceValue(pub u64);

impl FenceValue {
    /// The value every queue starts at; always reached.
    pub const ZERO: Self = Self(0);

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The value following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether a queue whose completed value is `completed` has passed this fence.
    pub fn is_reached(self, completed: FenceValue) -> bool {
        completed >= self
    }
}

impl std::fmt::Display for FenceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
