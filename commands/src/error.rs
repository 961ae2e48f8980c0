//! Command recording error types.

use thiserror::Error;

use crate::types::{QueueType, ResourceStates};

/// Errors that can occur while pooling contexts or recording commands.
///
/// `InvalidArgument`, `InvalidState` and `UnsupportedTransition` report misuse
/// and are never retried. `DeviceLost` is fatal and propagated as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// An argument was out of range or named something the device lacks.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An operation was called in the wrong lifecycle state.
    #[error("invalid context state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: ContextState,
        actual: ContextState,
    },
    /// The requested resource state cannot be reached on this queue type.
    #[error("resource state {state:?} is not supported on a {queue_type:?} queue")]
    UnsupportedTransition {
        queue_type: QueueType,
        state: ResourceStates,
    },
    /// The dynamic arena cannot satisfy the request before it is recycled.
    #[error("dynamic arena exhausted: requested {requested} bytes, {available} available")]
    OutOfSpace { requested: u64, available: u64 },
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Any other failure reported by the backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Lifecycle state of a recording context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Constructed, command list not created yet.
    Uninitialized,
    /// Pooled and ready to begin.
    Idle,
    /// Owned by a thread and accepting commands.
    Recording,
    /// Submitted for the last time, about to return to the pool.
    Finished,
}

/// Convenience result alias.
pub type Result<T, E = RecordingError> = std::result::Result<T, E>;
