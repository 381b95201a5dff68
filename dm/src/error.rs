//! Error type shared by all registry and lifecycle operations.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DmError {
    /// Routine "zero results" outcome of a lookup. Not logged.
    #[error("no matching uclass or device")]
    NotFound,
    /// The model has not been initialized yet. Distinct from [DmError::NotFound]
    /// so early callers can tell "too early" apart from "nothing there".
    #[error("driver model not initialized")]
    Uninitialized,
    /// A uclass id has no registered [crate::UclassDriver]. Always a build
    /// or registration bug, so it gets its own loud variant.
    #[error("no uclass driver registered for the requested uclass id")]
    MissingUclassDriver,
    /// The operation is refused in the device's current state, e.g. an
    /// unbind attempt on a probed device or a vetoed `pre_unbind`.
    #[error("device busy")]
    Busy,
    /// Failure reported by a driver or uclass hook.
    #[error("driver error: {0}")]
    Driver(&'static str),
}
