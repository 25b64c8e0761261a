//! Error types for the bucketing subsystem.

use thiserror::Error;

/// Errors surfaced to the scene compilation layer.
///
/// Running out of slots in one particular bin is not an error: the caller
/// simply lands in another bin. Only content that can never fit, or handles
/// that no longer name a live bucket, are reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BinError {
    #[error("light combination needs {required} slots but the device only has {max_lights}")]
    CapacityExceeded { required: usize, max_lights: usize },
    #[error("bin has no room for the requested light combination")]
    BinFull,
    #[error("stale or unknown {0} handle")]
    InvalidHandle(&'static str),
    #[error("a light cannot change its kind after creation")]
    LightKindChanged,
    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type BinResult<T> = Result<T, BinError>;
