//! Error types for the fluid solver
//!
//! Initialization errors abort setup, mapping errors indicate device loss and
//! are propagated to the caller of `step`. There are no retryable errors.

use crate::solver::{FieldKind, VolumeHandle};
use std::fmt;

/// Errors produced by the solver and its compute backends
#[derive(Debug, Clone, PartialEq)]
pub enum FluidError {
    /// No compatible GPU adapter was found
    NoAdapter,
    /// An adapter was found but the device could not be created
    DeviceInit {
        /// Name of the adapter that failed
        adapter: String,
        /// Driver error message
        message: String,
    },
    /// A volume, buffer or kernel could not be created
    ResourceCreation {
        /// Label of the resource being created
        resource: String,
        /// Backend error message
        message: String,
    },
    /// Settings failed validation
    InvalidSettings(String),
    /// A parameter block or readback buffer could not be mapped
    MapFailure {
        /// Name of the block or buffer
        block: &'static str,
    },
    /// The handle does not belong to this backend (or was released)
    UnknownVolume(VolumeHandle),
    /// The field cannot be written from the host
    ReadOnlyField(FieldKind),
    /// Host data length does not match the volume size
    SizeMismatch {
        /// Expected number of f32 values
        expected: usize,
        /// Provided number of f32 values
        actual: usize,
    },
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no compatible GPU adapter found"),
            Self::DeviceInit { adapter, message } => {
                write!(f, "failed to initialize device on '{adapter}': {message}")
            }
            Self::ResourceCreation { resource, message } => {
                write!(f, "failed to create {resource}: {message}")
            }
            Self::InvalidSettings(reason) => write!(f, "invalid settings: {reason}"),
            Self::MapFailure { block } => write!(f, "failed to map {block} buffer"),
            Self::UnknownVolume(handle) => write!(f, "unknown volume {handle}"),
            Self::ReadOnlyField(kind) => write!(f, "{kind:?} field is read-only"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected} values, got {actual}")
            }
        }
    }
}

impl std::error::Error for FluidError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = FluidError::MapFailure { block: "general" };
        assert_eq!(err.to_string(), "failed to map general buffer");

        let err = FluidError::SizeMismatch {
            expected: 8,
            actual: 4,
        };
        assert!(err.to_string().contains("expected 8"));
    }
}
