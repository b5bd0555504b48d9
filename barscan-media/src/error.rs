//! Host acquisition error types
//!
//! Camera hosts report failures by class, the same way browsers name their
//! `getUserMedia` rejections. The class name becomes the shutdown reason.

use barscan_core::CaptureError;
use thiserror::Error;

/// Failure reported by a [`MediaHost`](crate::host::MediaHost)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The user or platform refused camera access
    #[error("Permission denied: {message}")]
    NotAllowed {
        /// Host message
        message: String,
    },

    /// No camera matching the constraints exists
    #[error("Device not found: {message}")]
    NotFound {
        /// Host message
        message: String,
    },

    /// The camera exists but could not be opened or stopped delivering
    #[error("Device not readable: {message}")]
    NotReadable {
        /// Host message
        message: String,
    },

    /// The host has no capture API at all
    #[error("Capture not supported on {platform}")]
    NotSupported {
        /// Platform description
        platform: String,
    },

    /// The request was cancelled before the host answered
    #[error("Acquisition aborted")]
    Aborted,

    /// Any other host failure, carrying its class name
    #[error("{name}: {message}")]
    Other {
        /// Error class name
        name: String,
        /// Host message
        message: String,
    },
}

/// Result type alias for host operations
pub type AcquireResult<T> = Result<T, AcquireError>;

impl AcquireError {
    /// Error class name used as the shutdown reason
    pub fn name(&self) -> &str {
        match self {
            AcquireError::NotAllowed { .. } => "NotAllowedError",
            AcquireError::NotFound { .. } => "NotFoundError",
            AcquireError::NotReadable { .. } => "NotReadableError",
            AcquireError::NotSupported { .. } => "NotSupportedError",
            AcquireError::Aborted => "AbortError",
            AcquireError::Other { name, .. } => name,
        }
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        AcquireError::NotAllowed {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AcquireError::NotFound {
            message: message.into(),
        }
    }

    pub fn not_readable(message: impl Into<String>) -> Self {
        AcquireError::NotReadable {
            message: message.into(),
        }
    }
}

impl From<AcquireError> for CaptureError {
    fn from(error: AcquireError) -> Self {
        CaptureError::DeviceUnavailable {
            reason: error.name().to_string(),
        }
    }
}
