//! Error types for barscan
//!
//! Only [`CaptureError::DeviceUnavailable`] is ever shown to a user. The guard
//! variants describe situations the capture lifecycle recovers from locally;
//! they are logged and surfaced on the debug channel but never returned from
//! `start()` or `stop()`.

use thiserror::Error;

/// Main error type for barscan operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No camera, permission denied or host capture API absent
    #[error("No webcam available to capture from: {reason}")]
    DeviceUnavailable {
        /// Host error class name, e.g. `NotAllowedError`
        reason: String,
    },

    /// `start()` called while a session is acquiring or running
    #[error("Capture already active, start ignored")]
    DoubleStart,

    /// `stop()` called while idle
    #[error("Capture not running, stop ignored")]
    StopWithoutStart,

    /// A grant arrived after the request was stopped; the handle was released
    #[error("Device granted after stop, handle released")]
    LateGrantAfterStop,

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// The test fixture image could not be loaded
    #[error("Failed to load fixture {path}: {reason}")]
    FixtureLoad {
        /// Fixture location as configured
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Component construction failed
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// A bus subscriber failed while handling an event
    #[error("Subscriber for {event} failed: {message}")]
    Subscriber {
        /// Event name
        event: String,
        /// Error message
        message: String,
    },
}

/// Result type alias for barscan operations
pub type CaptureResult<T> = Result<T, CaptureError>;

impl CaptureError {
    /// Whether the error is rendered to the user as a disabled widget
    pub fn is_user_visible(&self) -> bool {
        matches!(self, CaptureError::DeviceUnavailable { .. })
    }

    /// Text published as the `shutdown` reason: the host error class for
    /// device failures, the full message otherwise
    pub fn shutdown_reason(&self) -> String {
        match self {
            CaptureError::DeviceUnavailable { reason } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Check if the lifecycle recovers from the error without reconstruction
    pub fn is_recoverable(&self) -> bool {
        match self {
            CaptureError::DeviceUnavailable { .. } => false,
            CaptureError::DoubleStart => true,
            CaptureError::StopWithoutStart => true,
            CaptureError::LateGrantAfterStop => true,
            CaptureError::Subscriber { .. } => true,
            CaptureError::InvalidConfiguration { .. } => false,
            CaptureError::FixtureLoad { .. } => false,
            CaptureError::Initialization { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::DeviceUnavailable { .. } => ErrorCategory::Device,
            CaptureError::DoubleStart => ErrorCategory::Guard,
            CaptureError::StopWithoutStart => ErrorCategory::Guard,
            CaptureError::LateGrantAfterStop => ErrorCategory::Guard,
            CaptureError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            CaptureError::FixtureLoad { .. } => ErrorCategory::Configuration,
            CaptureError::Initialization { .. } => ErrorCategory::System,
            CaptureError::Subscriber { .. } => ErrorCategory::Dispatch,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Camera acquisition failures
    Device,
    /// Lifecycle misuse handled locally as a no-op
    Guard,
    /// Configuration and parameter errors
    Configuration,
    /// Runtime or environment errors
    System,
    /// Event delivery errors
    Dispatch,
}
