//! Lifecycle events carried on the event bus

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal signal for a capture session that could not continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownEvent {
    /// Host error class name, e.g. `NotAllowedError`
    pub reason: String,
}

impl ShutdownEvent {
    /// Message shown in place of the display surface
    pub const USER_MESSAGE: &'static str = "No webcam available to capture from.";

    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// User-facing notice including the reason
    pub fn notice(&self) -> String {
        format!("{} ({})", Self::USER_MESSAGE, self.reason)
    }
}

/// Capture lifecycle state
///
/// `Failed` is terminal: the widget must be rebuilt to capture again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    /// Constructed or stopped, not capturing
    Idle,
    /// `start()` called, waiting for the host to grant or deny the camera
    Acquiring,
    /// Camera granted and frames are being scheduled
    Capturing,
    /// Acquisition denied or the stream died
    Failed,
}

impl CaptureState {
    /// Whether a session is pending or running
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::Acquiring | CaptureState::Capturing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Failed)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "Idle",
            CaptureState::Acquiring => "Acquiring",
            CaptureState::Capturing => "Capturing",
            CaptureState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Named events of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    FrameCaptured,
    Shutdown,
    StateChanged,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::FrameCaptured => "frameCaptured",
            EventName::Shutdown => "shutdown",
            EventName::StateChanged => "stateChanged",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
