//! Point-in-time snapshot of a scanner pipeline

use barscan_core::{CaptureState, EventBus, EventName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Subscribers per bus event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberCounts {
    /// `frameCaptured` subscribers
    pub frame_captured: usize,
    /// `shutdown` subscribers
    pub shutdown: usize,
    /// `stateChanged` subscribers
    pub state_changed: usize,
}

impl SubscriberCounts {
    /// Count the current subscribers of `bus`
    pub fn from_bus(bus: &EventBus) -> Self {
        Self {
            frame_captured: bus.subscriber_count(EventName::FrameCaptured),
            shutdown: bus.subscriber_count(EventName::Shutdown),
            state_changed: bus.subscriber_count(EventName::StateChanged),
        }
    }
}

/// Counters and state of one scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Capture state at the time of the snapshot
    pub state: CaptureState,
    /// Name of the media host in use
    pub host: String,
    /// Running session, if any
    pub session_id: Option<String>,
    /// Sessions started since construction
    pub sessions_started: u64,
    /// Frames published on the bus
    pub frames_emitted: u64,
    /// Frames drawn by the display
    pub frames_rendered: u64,
    /// Frames the display ignored after shutting down
    pub late_frames_ignored: u64,
    /// Device handles released, late grants included
    pub device_releases: u64,
    /// Grants that arrived after a stop and were released at once
    pub late_grants_released: u64,
    /// Reason of the last shutdown, if capture failed
    pub last_shutdown_reason: Option<String>,
    /// Bus subscribers per event
    pub subscribers: SubscriberCounts,
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
}

impl PipelineReport {
    /// Empty report for `host` in state `state`
    pub fn new(state: CaptureState, host: impl Into<String>) -> Self {
        Self {
            state,
            host: host.into(),
            session_id: None,
            sessions_started: 0,
            frames_emitted: 0,
            frames_rendered: 0,
            late_frames_ignored: 0,
            device_releases: 0,
            late_grants_released: 0,
            last_shutdown_reason: None,
            subscribers: SubscriberCounts::default(),
            generated_at: Utc::now(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Frames published but neither drawn nor ignored by the display
    pub fn frames_unaccounted(&self) -> u64 {
        self.frames_emitted
            .saturating_sub(self.frames_rendered + self.late_frames_ignored)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {}: {} emitted, {} rendered, {} release(s)",
            self.state, self.host, self.frames_emitted, self.frames_rendered, self.device_releases
        )?;
        if let Some(reason) = &self.last_shutdown_reason {
            write!(f, ", shut down ({})", reason)?;
        }
        Ok(())
    }
}
