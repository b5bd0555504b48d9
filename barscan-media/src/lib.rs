//! # barscan media
//!
//! Camera acquisition, fixed-rate frame extraction and display for the
//! barscan pipeline. Hosts provide camera streams, the capture source turns
//! them into `frameCaptured` events on the shared bus, and the display sink
//! draws those frames for the user.

#![warn(clippy::all)]

pub mod capture_source;
pub mod display;
pub mod error;
pub mod host;
pub mod scheduler;

// Re-export main types
pub use capture_source::{CaptureConfig, CaptureSource, CaptureStats, StartOutcome, StopOutcome};
pub use display::{stretch_to_fill, Container, DisplaySink, HeadlessContainer};
pub use error::{AcquireError, AcquireResult};
pub use host::{
    detect_host, FixtureBehavior, FixtureHost, FixtureStats, MediaConstraints, MediaHost,
    MediaStream, UnavailableHost,
};
pub use scheduler::{FrameScheduler, DEFAULT_CAPTURE_INTERVAL};

#[cfg(feature = "native-camera")]
pub use host::NativeCameraHost;
