//! # barscan
//!
//! Camera capture lifecycle for a barcode scanner widget. The scanner asks
//! the host for a camera, samples it at a fixed rate (every 40 ms by default)
//! and publishes each picture as a `frameCaptured` event. A display sink draws
//! the frames, and a denied or lost camera ends in a single `shutdown` event
//! that disables the widget.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use barscan::{HeadlessContainer, Scanner, ScannerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), barscan::CaptureError> {
//!     let config = ScannerConfig::from_data_attributes([
//!         ("data-autostart", "1"),
//!         ("data-test", "fixtures/code.png"),
//!     ])?;
//!     let scanner = Scanner::new(config, Arc::new(HeadlessContainer::new(320, 240)))?;
//!
//!     scanner.bus().on_frame_captured(|event| {
//!         println!("frame {} ({}x{})", event.sequence, event.frame.width(), event.frame.height());
//!         Ok(())
//!     });
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     scanner.stop();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use barscan_core::{
    CancellationToken, CaptureError, CaptureResult, CaptureState, Delivery, ErrorCategory, EventBus,
    EventName, Frame, FrameEvent, HandlerResult, ShutdownEvent, Subscription,
};

pub use barscan_media::{
    detect_host, AcquireError, CaptureConfig, CaptureSource, CaptureStats, Container,
    DisplaySink, FixtureBehavior, FixtureHost, HeadlessContainer, MediaConstraints, MediaHost,
    MediaStream, StartOutcome, StopOutcome, UnavailableHost, DEFAULT_CAPTURE_INTERVAL,
};

#[cfg(feature = "native-camera")]
pub use barscan_media::NativeCameraHost;

pub use barscan_diagnostics::{
    init_logging, DebugChannel, DebugKind, DebugMessage, PipelineReport,
};

// Public API modules
pub mod config;
pub mod controller;

// Re-export main API types
pub use config::ScannerConfig;
pub use controller::Scanner;
