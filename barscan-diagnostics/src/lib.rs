//! # barscan diagnostics
//!
//! Debugging aids for the barscan pipeline: the user-facing debug channel,
//! tracing subscriber setup and serializable pipeline reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_channel;
pub mod debug_logger;
pub mod pipeline_report;

// Re-export main types
pub use debug_channel::{DebugChannel, DebugKind, DebugMessage, DEBUG_ON};
pub use debug_logger::{init_logging, DebugLogger};
pub use pipeline_report::{PipelineReport, SubscriberCounts};
