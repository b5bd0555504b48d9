//! # barscan core
//!
//! Shared building blocks for the barscan capture pipeline: frames, lifecycle
//! events, the typed event bus connecting the capture source to its
//! consumers, and the cancellation token re-exported from `tokio-util` that
//! device acquisition listens to.

#![deny(missing_debug_implementations)]
#![warn(clippy::all)]

pub mod bus;
pub mod error;
pub mod event;
pub mod frame;

// Re-export main types
pub use bus::{Delivery, EventBus, HandlerResult, Subscription};
pub use tokio_util::sync::CancellationToken;
pub use error::{CaptureError, CaptureResult, ErrorCategory};
pub use event::{CaptureState, EventName, ShutdownEvent};
pub use frame::{Frame, FrameEvent};
