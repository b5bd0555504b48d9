//! Camera host adapters
//!
//! A [`MediaHost`] is the one place the pipeline asks for a camera. Hosts are
//! picked once at startup by [`detect_host`]; the capture source only ever sees
//! the uniform acquisition interface.

pub mod fixture;
#[cfg(feature = "native-camera")]
pub mod native;

use async_trait::async_trait;
use barscan_core::{CancellationToken, CaptureResult, Frame};
use std::sync::Arc;
use tracing::info;

use crate::error::{AcquireError, AcquireResult};

pub use fixture::{FixtureBehavior, FixtureHost, FixtureStats};
#[cfg(feature = "native-camera")]
pub use native::NativeCameraHost;

/// What is requested from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
    /// Preferred picture size, hosts may ignore it
    pub ideal_size: Option<(u32, u32)>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: false,
            ideal_size: None,
        }
    }
}

/// A granted camera stream
///
/// Behaves like a playing video element: [`MediaStream::current_frame`]
/// returns whatever picture is showing right now.
pub trait MediaStream: Send + Sync {
    /// Human readable device label
    fn label(&self) -> &str;

    fn track_count(&self) -> usize;

    /// Current picture. `Ok(None)` until the first frame is decoded; an error
    /// means the stream died and will not recover.
    fn current_frame(&self) -> AcquireResult<Option<Frame>>;

    /// Stop every track of the stream
    fn stop_tracks(&self);
}

/// Source of camera streams
#[async_trait]
pub trait MediaHost: Send + Sync {
    fn name(&self) -> &str;

    /// Request a camera stream. May suspend indefinitely while the host waits
    /// for a permission decision; implementations should give up with
    /// [`AcquireError::Aborted`] once `cancel` fires.
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
        cancel: CancellationToken,
    ) -> AcquireResult<Arc<dyn MediaStream>>;
}

/// Host used when no capture API is available
#[derive(Debug, Clone)]
pub struct UnavailableHost {
    platform: String,
}

impl UnavailableHost {
    pub fn new() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl Default for UnavailableHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaHost for UnavailableHost {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
        _cancel: CancellationToken,
    ) -> AcquireResult<Arc<dyn MediaStream>> {
        Err(AcquireError::NotSupported {
            platform: self.platform.clone(),
        })
    }
}

/// Pick the host for this process
///
/// A configured fixture always wins so tests stay deterministic. Otherwise the
/// native camera is used when compiled in, and everything else gets a host
/// that denies every request.
pub fn detect_host(fixture: Option<&str>) -> CaptureResult<Arc<dyn MediaHost>> {
    if let Some(location) = fixture {
        let host = FixtureHost::load(location)?;
        info!("Using fixture host ({})", location);
        return Ok(Arc::new(host));
    }

    #[cfg(feature = "native-camera")]
    {
        info!("Using native camera host");
        Ok(Arc::new(NativeCameraHost::new(0)))
    }

    #[cfg(not(feature = "native-camera"))]
    {
        info!("No camera backend compiled in, capture unavailable");
        Ok(Arc::new(UnavailableHost::new()))
    }
}
