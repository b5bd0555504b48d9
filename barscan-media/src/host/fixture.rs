//! Deterministic host serving a still image instead of a camera
//!
//! Used when a test fixture is configured. Every frame of a granted stream is
//! the very same [`Frame`], so consumers can check identity with
//! [`Frame::ptr_eq`].

use async_trait::async_trait;
use barscan_core::{CancellationToken, CaptureError, CaptureResult, Frame};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{MediaConstraints, MediaHost, MediaStream};
use crate::error::{AcquireError, AcquireResult};

/// How the fixture host answers acquisition requests
#[derive(Debug, Clone)]
pub enum FixtureBehavior {
    /// Grant as soon as asked
    Grant,
    /// Grant after a delay, unless cancelled first
    GrantAfter(Duration),
    /// Deny every request with the given error
    Deny(AcquireError),
    /// Never answer; resolve only when cancelled
    HoldUntilCancelled,
}

/// Counters shared by a fixture host and every stream it granted
#[derive(Debug, Default)]
pub struct FixtureStats {
    acquisitions: AtomicUsize,
    grants: AtomicUsize,
    aborted: AtomicUsize,
    release_calls: AtomicUsize,
    streams_ended: AtomicBool,
}

impl FixtureStats {
    /// Requests received
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Streams handed out
    pub fn grants(&self) -> usize {
        self.grants.load(Ordering::SeqCst)
    }

    /// Requests that gave up because they were cancelled
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Calls to [`MediaStream::stop_tracks`] across all streams
    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Streams granted and not yet released
    pub fn live_streams(&self) -> usize {
        self.grants().saturating_sub(self.release_calls())
    }
}

/// Host backed by a still image
#[derive(Debug, Clone)]
pub struct FixtureHost {
    frame: Frame,
    behavior: FixtureBehavior,
    stats: Arc<FixtureStats>,
}

impl FixtureHost {
    pub fn new(frame: Frame) -> Self {
        Self::with_behavior(frame, FixtureBehavior::Grant)
    }

    pub fn with_behavior(frame: Frame, behavior: FixtureBehavior) -> Self {
        Self {
            frame,
            behavior,
            stats: Arc::new(FixtureStats::default()),
        }
    }

    /// Host that denies every request
    pub fn denying(frame: Frame, error: AcquireError) -> Self {
        Self::with_behavior(frame, FixtureBehavior::Deny(error))
    }

    /// Decode an image file; `file://` URLs are accepted
    pub fn load(location: &str) -> CaptureResult<Self> {
        let path = location.strip_prefix("file://").unwrap_or(location);
        let image = image::open(Path::new(path)).map_err(|e| CaptureError::FixtureLoad {
            path: location.to_string(),
            reason: e.to_string(),
        })?;

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let frame = Frame::from_rgba(width, height, rgba.into_raw())?;
        debug!("Loaded fixture {} ({}x{})", location, width, height);

        Ok(Self::new(frame))
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn stats(&self) -> Arc<FixtureStats> {
        self.stats.clone()
    }

    /// Make every granted stream report a dead track on its next read
    pub fn end_streams(&self) {
        self.stats.streams_ended.store(true, Ordering::SeqCst);
    }

    fn aborted(&self) -> AcquireError {
        self.stats.aborted.fetch_add(1, Ordering::SeqCst);
        AcquireError::Aborted
    }
}

#[async_trait]
impl MediaHost for FixtureHost {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
        cancel: CancellationToken,
    ) -> AcquireResult<Arc<dyn MediaStream>> {
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            FixtureBehavior::Grant => {}
            FixtureBehavior::GrantAfter(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(*delay) => {}
                    _ = cancel.cancelled() => return Err(self.aborted()),
                }
            }
            FixtureBehavior::Deny(error) => return Err(error.clone()),
            FixtureBehavior::HoldUntilCancelled => {
                cancel.cancelled().await;
                return Err(self.aborted());
            }
        }

        self.stats.grants.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixtureStream {
            frame: self.frame.clone(),
            stopped: AtomicBool::new(false),
            stats: self.stats.clone(),
        }))
    }
}

struct FixtureStream {
    frame: Frame,
    stopped: AtomicBool,
    stats: Arc<FixtureStats>,
}

impl MediaStream for FixtureStream {
    fn label(&self) -> &str {
        "fixture"
    }

    fn track_count(&self) -> usize {
        1
    }

    fn current_frame(&self) -> AcquireResult<Option<Frame>> {
        if self.stats.streams_ended.load(Ordering::SeqCst) {
            return Err(AcquireError::not_readable("fixture track ended"));
        }
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.frame.clone()))
    }

    fn stop_tracks(&self) {
        self.stats.release_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}
