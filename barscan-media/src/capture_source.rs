//! Camera capture lifecycle
//!
//! [`CaptureSource`] owns the camera handle. `start()` hands the acquisition
//! to the runtime and returns immediately; the grant or denial is applied
//! when the host answers. Every request carries a generation number and a
//! [`CancellationToken`]: if `stop()` ran in the meantime the answer is stale, and a
//! stale grant is released on the spot instead of starting a session.
//!
//! A granted session publishes its first frame immediately and then one
//! every interval.
//!
//! Stopping always runs in this order: cancel the scheduler, release the
//! tracks, clear the running flag. A `shutdown` event is only published once
//! the flag is clear.

use barscan_core::{
    CancellationToken, CaptureError, CaptureResult, CaptureState, EventBus, FrameEvent,
    ShutdownEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::error::{AcquireError, AcquireResult};
use crate::host::{MediaConstraints, MediaHost, MediaStream};
use crate::scheduler::{FrameScheduler, DEFAULT_CAPTURE_INTERVAL};

/// Capture source configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time between two frame extractions
    pub interval: Duration,
    pub constraints: MediaConstraints,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            constraints: MediaConstraints::default(),
        }
    }
}

impl CaptureConfig {
    /// Validate configuration
    pub fn validate(&self) -> CaptureResult<()> {
        if self.interval.is_zero() {
            return Err(CaptureError::InvalidConfiguration {
                message: "capture interval must be > 0".to_string(),
            });
        }

        if !self.constraints.video {
            return Err(CaptureError::InvalidConfiguration {
                message: "video must be requested".to_string(),
            });
        }

        Ok(())
    }
}

/// Result of [`CaptureSource::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A camera request is now pending
    Requested,
    /// A session was already acquiring, running or stopping; nothing changed
    AlreadyActive,
    /// The source failed earlier and cannot start again
    Failed,
}

/// Result of [`CaptureSource::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A running session was stopped and its device released
    Stopped,
    /// A pending camera request was abandoned
    AcquisitionCancelled,
    /// Nothing was running
    NotRunning,
}

/// Counters for one capture source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub sessions_started: u64,
    pub frames_emitted: u64,
    pub device_releases: u64,
    pub late_grants_released: u64,
    pub ticks: u64,
}

/// A granted camera and the moment it was granted
struct CaptureSession {
    id: Uuid,
    stream: Arc<dyn MediaStream>,
    started_at: Instant,
}

enum SourceState {
    Idle,
    Acquiring { generation: u64, cancel: CancellationToken },
    Running(CaptureSession),
    /// `stop()` took the session and is releasing it
    Stopping,
    Failed(CaptureError),
}

struct SourceInner {
    host: Arc<dyn MediaHost>,
    bus: EventBus,
    scheduler: FrameScheduler,
    runtime: Handle,
    constraints: MediaConstraints,
    state: Mutex<SourceState>,
    generation: AtomicU64,
    sessions_started: AtomicU64,
    frames_emitted: AtomicU64,
    device_releases: AtomicU64,
    late_grants: AtomicU64,
}

/// Owner of the camera handle and the running flag
pub struct CaptureSource {
    inner: Arc<SourceInner>,
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSource")
            .field("host", &self.inner.host.name())
            .field("state", &self.state())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl CaptureSource {
    /// Create a capture source on the current tokio runtime
    pub fn new(
        host: Arc<dyn MediaHost>,
        bus: EventBus,
        config: CaptureConfig,
    ) -> CaptureResult<Self> {
        config.validate()?;

        let runtime = Handle::try_current().map_err(|e| CaptureError::Initialization {
            reason: format!("capture source needs a tokio runtime: {}", e),
        })?;

        Ok(Self {
            inner: Arc::new(SourceInner {
                host,
                bus,
                scheduler: FrameScheduler::new(config.interval, runtime.clone()),
                runtime,
                constraints: config.constraints,
                state: Mutex::new(SourceState::Idle),
                generation: AtomicU64::new(0),
                sessions_started: AtomicU64::new(0),
                frames_emitted: AtomicU64::new(0),
                device_releases: AtomicU64::new(0),
                late_grants: AtomicU64::new(0),
            }),
        })
    }

    /// Request the camera without waiting for the answer
    pub fn start(&self) -> StartOutcome {
        let (generation, cancel) = {
            let mut state = self.inner.state.lock();
            match &*state {
                SourceState::Idle => {}
                SourceState::Failed(error) => {
                    debug!("Ignoring start, capture failed earlier ({})", error);
                    return StartOutcome::Failed;
                }
                _ => {
                    debug!("{}", CaptureError::DoubleStart);
                    return StartOutcome::AlreadyActive;
                }
            }

            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = CancellationToken::new();
            *state = SourceState::Acquiring {
                generation,
                cancel: cancel.clone(),
            };
            (generation, cancel)
        };

        info!(
            "Requesting camera from {} host (request {})",
            self.inner.host.name(),
            generation
        );
        self.inner.bus.emit_state_changed(CaptureState::Acquiring);

        let inner = self.inner.clone();
        self.inner.runtime.spawn(async move {
            let result = tokio::select! {
                biased;
                result = inner.host.acquire(&inner.constraints, cancel.clone()) => result,
                _ = cancel.cancelled() => Err(AcquireError::Aborted),
            };
            inner.resolve(generation, result);
        });

        StartOutcome::Requested
    }

    /// Stop capturing and release the camera
    ///
    /// When this returns no further frame will be published for the session.
    pub fn stop(&self) -> StopOutcome {
        let session = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, SourceState::Idle) {
                SourceState::Running(session) => {
                    *state = SourceState::Stopping;
                    session
                }
                SourceState::Acquiring { generation, cancel } => {
                    drop(state);
                    cancel.cancel();
                    info!("Camera request {} cancelled", generation);
                    self.inner.bus.emit_state_changed(CaptureState::Idle);
                    return StopOutcome::AcquisitionCancelled;
                }
                other => {
                    *state = other;
                    debug!("{}", CaptureError::StopWithoutStart);
                    return StopOutcome::NotRunning;
                }
            }
        };

        self.inner.scheduler.cancel();
        let id = session.id;
        let uptime = session.started_at.elapsed();
        self.inner.release(session);
        *self.inner.state.lock() = SourceState::Idle;

        info!(session = %id, "Capture stopped after {:?}", uptime);
        self.inner.bus.emit_state_changed(CaptureState::Idle);
        StopOutcome::Stopped
    }

    /// Whether a session holds the camera
    pub fn is_capturing(&self) -> bool {
        matches!(
            &*self.inner.state.lock(),
            SourceState::Running(_) | SourceState::Stopping
        )
    }

    pub fn state(&self) -> CaptureState {
        match &*self.inner.state.lock() {
            SourceState::Idle => CaptureState::Idle,
            SourceState::Acquiring { .. } => CaptureState::Acquiring,
            SourceState::Running(_) | SourceState::Stopping => CaptureState::Capturing,
            SourceState::Failed(_) => CaptureState::Failed,
        }
    }

    /// The failure that ended the source, if any
    pub fn failure(&self) -> Option<CaptureError> {
        match &*self.inner.state.lock() {
            SourceState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Shutdown reason of the failure that ended the source, if any
    pub fn failure_reason(&self) -> Option<String> {
        self.failure().map(|error| error.shutdown_reason())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match &*self.inner.state.lock() {
            SourceState::Running(session) => Some(session.id),
            _ => None,
        }
    }

    pub fn host_name(&self) -> &str {
        self.inner.host.name()
    }

    pub fn interval(&self) -> Duration {
        self.inner.scheduler.interval()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            sessions_started: self.inner.sessions_started.load(Ordering::SeqCst),
            frames_emitted: self.inner.frames_emitted.load(Ordering::SeqCst),
            device_releases: self.inner.device_releases.load(Ordering::SeqCst),
            late_grants_released: self.inner.late_grants.load(Ordering::SeqCst),
            ticks: self.inner.scheduler.tick_count(),
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        if self.state().is_active() {
            self.stop();
        }
    }
}

impl SourceInner {
    /// Apply the host's answer to request `generation`
    fn resolve(self: &Arc<Self>, generation: u64, result: AcquireResult<Arc<dyn MediaStream>>) {
        let mut state = self.state.lock();
        let current = matches!(
            &*state,
            SourceState::Acquiring { generation: pending, .. } if *pending == generation
        );

        if !current {
            drop(state);
            match result {
                Ok(stream) => {
                    debug!("{} (request {})", CaptureError::LateGrantAfterStop, generation);
                    stream.stop_tracks();
                    self.device_releases.fetch_add(1, Ordering::SeqCst);
                    self.late_grants.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => debug!("Stale camera request {} ended: {}", generation, e),
            }
            return;
        }

        match result {
            Ok(stream) => {
                let session = CaptureSession {
                    id: Uuid::new_v4(),
                    stream: stream.clone(),
                    started_at: Instant::now(),
                };
                let id = session.id;
                info!(
                    session = %id,
                    "Capture started on {} ({} track(s))",
                    stream.label(),
                    stream.track_count()
                );
                *state = SourceState::Running(session);
                drop(state);

                self.sessions_started.fetch_add(1, Ordering::SeqCst);
                self.bus.emit_state_changed(CaptureState::Capturing);

                // The first frame goes out right away, so tick only after the
                // state change, and only if no handler stopped the session.
                let state = self.state.lock();
                if matches!(&*state, SourceState::Running(session) if session.id == id) {
                    self.scheduler.start(self.tick_handler(id, stream));
                }
            }
            Err(error) => {
                warn!("Camera acquisition failed: {}", error);
                let error = CaptureError::from(error);
                let event = ShutdownEvent::new(error.shutdown_reason());
                *state = SourceState::Failed(error);
                drop(state);

                self.shut_down(&event);
            }
        }
    }

    fn tick_handler(
        self: &Arc<Self>,
        session: Uuid,
        stream: Arc<dyn MediaStream>,
    ) -> impl Fn(u64) + Send + Sync + 'static {
        let weak: Weak<SourceInner> = Arc::downgrade(self);
        move |sequence| {
            let Some(inner) = weak.upgrade() else {
                return;
            };

            match stream.current_frame() {
                Ok(Some(frame)) => {
                    let event = FrameEvent {
                        frame,
                        timestamp: Instant::now(),
                        sequence,
                    };
                    inner.frames_emitted.fetch_add(1, Ordering::SeqCst);
                    inner.bus.emit_frame_captured(&event);
                }
                Ok(None) => trace!("No picture yet on tick {}", sequence),
                Err(error) => inner.fail_running(session, error),
            }
        }
    }

    /// The running stream died: stop it and shut the source down
    fn fail_running(&self, session_id: Uuid, error: AcquireError) {
        let session = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SourceState::Stopping) {
                SourceState::Running(session) if session.id == session_id => session,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        self.scheduler.cancel();
        self.release(session);

        warn!(session = %session_id, "Capture stream failed: {}", error);
        let error = CaptureError::from(error);
        let event = ShutdownEvent::new(error.shutdown_reason());
        *self.state.lock() = SourceState::Failed(error);

        self.shut_down(&event);
    }

    /// Publish the terminal events; the state must already be `Failed`
    fn shut_down(&self, event: &ShutdownEvent) {
        let delivery = self.bus.emit_shutdown(event);
        for failure in &delivery.failures {
            debug!("Shutdown not handled: {}", failure);
        }
        self.bus.emit_state_changed(CaptureState::Failed);
    }

    fn release(&self, session: CaptureSession) {
        session.stream.stop_tracks();
        self.device_releases.fetch_add(1, Ordering::SeqCst);
        debug!(session = %session.id, "Released {}", session.stream.label());
    }
}
