//! The scanner widget
//!
//! [`Scanner`] wires one display and one capture source to a shared bus and
//! container. Construction order matters: the display subscribes before the
//! capture source exists, so no frame can be published without a renderer.

use barscan_core::{CaptureResult, CaptureState, EventBus, Subscription};
use barscan_diagnostics::{DebugChannel, DebugKind, PipelineReport, SubscriberCounts};
use barscan_media::{
    detect_host, CaptureSource, Container, DisplaySink, MediaHost, StartOutcome, StopOutcome,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ScannerConfig;

/// Camera scanner: capture, display and debug output for one container
pub struct Scanner {
    config: ScannerConfig,
    bus: EventBus,
    display: Arc<DisplaySink>,
    source: Arc<CaptureSource>,
    debug: Arc<DebugChannel>,
    state: Arc<watch::Sender<CaptureState>>,
    last_shutdown: Arc<Mutex<Option<String>>>,
    subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("source", &self.source)
            .field("display", &self.display)
            .finish()
    }
}

impl Scanner {
    /// Build a scanner, probing for a camera host
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: ScannerConfig, container: Arc<dyn Container>) -> CaptureResult<Self> {
        config.validate()?;
        let host = detect_host(config.test_fixture.as_deref())?;
        Self::with_host(config, container, host)
    }

    /// Build a scanner on an explicit host
    pub fn with_host(
        config: ScannerConfig,
        container: Arc<dyn Container>,
        host: Arc<dyn MediaHost>,
    ) -> CaptureResult<Self> {
        config.validate()?;

        let bus = EventBus::new();
        let size = config.display_size(container.width(), container.height());
        let display = DisplaySink::new(bus.clone(), container, size.0, size.1)?;
        let source = Arc::new(CaptureSource::new(
            host,
            bus.clone(),
            config.capture_config(size),
        )?);
        let debug = Arc::new(DebugChannel::new(config.debug));
        let (state, _) = watch::channel(CaptureState::Idle);
        let state = Arc::new(state);
        let last_shutdown = Arc::new(Mutex::new(None));

        let mut subscriptions = Vec::with_capacity(2);
        {
            let state = state.clone();
            let debug = debug.clone();
            subscriptions.push(bus.on_state_changed(move |next| {
                let previous = state.send_replace(*next);
                if previous != *next {
                    debug.transition(previous, *next);
                }
                Ok(())
            }));
        }
        {
            let debug = debug.clone();
            let last_shutdown = last_shutdown.clone();
            subscriptions.push(bus.on_shutdown(move |event| {
                *last_shutdown.lock() = Some(event.reason.clone());
                debug.shutdown(&event.reason);
                Ok(())
            }));
        }

        {
            let source = Arc::downgrade(&source);
            let debug = debug.clone();
            display.set_toggle_handler(move || {
                if let Some(source) = source.upgrade() {
                    toggle_source(&source, &debug);
                }
            });
        }

        let scanner = Self {
            config,
            bus,
            display,
            source,
            debug,
            state,
            last_shutdown,
            subscriptions,
        };

        info!(
            "Scanner ready on {} host ({}x{})",
            scanner.source.host_name(),
            size.0,
            size.1
        );

        if scanner.config.autostart {
            scanner.start();
        }
        Ok(scanner)
    }

    /// Request the camera
    pub fn start(&self) -> StartOutcome {
        start_source(&self.source, &self.debug)
    }

    /// Stop capturing and release the camera
    pub fn stop(&self) -> StopOutcome {
        stop_source(&self.source, &self.debug)
    }

    /// Activate the toggle control, as a user click would
    ///
    /// Returns `false` once the toggle was removed by a shutdown.
    pub fn toggle(&self) -> bool {
        self.display.activate_toggle()
    }

    /// Whether a session holds the camera
    pub fn is_capturing(&self) -> bool {
        self.source.is_capturing()
    }

    /// Current capture state
    pub fn state(&self) -> CaptureState {
        self.source.state()
    }

    /// Receiver of every published state change
    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Wait until the published state equals `target`
    pub async fn wait_for_state(&self, target: CaptureState) -> CaptureState {
        let mut receiver = self.watch_state();
        loop {
            let current = *receiver.borrow_and_update();
            if current == target {
                return current;
            }
            if receiver.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// The bus shared by every component of this scanner
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The display sink
    pub fn display(&self) -> &Arc<DisplaySink> {
        &self.display
    }

    /// The capture source
    pub fn source(&self) -> &Arc<CaptureSource> {
        &self.source
    }

    /// The debug channel, disabled unless `debug` is configured
    pub fn debug_channel(&self) -> &DebugChannel {
        &self.debug
    }

    /// Active configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Snapshot of counters and state
    pub fn report(&self) -> PipelineReport {
        let stats = self.source.stats();
        let mut report = PipelineReport::new(self.state(), self.source.host_name());
        report.session_id = self.source.session_id().map(|id| id.to_string());
        report.sessions_started = stats.sessions_started;
        report.frames_emitted = stats.frames_emitted;
        report.frames_rendered = self.display.frames_rendered();
        report.late_frames_ignored = self.display.late_frames_ignored();
        report.device_releases = stats.device_releases;
        report.late_grants_released = stats.late_grants_released;
        report.last_shutdown_reason = self.last_shutdown.lock().clone();
        report.subscribers = SubscriberCounts::from_bus(&self.bus);
        report
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.source.stop();
        for subscription in &self.subscriptions {
            self.bus.unsubscribe(subscription);
        }
    }
}

fn start_source(source: &CaptureSource, debug: &DebugChannel) -> StartOutcome {
    let outcome = source.start();
    match outcome {
        StartOutcome::Requested => {}
        StartOutcome::AlreadyActive => {
            debug.emit(DebugKind::Guard, "start ignored: capture already active");
        }
        StartOutcome::Failed => {
            debug.emit(DebugKind::Guard, "start ignored: capture failed");
        }
    }
    outcome
}

fn stop_source(source: &CaptureSource, debug: &DebugChannel) -> StopOutcome {
    let outcome = source.stop();
    if outcome == StopOutcome::NotRunning {
        debug.emit(DebugKind::Guard, "stop ignored: capture not running");
    }
    outcome
}

/// Stop a pending or running capture, start anything else
fn toggle_source(source: &CaptureSource, debug: &DebugChannel) {
    let state = source.state();
    debug!("Toggle activated in state {}", state);
    if state.is_active() {
        stop_source(source, debug);
    } else {
        start_source(source, debug);
    }
}
