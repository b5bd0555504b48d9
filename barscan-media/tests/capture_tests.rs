//! Capture source lifecycle tests
//!
//! These run against the fixture host on a paused clock, so every interval
//! and grant delay is exact.

use barscan_core::{CaptureError, CaptureState, EventBus, Frame, FrameEvent, ShutdownEvent};
use barscan_media::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Recorder {
    frames: Arc<Mutex<Vec<FrameEvent>>>,
    shutdowns: Arc<Mutex<Vec<ShutdownEvent>>>,
    states: Arc<Mutex<Vec<CaptureState>>>,
}

impl Recorder {
    fn attach(bus: &EventBus) -> Self {
        let recorder = Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            shutdowns: Arc::new(Mutex::new(Vec::new())),
            states: Arc::new(Mutex::new(Vec::new())),
        };

        let frames = recorder.frames.clone();
        bus.on_frame_captured(move |event| {
            frames.lock().push(event.clone());
            Ok(())
        });
        let shutdowns = recorder.shutdowns.clone();
        bus.on_shutdown(move |event| {
            shutdowns.lock().push(event.clone());
            Ok(())
        });
        let states = recorder.states.clone();
        bus.on_state_changed(move |state| {
            states.lock().push(*state);
            Ok(())
        });

        recorder
    }

    fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

/// Subscribe a bare frame counter, independent of any [`Recorder`]
fn count_frames(bus: &EventBus) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    bus.on_frame_captured(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    count
}

fn fixture_frame() -> Frame {
    Frame::solid(16, 8, [255, 255, 255, 255]).unwrap()
}

fn source_with(host: Arc<FixtureHost>, bus: &EventBus) -> CaptureSource {
    CaptureSource::new(host, bus.clone(), CaptureConfig::default()).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// GRANT AND FRAME EMISSION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_emits_fixture_frames() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    assert_eq!(source.state(), CaptureState::Idle);
    assert_eq!(source.start(), StartOutcome::Requested);
    assert_eq!(source.state(), CaptureState::Acquiring);
    assert!(!source.is_capturing());

    settle().await;
    assert!(source.is_capturing());
    assert!(source.session_id().is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let frames = recorder.frames.lock();
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|event| event.frame.ptr_eq(host.frame())));
    assert_eq!(frames[0].sequence, 1);
    assert_eq!(
        *recorder.states.lock(),
        vec![CaptureState::Acquiring, CaptureState::Capturing]
    );
}

#[tokio::test(start_paused = true)]
async fn test_first_frame_follows_grant_immediately() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::with_behavior(
        fixture_frame(),
        FixtureBehavior::GrantAfter(Duration::from_millis(25)),
    ));
    let source = source_with(host, &bus);

    let started = tokio::time::Instant::now();
    source.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.frame_count(), 0);

    // Granted at 25 ms; the first frame does not wait for a full interval.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(recorder.frame_count(), 1);
    assert_eq!(recorder.frames.lock()[0].sequence, 1);

    // Then one frame per interval: 25, 65, 105 ms.
    tokio::time::sleep_until(started + Duration::from_millis(110)).await;
    assert_eq!(recorder.frame_count(), 3);
    source.stop();
}

#[tokio::test(start_paused = true)]
async fn test_double_start_is_a_no_op() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::with_behavior(
        fixture_frame(),
        FixtureBehavior::GrantAfter(Duration::from_millis(50)),
    ));
    let source = source_with(host.clone(), &bus);

    assert_eq!(source.start(), StartOutcome::Requested);
    assert_eq!(source.start(), StartOutcome::AlreadyActive);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(source.start(), StartOutcome::AlreadyActive);

    assert_eq!(host.stats().acquisitions(), 1);
    assert_eq!(host.stats().grants(), 1);
    assert_eq!(source.stats().sessions_started, 1);
}

// ============================================================================
// DENIAL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_denial_emits_exactly_one_shutdown() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::denying(
        fixture_frame(),
        AcquireError::not_allowed("user dismissed the prompt"),
    ));
    let source = source_with(host.clone(), &bus);

    source.start();
    settle().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!source.is_capturing());
    assert_eq!(source.state(), CaptureState::Failed);
    assert_eq!(
        *recorder.shutdowns.lock(),
        vec![ShutdownEvent::new("NotAllowedError")]
    );
    assert_eq!(recorder.frame_count(), 0);
    assert_eq!(source.stats().device_releases, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_frames_for_late_subscriber_after_denial() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::denying(
        fixture_frame(),
        AcquireError::not_allowed("user dismissed the prompt"),
    ));
    let source = source_with(host, &bus);

    source.start();
    settle().await;
    assert_eq!(source.state(), CaptureState::Failed);
    assert_eq!(
        source.failure(),
        Some(CaptureError::DeviceUnavailable {
            reason: "NotAllowedError".to_string()
        })
    );

    let late = count_frames(&bus);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert_eq!(source.stats().ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_published_after_running_cleared() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::denying(
        fixture_frame(),
        AcquireError::not_found("no camera"),
    ));
    let source = Arc::new(source_with(host, &bus));

    let observed = Arc::new(Mutex::new(None));
    {
        let source = Arc::downgrade(&source);
        let observed = observed.clone();
        bus.on_shutdown(move |_| {
            if let Some(source) = source.upgrade() {
                *observed.lock() = Some(source.is_capturing());
            }
            Ok(())
        });
    }

    source.start();
    settle().await;
    assert_eq!(*observed.lock(), Some(false));
}

// ============================================================================
// STOP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_frames_after_stop() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    source.start();
    settle().await;
    tokio::time::sleep(Duration::from_millis(130)).await;
    let before = recorder.frame_count();
    assert_eq!(before, 4);

    assert_eq!(source.stop(), StopOutcome::Stopped);
    assert!(!source.is_capturing());
    assert_eq!(source.state(), CaptureState::Idle);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.frame_count(), before);
    assert_eq!(host.stats().release_calls(), 1);
    assert_eq!(source.stats().device_releases, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_a_no_op() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    assert_eq!(source.stop(), StopOutcome::NotRunning);

    source.start();
    settle().await;
    assert_eq!(source.stop(), StopOutcome::Stopped);
    assert_eq!(source.stop(), StopOutcome::NotRunning);
    assert_eq!(host.stats().release_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_acquiring_cancels_request() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::with_behavior(
        fixture_frame(),
        FixtureBehavior::HoldUntilCancelled,
    ));
    let source = source_with(host.clone(), &bus);

    source.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.state(), CaptureState::Acquiring);

    assert_eq!(source.stop(), StopOutcome::AcquisitionCancelled);
    assert_eq!(source.state(), CaptureState::Idle);
    settle().await;

    assert_eq!(host.stats().aborted(), 1);
    assert!(recorder.shutdowns.lock().is_empty());

    // The source is usable again.
    let held = host.stats().acquisitions();
    assert_eq!(source.start(), StartOutcome::Requested);
    settle().await;
    assert_eq!(host.stats().acquisitions(), held + 1);
    source.stop();
}

#[tokio::test(start_paused = true)]
async fn test_late_grant_after_stop_is_released() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    // The fixture grants on first poll, before the cancellation is observed.
    source.start();
    assert_eq!(source.stop(), StopOutcome::AcquisitionCancelled);
    settle().await;

    assert!(!source.is_capturing());
    assert_eq!(source.state(), CaptureState::Idle);
    assert_eq!(host.stats().grants(), 1);
    assert_eq!(host.stats().release_calls(), 1);
    assert_eq!(host.stats().live_streams(), 0);
    assert_eq!(source.stats().late_grants_released, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.frame_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_state_tracks_latest_transition() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::with_behavior(
        fixture_frame(),
        FixtureBehavior::GrantAfter(Duration::from_millis(30)),
    ));
    let source = source_with(host.clone(), &bus);

    // start, stop, start before the first grant lands
    source.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    source.stop();
    source.start();
    assert_eq!(source.state(), CaptureState::Acquiring);
    assert!(!source.is_capturing());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(source.state(), CaptureState::Capturing);
    assert!(source.is_capturing());
    assert_eq!(host.stats().live_streams(), 1);

    source.stop();
    assert!(!source.is_capturing());
    assert_eq!(host.stats().live_streams(), 0);
}

// ============================================================================
// STREAM FAILURE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_dead_stream_shuts_down() {
    let bus = EventBus::new();
    let recorder = Recorder::attach(&bus);
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    source.start();
    settle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.frame_count(), 2);

    host.end_streams();
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(source.state(), CaptureState::Failed);
    assert!(!source.is_capturing());
    assert_eq!(
        *recorder.shutdowns.lock(),
        vec![ShutdownEvent::new("NotReadableError")]
    );
    assert_eq!(host.stats().release_calls(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.frame_count(), 2);
    assert_eq!(source.start(), StartOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_no_frames_for_late_subscriber_after_stream_loss() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    source.start();
    settle().await;
    host.end_streams();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(source.state(), CaptureState::Failed);
    assert_eq!(source.failure_reason().as_deref(), Some("NotReadableError"));
    assert!(source.failure().is_some_and(|error| error.is_user_visible()));

    let ticks = source.stats().ticks;
    let late = count_frames(&bus);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(late.load(Ordering::SeqCst), 0);
    assert_eq!(source.stats().ticks, ticks);
    assert_eq!(host.stats().live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_source_releases_device() {
    let bus = EventBus::new();
    let host = Arc::new(FixtureHost::new(fixture_frame()));
    let source = source_with(host.clone(), &bus);

    source.start();
    settle().await;
    assert_eq!(host.stats().live_streams(), 1);

    drop(source);
    assert_eq!(host.stats().release_calls(), 1);
}
