//! End-to-end scanner scenarios on a fixture camera and a paused clock

use barscan::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn fixture_frame() -> Frame {
    Frame::solid(32, 16, [240, 240, 240, 255]).unwrap()
}

fn granting_host() -> Arc<FixtureHost> {
    Arc::new(FixtureHost::new(fixture_frame()))
}

fn container() -> Arc<HeadlessContainer> {
    Arc::new(HeadlessContainer::new(320, 240))
}

fn record_frames(scanner: &Scanner) -> Arc<Mutex<Vec<FrameEvent>>> {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    scanner.bus().on_frame_captured(move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });
    frames
}

fn record_shutdowns(scanner: &Scanner) -> Arc<Mutex<Vec<ShutdownEvent>>> {
    let shutdowns = Arc::new(Mutex::new(Vec::new()));
    let sink = shutdowns.clone();
    scanner.bus().on_shutdown(move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });
    shutdowns
}

async fn wait_for(scanner: &Scanner, state: CaptureState) {
    tokio::time::timeout(Duration::from_secs(5), scanner.wait_for_state(state))
        .await
        .unwrap_or_else(|_| panic!("scanner never reached {}", state));
}

// ============================================================================
// SCENARIO A: autostart with a deterministic fixture
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_autostart_captures_fixture_frames() {
    let config = ScannerConfig::from_data_attributes([("data-autostart", "1")]).unwrap();
    let host = granting_host();
    let scanner = Scanner::with_host(config, container(), host.clone()).unwrap();
    let frames = record_frames(&scanner);

    assert_eq!(scanner.state(), CaptureState::Acquiring);
    wait_for(&scanner, CaptureState::Capturing).await;
    assert!(scanner.is_capturing());

    tokio::time::sleep(DEFAULT_CAPTURE_INTERVAL + Duration::from_millis(1)).await;

    let frames = frames.lock();
    assert!(!frames.is_empty());
    assert!(frames[0].frame.ptr_eq(host.frame()));
    assert!(scanner.display().frames_rendered() >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_autostart_off_stays_idle() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scanner.state(), CaptureState::Idle);
    assert_eq!(host.stats().acquisitions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fixture_loaded_from_configured_file() {
    let path = std::env::temp_dir().join(format!("barscan-fixture-{}.png", std::process::id()));
    image::RgbaImage::from_pixel(8, 4, image::Rgba([0, 128, 255, 255]))
        .save(&path)
        .unwrap();

    let config = ScannerConfig {
        autostart: true,
        test_fixture: Some(format!("file://{}", path.display())),
        ..ScannerConfig::default()
    };
    let scanner = Scanner::new(config, container()).unwrap();
    let frames = record_frames(&scanner);

    wait_for(&scanner, CaptureState::Capturing).await;
    tokio::time::sleep(Duration::from_millis(45)).await;

    assert_eq!(scanner.source().host_name(), "fixture");
    let first = frames.lock()[0].frame.clone();
    assert_eq!((first.width(), first.height()), (8, 4));
    assert_eq!(first.pixel(0, 0), Some([0, 128, 255, 255]));

    scanner.stop();
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_missing_fixture_fails_construction() {
    let config = ScannerConfig {
        test_fixture: Some("/nonexistent/barscan/fixture.png".to_string()),
        ..ScannerConfig::default()
    };
    let error = Scanner::new(config, container()).unwrap_err();
    assert!(matches!(error, CaptureError::FixtureLoad { .. }));
}

// ============================================================================
// SCENARIO B: manual start, camera denied
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_denied_start_fails_with_one_shutdown() {
    let host = Arc::new(FixtureHost::denying(
        fixture_frame(),
        AcquireError::not_allowed("permission dismissed"),
    ));
    let config = ScannerConfig {
        debug: true,
        ..ScannerConfig::default()
    };
    let view = container();
    let scanner = Scanner::with_host(config, view.clone(), host).unwrap();
    let shutdowns = record_shutdowns(&scanner);

    assert_eq!(scanner.start(), StartOutcome::Requested);
    wait_for(&scanner, CaptureState::Failed).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        *shutdowns.lock(),
        vec![ShutdownEvent::new("NotAllowedError")]
    );
    assert!(!scanner.is_capturing());
    assert_eq!(scanner.state(), CaptureState::Failed);

    // Display disabled with the reason, debug output shows the raw reason.
    assert!(scanner.display().is_shut_down());
    assert_eq!(
        view.notice().as_deref(),
        Some("No webcam available to capture from. (NotAllowedError)")
    );
    assert_eq!(
        scanner.debug_channel().current().as_deref(),
        Some("Video capture error: NotAllowedError")
    );

    // Failed is terminal.
    assert!(!scanner.toggle());
    assert_eq!(scanner.start(), StartOutcome::Failed);
    assert_eq!(shutdowns.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_denial_without_debug_is_silent() {
    let host = Arc::new(FixtureHost::denying(
        fixture_frame(),
        AcquireError::not_found("no camera"),
    ));
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host).unwrap();

    scanner.start();
    wait_for(&scanner, CaptureState::Failed).await;

    assert!(!scanner.debug_channel().is_enabled());
    assert!(scanner.debug_channel().current().is_none());
    assert!(scanner.debug_channel().history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_capture_backend_denies() {
    let scanner = Scanner::with_host(
        ScannerConfig::default(),
        container(),
        Arc::new(UnavailableHost::new()),
    )
    .unwrap();
    let shutdowns = record_shutdowns(&scanner);

    scanner.start();
    wait_for(&scanner, CaptureState::Failed).await;
    assert_eq!(
        *shutdowns.lock(),
        vec![ShutdownEvent::new("NotSupportedError")]
    );
}

// ============================================================================
// SCENARIO C: start, stop, silence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_start_stop_emits_nothing_afterwards() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();
    let frames = record_frames(&scanner);

    scanner.start();
    scanner.stop();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(frames.lock().is_empty());
    assert_eq!(host.stats().release_calls(), 1);
    assert_eq!(host.stats().live_streams(), 0);
    assert_eq!(scanner.state(), CaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_capturing_releases_once() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();
    let frames = record_frames(&scanner);

    scanner.start();
    wait_for(&scanner, CaptureState::Capturing).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scanner.stop(), StopOutcome::Stopped);
    let before = frames.lock().len();
    assert!(before > 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(frames.lock().len(), before);
    assert_eq!(host.stats().release_calls(), 1);
}

// ============================================================================
// SCENARIO D: toggle twice
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_twice_ends_idle_with_one_release() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();

    assert!(scanner.toggle());
    wait_for(&scanner, CaptureState::Capturing).await;
    assert!(scanner.toggle());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scanner.state(), CaptureState::Idle);
    assert!(!scanner.is_capturing());
    assert_eq!(host.stats().release_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_twice_before_grant_ends_idle_with_one_release() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();

    scanner.toggle();
    scanner.toggle();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scanner.state(), CaptureState::Idle);
    assert_eq!(host.stats().grants(), 1);
    assert_eq!(host.stats().release_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_after_stop_restarts() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();

    scanner.toggle();
    wait_for(&scanner, CaptureState::Capturing).await;
    scanner.toggle();
    wait_for(&scanner, CaptureState::Idle).await;
    scanner.toggle();
    wait_for(&scanner, CaptureState::Capturing).await;

    assert_eq!(host.stats().acquisitions(), 2);
    assert_eq!(scanner.source().stats().sessions_started, 2);
    scanner.stop();
    assert_eq!(host.stats().release_calls(), 2);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stream_loss_shuts_down_once() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();
    let shutdowns = record_shutdowns(&scanner);

    scanner.start();
    wait_for(&scanner, CaptureState::Capturing).await;
    host.end_streams();
    wait_for(&scanner, CaptureState::Failed).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(shutdowns.lock().len(), 1);
    assert_eq!(host.stats().release_calls(), 1);
    assert!(scanner.display().is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_debug_channel_records_transitions() {
    let config = ScannerConfig {
        debug: true,
        autostart: true,
        ..ScannerConfig::default()
    };
    let scanner = Scanner::with_host(config, container(), granting_host()).unwrap();
    wait_for(&scanner, CaptureState::Capturing).await;
    scanner.stop();

    let transitions = scanner.debug_channel().messages_of(DebugKind::Transition);
    assert_eq!(
        transitions,
        vec![
            "Idle -> Acquiring".to_string(),
            "Acquiring -> Capturing".to_string(),
            "Capturing -> Idle".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_report_reflects_pipeline() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host).unwrap();

    scanner.start();
    wait_for(&scanner, CaptureState::Capturing).await;
    tokio::time::sleep(Duration::from_millis(125)).await;

    let report = scanner.report();
    assert_eq!(report.state, CaptureState::Capturing);
    assert_eq!(report.host, "fixture");
    assert!(report.session_id.is_some());
    assert_eq!(report.frames_emitted, 4);
    assert_eq!(report.frames_rendered, 4);
    assert_eq!(report.sessions_started, 1);
    assert_eq!(report.subscribers.frame_captured, 1);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"frames_emitted\": 4"));
    scanner.stop();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scanner_releases_camera() {
    let host = granting_host();
    let scanner = Scanner::with_host(ScannerConfig::default(), container(), host.clone()).unwrap();

    scanner.start();
    wait_for(&scanner, CaptureState::Capturing).await;
    drop(scanner);

    assert_eq!(host.stats().live_streams(), 0);
}
