//! Fixture scan demo
//!
//! Runs the scanner against a still image for one second and prints the
//! pipeline report. Pass an image path to use it as the fixture; without
//! one a synthetic barcode-like stripe pattern is used.
//!
//! ```text
//! cargo run --example fixture_scan -- path/to/code.png
//! ```

use barscan::{
    init_logging, CaptureState, FixtureHost, Frame, HeadlessContainer, Scanner, ScannerConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn stripes(width: u32, height: u32) -> anyhow::Result<Frame> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for x in 0..width {
            let value = if (x / 3) % 2 == 0 { 0 } else { 255 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    Ok(Frame::from_rgba(width, height, pixels)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let container = Arc::new(HeadlessContainer::new(320, 240));
    let config = ScannerConfig {
        autostart: true,
        debug: true,
        test_fixture: std::env::args().nth(1),
        ..ScannerConfig::default()
    };

    let scanner = if config.test_fixture.is_some() {
        Scanner::new(config, container.clone())?
    } else {
        let host = Arc::new(FixtureHost::new(stripes(160, 90)?));
        Scanner::with_host(config, container.clone(), host)?
    };

    let seen = Arc::new(AtomicU64::new(0));
    {
        let seen = seen.clone();
        scanner.bus().on_frame_captured(move |event| {
            seen.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("frame {} at {:?}", event.sequence, event.timestamp);
            Ok(())
        });
    }

    tokio::time::timeout(
        Duration::from_secs(2),
        scanner.wait_for_state(CaptureState::Capturing),
    )
    .await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    scanner.stop();

    println!("frames seen by demo subscriber: {}", seen.load(Ordering::Relaxed));
    println!("frames presented to container: {}", container.presented());
    if let Some(text) = scanner.debug_channel().current() {
        println!("debug: {}", text);
    }
    println!("{}", scanner.report().to_json()?);
    Ok(())
}
