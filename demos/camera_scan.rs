//! Camera scan demo
//!
//! Opens the first native camera, captures for a few seconds and prints what
//! happened. A denied or missing camera ends in the shutdown notice instead.
//!
//! ```text
//! cargo run --example camera_scan --features native-camera
//! ```

use barscan::{init_logging, CaptureState, HeadlessContainer, Scanner, ScannerConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let container = Arc::new(HeadlessContainer::new(640, 480));
    let config = ScannerConfig {
        autostart: true,
        debug: true,
        ..ScannerConfig::default()
    };
    let scanner = Scanner::new(config, container.clone())?;

    let mut states = scanner.watch_state();
    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("state: {}", state);
                if state == CaptureState::Failed {
                    break;
                }
            }
        }
    }

    scanner.stop();

    if let Some(notice) = container.notice() {
        println!("{}", notice);
    }
    println!("{}", scanner.report());
    Ok(())
}
