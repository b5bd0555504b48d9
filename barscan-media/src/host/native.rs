//! Native camera host backed by nokhwa
//!
//! The camera is opened and read on a dedicated thread. The thread keeps the
//! most recently decoded picture, which is what the capture source samples on
//! every tick.

use async_trait::async_trait;
use barscan_core::{CancellationToken, Frame};
use futures::channel::oneshot;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use super::{MediaConstraints, MediaHost, MediaStream};
use crate::error::{AcquireError, AcquireResult};

/// Host opening a local camera by index
#[derive(Debug, Clone)]
pub struct NativeCameraHost {
    index: u32,
}

impl NativeCameraHost {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[derive(Default)]
struct CameraShared {
    running: AtomicBool,
    latest: RwLock<Option<Frame>>,
    failure: Mutex<Option<AcquireError>>,
}

#[async_trait]
impl MediaHost for NativeCameraHost {
    fn name(&self) -> &str {
        "native-camera"
    }

    async fn acquire(
        &self,
        _constraints: &MediaConstraints,
        cancel: CancellationToken,
    ) -> AcquireResult<Arc<dyn MediaStream>> {
        let shared = Arc::new(CameraShared::default());
        shared.running.store(true, Ordering::SeqCst);

        let (opened_tx, opened_rx) = oneshot::channel();
        let worker_shared = shared.clone();
        let index = self.index;
        let worker = std::thread::Builder::new()
            .name(format!("barscan-camera-{}", index))
            .spawn(move || run_camera(index, worker_shared, opened_tx))
            .map_err(|e| AcquireError::not_readable(e.to_string()))?;

        let opened = tokio::select! {
            result = opened_rx => result.unwrap_or_else(|_| {
                Err(AcquireError::not_readable("camera thread exited before opening"))
            }),
            _ = cancel.cancelled() => Err(AcquireError::Aborted),
        };

        match opened {
            Ok(label) => {
                info!("Camera {} opened: {}", index, label);
                Ok(Arc::new(NativeStream {
                    label,
                    shared,
                    worker: Mutex::new(Some(worker)),
                }))
            }
            Err(error) => {
                // The worker notices and closes the camera if it got that far.
                shared.running.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }
}

fn run_camera(
    index: u32,
    shared: Arc<CameraShared>,
    opened_tx: oneshot::Sender<AcquireResult<String>>,
) {
    let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened_tx.send(Err(AcquireError::not_found(e.to_string())));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = opened_tx.send(Err(AcquireError::not_readable(e.to_string())));
        return;
    }

    if opened_tx.send(Ok(camera.info().human_name())).is_err() {
        debug!("Camera request dropped before grant, closing");
        shared.running.store(false, Ordering::SeqCst);
    }

    while shared.running.load(Ordering::SeqCst) {
        let decoded = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbAFormat>());

        match decoded {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                match Frame::from_rgba(width, height, image.into_raw()) {
                    Ok(frame) => *shared.latest.write() = Some(frame),
                    Err(e) => debug!("Skipping malformed camera frame: {}", e),
                }
            }
            Err(e) => {
                warn!("Camera {} stopped delivering: {}", index, e);
                *shared.failure.lock() = Some(AcquireError::not_readable(e.to_string()));
                break;
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera {}: {}", index, e);
    }
}

struct NativeStream {
    label: String,
    shared: Arc<CameraShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MediaStream for NativeStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn track_count(&self) -> usize {
        1
    }

    fn current_frame(&self) -> AcquireResult<Option<Frame>> {
        if let Some(error) = self.shared.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.shared.latest.read().clone())
    }

    fn stop_tracks(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            join_camera_thread(self.label.clone(), worker);
        }
        self.shared.latest.write().take();
    }
}

/// Wait for a signalled camera thread to close its device
///
/// The thread may be inside a blocking `frame()` read for up to one camera
/// period, so on a tokio worker the join moves to the blocking pool.
fn join_camera_thread(label: String, worker: JoinHandle<()>) {
    let join = move || {
        if worker.join().is_err() {
            warn!("Camera thread for {} panicked", label);
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}
