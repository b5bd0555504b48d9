//! Frame display
//!
//! [`DisplaySink`] draws every captured frame into a display surface sized to
//! the widget and hands it to the host [`Container`]. On `shutdown` it drops
//! its surfaces and toggle, unsubscribes from the bus and leaves a notice in
//! their place. Frames arriving after that are counted and ignored.

use anyhow::anyhow;
use barscan_core::{
    CaptureError, CaptureResult, EventBus, FrameEvent, Frame, HandlerResult, ShutdownEvent,
    Subscription,
};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Colour of the horizontal target line on the overlay
pub const OVERLAY_LINE: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// The host element the widget lives in
///
/// `present` is called with the sink's internal lock held and must not call
/// back into the sink.
pub trait Container: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Show a freshly drawn display surface
    fn present(&self, _display: &RgbaImage) {}

    /// Surfaces and controls were removed; show `notice` instead
    fn teardown(&self, _notice: &str) {}
}

/// Container without a real screen, recording what it was asked to show
#[derive(Debug)]
pub struct HeadlessContainer {
    width: u32,
    height: u32,
    presented: AtomicU64,
    last_frame: Mutex<Option<RgbaImage>>,
    notice: Mutex<Option<String>>,
}

impl HeadlessContainer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            presented: AtomicU64::new(0),
            last_frame: Mutex::new(None),
            notice: Mutex::new(None),
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    pub fn last_frame(&self) -> Option<RgbaImage> {
        self.last_frame.lock().clone()
    }

    pub fn notice(&self) -> Option<String> {
        self.notice.lock().clone()
    }
}

impl Container for HeadlessContainer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn present(&self, display: &RgbaImage) {
        self.presented.fetch_add(1, Ordering::SeqCst);
        *self.last_frame.lock() = Some(display.clone());
    }

    fn teardown(&self, notice: &str) {
        *self.notice.lock() = Some(notice.to_string());
    }
}

type ToggleHandler = Arc<dyn Fn() + Send + Sync>;

/// The start/stop button
struct ToggleControl {
    handler: Option<ToggleHandler>,
}

struct DisplayState {
    display: Option<RgbaImage>,
    overlay: Option<RgbaImage>,
    toggle: Option<ToggleControl>,
    shut_down: bool,
    notice: Option<String>,
}

/// Renders captured frames and reacts to shutdown
pub struct DisplaySink {
    bus: EventBus,
    container: Arc<dyn Container>,
    width: u32,
    height: u32,
    state: Mutex<DisplayState>,
    subscriptions: Mutex<Vec<Subscription>>,
    frames_rendered: AtomicU64,
    late_frames_ignored: AtomicU64,
}

impl std::fmt::Debug for DisplaySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySink")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("shut_down", &self.is_shut_down())
            .field("frames_rendered", &self.frames_rendered())
            .finish()
    }
}

impl DisplaySink {
    /// Toggle button label
    pub const TOGGLE_LABEL: &'static str = "Toggle video";

    /// Create the surfaces and subscribe to `frameCaptured` and `shutdown`
    pub fn new(
        bus: EventBus,
        container: Arc<dyn Container>,
        width: u32,
        height: u32,
    ) -> CaptureResult<Arc<Self>> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidConfiguration {
                message: format!("display size {}x{} is empty", width, height),
            });
        }

        let sink = Arc::new(Self {
            bus: bus.clone(),
            container,
            width,
            height,
            state: Mutex::new(DisplayState {
                display: Some(RgbaImage::new(width, height)),
                overlay: Some(target_overlay(width, height)),
                toggle: Some(ToggleControl { handler: None }),
                shut_down: false,
                notice: None,
            }),
            subscriptions: Mutex::new(Vec::new()),
            frames_rendered: AtomicU64::new(0),
            late_frames_ignored: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&sink);
        let frames = bus.on_frame_captured(move |event| match weak.upgrade() {
            Some(sink) => sink.render(event),
            None => Ok(()),
        });

        let weak = Arc::downgrade(&sink);
        let shutdown = bus.on_shutdown(move |event| match weak.upgrade() {
            Some(sink) => sink.shut_down(event),
            None => Ok(()),
        });

        sink.subscriptions.lock().extend([frames, shutdown]);
        debug!("Display sink ready ({}x{})", width, height);
        Ok(sink)
    }

    /// Set what the toggle does when activated
    pub fn set_toggle_handler<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Some(toggle) = self.state.lock().toggle.as_mut() {
            toggle.handler = Some(Arc::new(handler));
        }
    }

    /// Simulate a click on the toggle. Returns `false` when there is no toggle.
    pub fn activate_toggle(&self) -> bool {
        let handler = {
            let state = self.state.lock();
            match state.toggle.as_ref() {
                Some(toggle) => toggle.handler.clone(),
                None => return false,
            }
        };

        if let Some(handler) = handler {
            handler();
        }

        if let Some(display) = self.state.lock().display.as_mut() {
            clear(display);
        }
        true
    }

    fn render(&self, event: &FrameEvent) -> HandlerResult {
        let mut state = self.state.lock();
        if state.shut_down {
            self.late_frames_ignored.fetch_add(1, Ordering::SeqCst);
            trace!("Ignoring frame {} after shutdown", event.sequence);
            return Ok(());
        }

        let Some(display) = state.display.as_mut() else {
            return Ok(());
        };

        *display = stretch_to_fill(&event.frame, self.width, self.height)?;
        self.container.present(display);
        self.frames_rendered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shut_down(&self, event: &ShutdownEvent) -> HandlerResult {
        let notice = event.notice();
        {
            let mut state = self.state.lock();
            if state.shut_down {
                return Ok(());
            }
            state.shut_down = true;
            state.display = None;
            state.overlay = None;
            state.toggle = None;
            state.notice = Some(notice.clone());
        }

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            self.bus.unsubscribe(subscription);
        }

        self.container.teardown(&notice);
        info!("Display disabled: {}", event.reason);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    pub fn has_toggle(&self) -> bool {
        self.state.lock().toggle.is_some()
    }

    /// Notice shown after shutdown
    pub fn notice(&self) -> Option<String> {
        self.state.lock().notice.clone()
    }

    /// Copy of the display surface, `None` after shutdown
    pub fn display_snapshot(&self) -> Option<RgbaImage> {
        self.state.lock().display.clone()
    }

    /// Copy of the overlay surface, `None` after shutdown
    pub fn overlay_snapshot(&self) -> Option<RgbaImage> {
        self.state.lock().overlay.clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::SeqCst)
    }

    pub fn late_frames_ignored(&self) -> u64 {
        self.late_frames_ignored.load(Ordering::SeqCst)
    }
}

/// Scale `frame` to exactly `width` x `height`, ignoring aspect ratio
pub fn stretch_to_fill(frame: &Frame, width: u32, height: u32) -> anyhow::Result<RgbaImage> {
    let source = RgbaImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width(), frame.height()))?;

    if source.dimensions() == (width, height) {
        return Ok(source);
    }
    Ok(imageops::resize(&source, width, height, FilterType::Nearest))
}

/// Transparent surface with a horizontal line across the middle row
fn target_overlay(width: u32, height: u32) -> RgbaImage {
    let mut overlay = RgbaImage::new(width, height);
    let middle = height / 2;
    for x in 0..width {
        overlay.put_pixel(x, middle, OVERLAY_LINE);
    }
    overlay
}

fn clear(surface: &mut RgbaImage) {
    surface.pixels_mut().for_each(|pixel| *pixel = Rgba([0, 0, 0, 0]));
}
