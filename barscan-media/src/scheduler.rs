//! Fixed-rate frame scheduling
//!
//! Ticks run one after another on a tokio task; a tick that overruns delays
//! the next one instead of overlapping it. Each tick takes a gate and checks
//! the liveness flag before running. [`FrameScheduler::cancel`] clears the flag
//! and then takes the same gate, so when it returns no tick is running and
//! none can start. The gate is re-entrant, which lets a tick cancel its own
//! scheduler.

use parking_lot::{Mutex, ReentrantMutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

/// Reference capture cadence (25 frames per second)
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(40);

struct ActiveTicker {
    live: Arc<AtomicBool>,
    gate: Arc<ReentrantMutex<()>>,
    task: JoinHandle<()>,
}

/// Periodic tick generator owned by one capture source
pub struct FrameScheduler {
    interval: Duration,
    runtime: Handle,
    active: Mutex<Option<ActiveTicker>>,
    ticks: Arc<AtomicU64>,
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("interval", &self.interval)
            .field("active", &self.is_active())
            .field("ticks", &self.tick_count())
            .finish()
    }
}

impl FrameScheduler {
    /// `interval` must be non-zero.
    pub fn new(interval: Duration, runtime: Handle) -> Self {
        Self {
            interval,
            runtime,
            active: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start ticking. The first tick fires as soon as the task runs and
    /// receives sequence 1; the rest follow one interval apart. Returns
    /// `false` without changing anything if already active.
    pub fn start<F>(&self, on_tick: F) -> bool
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut active = self.active.lock();
        if active.is_some() {
            debug!("Scheduler already active, start ignored");
            return false;
        }

        let live = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(ReentrantMutex::new(()));
        let task = self.runtime.spawn(run_ticker(
            self.interval,
            live.clone(),
            gate.clone(),
            self.ticks.clone(),
            on_tick,
        ));

        *active = Some(ActiveTicker { live, gate, task });
        debug!("Scheduler started ({:?})", self.interval);
        true
    }

    /// Stop ticking. Returns `false` if the scheduler was not active.
    pub fn cancel(&self) -> bool {
        let ticker = self.active.lock().take();
        let Some(ticker) = ticker else {
            return false;
        };

        ticker.live.store(false, Ordering::SeqCst);
        ticker.task.abort();
        // Wait for a tick that is already running on another worker.
        drop(ticker.gate.lock());

        debug!("Scheduler cancelled after {} ticks", self.tick_count());
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks fired over the scheduler's lifetime
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_ticker<F>(
    period: Duration,
    live: Arc<AtomicBool>,
    gate: Arc<ReentrantMutex<()>>,
    ticks: Arc<AtomicU64>,
    on_tick: F,
) where
    F: Fn(u64) + Send + Sync + 'static,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence = 0u64;

    loop {
        interval.tick().await;

        let _gate = gate.lock();
        if !live.load(Ordering::SeqCst) {
            trace!("Tick fired after cancel, skipped");
            break;
        }

        sequence += 1;
        ticks.fetch_add(1, Ordering::SeqCst);
        on_tick(sequence);
    }
}
