//! In-process publish/subscribe between the capture source and its consumers
//!
//! Delivery is synchronous: `emit_*` returns after every subscriber that was
//! registered when the call started has run, in subscription order. Nothing
//! is queued, so an event published with no subscribers is dropped.
//!
//! A handler that returns an error or panics is logged and skipped; the
//! remaining handlers still receive the event.
//!
//! Subscribing the same handler twice registers it twice and it is then
//! called twice per event. The bus does not deduplicate.

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::error::CaptureError;
use crate::event::{CaptureState, EventName, ShutdownEvent};
use crate::frame::FrameEvent;

/// Result returned by bus handlers
pub type HandlerResult = anyhow::Result<()>;

type Handler<T> = Arc<dyn Fn(&T) -> HandlerResult + Send + Sync>;

/// Identifies one registration on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    event: EventName,
}

impl Subscription {
    pub fn event(&self) -> EventName {
        self.event
    }
}

/// Outcome of publishing one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// One [`CaptureError::Subscriber`] per handler that returned an error or panicked
    pub failures: Vec<CaptureError>,
}

impl Delivery {
    /// Handlers that returned an error or panicked
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether any subscriber was registered at publish time
    pub fn reached_anyone(&self) -> bool {
        self.delivered + self.failed() > 0
    }
}

struct Topic<T> {
    name: EventName,
    subscribers: Mutex<Vec<(u64, Handler<T>)>>,
}

impl<T> Topic<T> {
    fn new(name: EventName) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self, id: u64, handler: Handler<T>) -> Subscription {
        self.subscribers.lock().push((id, handler));
        Subscription {
            id,
            event: self.name,
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn publish(&self, payload: &T) -> Delivery {
        // Handlers run on a snapshot so they may (un)subscribe while we dispatch.
        let snapshot: Vec<Handler<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        if snapshot.is_empty() {
            trace!("Dropping {} event, no subscribers", self.name);
        }

        let mut delivery = Delivery::default();
        for (index, handler) in snapshot.iter().enumerate() {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(Ok(())) => {
                    delivery.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(_) => "handler panicked".to_string(),
            };
            let error = CaptureError::Subscriber {
                event: self.name.to_string(),
                message,
            };
            warn!(subscriber = index, "{}", error);
            delivery.failures.push(error);
        }
        delivery
    }
}

struct BusInner {
    next_id: AtomicU64,
    frame_captured: Topic<FrameEvent>,
    shutdown: Topic<ShutdownEvent>,
    state_changed: Topic<CaptureState>,
}

/// Typed event bus shared by every component of one scanner instance
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("frame_captured", &self.inner.frame_captured.len())
            .field("shutdown", &self.inner.shutdown.len())
            .field("state_changed", &self.inner.state_changed.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                frame_captured: Topic::new(EventName::FrameCaptured),
                shutdown: Topic::new(EventName::Shutdown),
                state_changed: Topic::new(EventName::StateChanged),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn on_frame_captured<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&FrameEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner
            .frame_captured
            .subscribe(self.next_id(), Arc::new(handler))
    }

    pub fn on_shutdown<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ShutdownEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner
            .shutdown
            .subscribe(self.next_id(), Arc::new(handler))
    }

    pub fn on_state_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CaptureState) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner
            .state_changed
            .subscribe(self.next_id(), Arc::new(handler))
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        match subscription.event {
            EventName::FrameCaptured => self.inner.frame_captured.unsubscribe(subscription.id),
            EventName::Shutdown => self.inner.shutdown.unsubscribe(subscription.id),
            EventName::StateChanged => self.inner.state_changed.unsubscribe(subscription.id),
        }
    }

    pub fn emit_frame_captured(&self, event: &FrameEvent) -> Delivery {
        self.inner.frame_captured.publish(event)
    }

    pub fn emit_shutdown(&self, event: &ShutdownEvent) -> Delivery {
        self.inner.shutdown.publish(event)
    }

    pub fn emit_state_changed(&self, state: CaptureState) -> Delivery {
        self.inner.state_changed.publish(&state)
    }

    pub fn subscriber_count(&self, event: EventName) -> usize {
        match event {
            EventName::FrameCaptured => self.inner.frame_captured.len(),
            EventName::Shutdown => self.inner.shutdown.len(),
            EventName::StateChanged => self.inner.state_changed.len(),
        }
    }
}
