//! # Activity Log
//!
//! ## Purpose
//!
//! Bounded, shared record of what the device links did: connections accepted,
//! payloads received, replies sent, failures. The accept loop, every
//! per-connection task and the stream client's reconnect loop all append to
//! the same log, so append-and-evict happens under one lock.
//!
//! ## Delivery
//!
//! ```text
//! record() ──► Mutex<VecDeque> (capacity 100, oldest evicted)
//!          └─► ActivityObserver::on_event (live, best effort)
//! ```
//!
//! Observer errors and panics are logged and swallowed; they never reach the
//! component that produced the event.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use types::{ActivityEvent, EventKind};

/// Default number of retained events
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Receives every event as it is recorded
pub trait ActivityObserver: Send + Sync {
    fn on_event(&self, event: &ActivityEvent) -> anyhow::Result<()>;
}

impl<F> ActivityObserver for F
where
    F: Fn(&ActivityEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ActivityEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards events into a bounded channel.
///
/// When the receiver falls behind the newest event is dropped and reported as
/// an error; the retained log is unaffected.
pub struct ChannelObserver {
    sender: mpsc::Sender<ActivityEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl ActivityObserver for ChannelObserver {
    fn on_event(&self, event: &ActivityEvent) -> anyhow::Result<()> {
        self.sender
            .try_send(event.clone())
            .map_err(|e| anyhow::anyhow!("activity channel unavailable: {e}"))
    }
}

/// Capped ring of [`ActivityEvent`]s plus an optional live observer
pub struct ActivityLog {
    events: Mutex<VecDeque<ActivityEvent>>,
    capacity: usize,
    observer: RwLock<Option<Arc<dyn ActivityObserver>>>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl std::fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLog")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            observer: RwLock::new(None),
        }
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn ActivityObserver>>) {
        *self.observer.write() = observer;
    }

    /// Append an event, evicting the oldest when full, then notify the observer
    pub fn record(
        &self,
        kind: EventKind,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> ActivityEvent {
        let event = ActivityEvent::new(kind, message, source);
        if kind.is_error() {
            warn!(kind = %kind, source = %event.source, "{}", event.message);
        } else {
            info!(kind = %kind, source = %event.source, "{}", event.message);
        }

        {
            let mut events = self.events.lock();
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        self.notify(&event);
        event
    }

    fn notify(&self, event: &ActivityEvent) {
        let Some(observer) = self.observer.read().clone() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, kind = %event.kind, "Activity observer failed"),
            Err(_) => warn!(kind = %event.kind, "Activity observer panicked"),
        }
    }

    /// Copy of the retained events, oldest first
    pub fn snapshot(&self) -> Vec<ActivityEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// One rendered line per retained event
    pub fn render(&self) -> String {
        self.events
            .lock()
            .iter()
            .map(ActivityEvent::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
