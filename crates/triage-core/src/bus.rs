//! In-process publish/subscribe broadcaster.
//!
//! Every event published on the [`EventBus`] is handed synchronously to each
//! subscriber registered at that moment. There is no queue and no replay: a
//! subscriber only ever sees events published while it is registered.
//!
//! Subscribers are plain callbacks. Anything that needs to cross a task
//! boundary (the stream endpoint, for instance) forwards into its own channel
//! from inside the callback, so a slow consumer never holds up `publish`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use thiserror::Error;
use tracing::{debug, warn};

use crate::events::Event;

/// Why a subscriber could not take an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    /// The consumer behind the subscriber has gone away.
    #[error("subscriber closed")]
    Closed,
    /// The consumer's buffer is full; this event was dropped for it.
    #[error("subscriber lagging, event dropped")]
    Lagged,
    #[error("subscriber failed: {0}")]
    Failed(String),
}

/// Callback invoked for every published event.
///
/// Callbacks run while the bus holds its subscriber lock and must not call
/// back into the same bus.
pub type SubscriberFn = dyn Fn(&Event) -> Result<(), SubscriberError> + Send + Sync;

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers that returned an error or panicked.
    pub failed: usize,
}

struct BusInner {
    subscribers: RwLock<HashMap<u64, Arc<SubscriberFn>>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Arc<SubscriberFn>>> {
        // Subscriber panics are caught in `publish`, so poisoning only happens
        // if the map itself panicked mid-update; the map is still consistent.
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Arc<SubscriberFn>>> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: u64) -> bool {
        self.write().remove(&id).is_some()
    }
}

/// Process-wide event broadcaster.
///
/// Cheap to clone; all clones share one subscriber set. Construct one at
/// startup and hand it to whatever publishes or subscribes.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `callback` for all future events.
    ///
    /// The returned [`Subscription`] removes exactly this callback when
    /// [`Subscription::unsubscribe`] is called or when it is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut subscribers = self.inner.write();
            subscribers.insert(id, Arc::new(callback));
            subscribers.len()
        };
        debug!(subscriber_id = id, subscribers = total, "Subscriber registered");

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// A subscriber that errors or panics is logged and skipped; the others
    /// still receive the event.
    pub fn publish(&self, event: &Event) -> PublishReport {
        let subscribers = self.inner.read();
        let mut report = PublishReport::default();

        for (id, callback) in subscribers.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(SubscriberError::Closed)) => {
                    debug!(subscriber_id = id, event_id = %event.id, "Subscriber closed");
                    report.failed += 1;
                }
                Ok(Err(e)) => {
                    warn!(subscriber_id = id, event_id = %event.id, error = %e, "Subscriber rejected event");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(subscriber_id = id, event_id = %event.id, "Subscriber panicked");
                    report.failed += 1;
                }
            }
        }

        debug!(
            event_id = %event.id,
            kind = ?event.kind,
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );
        report
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Drop every subscriber. Returns how many were removed.
    ///
    /// Used at shutdown: forwarding callbacks are dropped with their channel
    /// senders, which ends the streams reading from them.
    pub fn close(&self) -> usize {
        let removed = {
            let mut subscribers = self.inner.write();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        debug!(removed, "Event bus closed");
        removed
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle to one registered subscriber.
///
/// Unsubscribing is idempotent and also happens on drop, so the callback is
/// removed exactly once no matter how the owner goes away.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the callback from the bus.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let removed = match self.bus.upgrade() {
            Some(inner) => inner.remove(self.id),
            None => false,
        };
        debug!(subscriber_id = self.id, removed, "Subscriber unregistered");
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventStatus};
    use std::sync::Mutex;

    fn event(id: &str) -> Event {
        Event::new(id, EventKind::Workflow, EventStatus::Processing, "test")
    }

    fn collector(bus: &EventBus) -> (Subscription, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(move |e| {
            sink.lock().unwrap().push(e.id.clone());
            Ok(())
        });
        (sub, seen)
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let (_a, seen_a) = collector(&bus);
        let (_b, seen_b) = collector(&bus);

        let report = bus.publish(&event("e1"));

        assert_eq!(report, PublishReport { delivered: 2, failed: 0 });
        assert_eq!(*seen_a.lock().unwrap(), vec!["e1"]);
        assert_eq!(*seen_b.lock().unwrap(), vec!["e1"]);
    }

    #[test]
    fn test_publish_with_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&event("e1")), PublishReport::default());
    }

    #[test]
    fn test_per_subscriber_order_is_preserved() {
        let bus = EventBus::new();
        let (_sub, seen) = collector(&bus);
        for id in ["a", "b", "c", "d"] {
            bus.publish(&event(id));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(&event("before"));
        let (_sub, seen) = collector(&bus);
        bus.publish(&event("after"));
        assert_eq!(*seen.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (sub, seen) = collector(&bus);
        assert_eq!(bus.subscriber_count(), 1);

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(&event("e1"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        {
            let (_sub, _seen) = collector(&bus);
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribing_one_leaves_others() {
        let bus = EventBus::new();
        let (a, seen_a) = collector(&bus);
        let (_b, seen_b) = collector(&bus);

        bus.publish(&event("e1"));
        a.unsubscribe();
        bus.publish(&event("e2"));

        assert_eq!(*seen_a.lock().unwrap(), vec!["e1"]);
        assert_eq!(*seen_b.lock().unwrap(), vec!["e1", "e2"]);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let bus = EventBus::new();
        let _bad = bus.subscribe(|_| Err(SubscriberError::Failed("nope".to_string())));
        let _closed = bus.subscribe(|_| Err(SubscriberError::Closed));
        let (_good, seen) = collector(&bus);

        let report = bus.publish(&event("e1"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["e1"]);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let _bad = bus.subscribe(|_| panic!("subscriber blew up"));
        let (_good, seen) = collector(&bus);

        let report = bus.publish(&event("e1"));
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);

        // The bus keeps working after a panic.
        bus.publish(&event("e2"));
        assert_eq!(*seen.lock().unwrap(), vec!["e1", "e2"]);
    }

    #[test]
    fn test_close_drops_all_subscribers() {
        let bus = EventBus::new();
        let (a, _) = collector(&bus);
        let (_b, _) = collector(&bus);

        assert_eq!(bus.close(), 2);
        assert_eq!(bus.subscriber_count(), 0);
        // The handle is still marked active but removing it is a no-op.
        assert!(!a.unsubscribe());
    }

    #[test]
    fn test_subscription_outliving_bus() {
        let bus = EventBus::new();
        let (sub, _) = collector(&bus);
        drop(bus);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = EventBus::new();
        let other = bus.clone();
        let (_sub, seen) = collector(&bus);
        other.publish(&event("via-clone"));
        assert_eq!(*seen.lock().unwrap(), vec!["via-clone"]);
        assert_eq!(other.subscriber_count(), 1);
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        let bus = EventBus::new();
        let (a, _) = collector(&bus);
        let (b, _) = collector(&bus);
        assert_ne!(a.id(), b.id());
    }
}
