//! In-process publish/subscribe for lifecycle signals.
//!
//! Subscribers are prioritized async callbacks. A `publish` snapshots the
//! subscriber set, invokes callbacks in descending priority order (ties by
//! insertion), and resolves once every callback has settled. Callback
//! failures are isolated: they are logged and republished as
//! `system:error`, never propagated to the publisher.

use crate::Value;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::{Future, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::names;

/// Error type surfaced by subscriber callbacks
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), SubscriberError>> + Send + Sync>;

/// A published event as seen by subscribers
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Per-subscription settings
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Higher priorities are invoked first within a publish
    pub priority: i32,
    /// Remove the subscription after its first invocation
    pub once: bool,
    /// Run concurrently with other async subscribers of the same publish
    pub run_async: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self { priority: 0, once: false, run_async: true }
    }
}

impl SubscribeOptions {
    pub fn priority(priority: i32) -> Self {
        Self { priority, ..Self::default() }
    }

    pub fn once() -> Self {
        Self { once: true, ..Self::default() }
    }
}

#[derive(Clone)]
struct Subscriber {
    id: Uuid,
    priority: i32,
    once: bool,
    run_async: bool,
    seq: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

struct BusInner {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
    seq: AtomicU64,
}

/// Opaque handle for an active listener. Its only powers are
/// unsubscription and activity inspection.
pub struct Subscription {
    pub event_type: String,
    pub id: Uuid,
    active: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove this subscription from its bus. Idempotent.
    pub async fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(inner) = self.bus.upgrade() {
            remove_subscriber(&inner, &self.event_type, self.id).await;
        }
    }
}

async fn remove_subscriber(inner: &BusInner, event_type: &str, id: Uuid) {
    let mut table = inner.subscribers.write().await;
    if let Some(entries) = table.get_mut(event_type) {
        entries.retain(|s| {
            if s.id == id {
                s.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        if entries.is_empty() {
            table.remove(event_type);
        }
    }
}

/// Process-wide publish/subscribe bus.
///
/// Cheap to clone; clones share the subscription table. Construct
/// instances freely for isolated runs and tests, or use
/// [`EventBus::global`] for the shared default.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// The shared process-wide instance
    pub fn global() -> &'static EventBus {
        static GLOBAL: OnceLock<EventBus> = OnceLock::new();
        GLOBAL.get_or_init(EventBus::new)
    }

    /// Register a callback for an event type.
    ///
    /// The subscription takes effect for publishes that start after this
    /// call; a publish already in flight delivers to its snapshot.
    pub async fn subscribe<F, Fut>(
        &self,
        event_type: impl Into<String>,
        callback: F,
        options: SubscribeOptions,
    ) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubscriberError>> + Send + 'static,
    {
        let event_type = event_type.into();
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            priority: options.priority,
            once: options.once,
            run_async: options.run_async,
            seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
            active: Arc::new(AtomicBool::new(true)),
            callback: Arc::new(move |event| callback(event).boxed()),
        };

        let handle = Subscription {
            event_type: event_type.clone(),
            id: subscriber.id,
            active: subscriber.active.clone(),
            bus: Arc::downgrade(&self.inner),
        };

        let mut table = self.inner.subscribers.write().await;
        table.entry(event_type).or_default().push(subscriber);
        handle
    }

    /// Remove a subscription. Idempotent; unknown or already-inactive
    /// handles are a no-op.
    pub async fn unsubscribe(&self, handle: &Subscription) {
        handle.active.store(false, Ordering::SeqCst);
        remove_subscriber(&self.inner, &handle.event_type, handle.id).await;
    }

    /// Deliver an event to every current subscriber of its type.
    ///
    /// Resolves after all callbacks have settled. Callback errors are
    /// logged and republished as `system:error`; publishing
    /// `system:error` itself never re-enters (failures there are only
    /// logged).
    pub async fn publish(&self, event_type: impl Into<String>, payload: Value) {
        let event_type = event_type.into();
        let failures = self.deliver(&event_type, payload).await;

        if event_type != names::SYSTEM_ERROR {
            for failure in failures {
                let payload = Value::object([
                    ("originalEvent", Value::from(event_type.as_str())),
                    ("error", Value::from(failure.to_string())),
                ]);
                // Failures of system:error subscribers are logged in deliver
                let _ = self.deliver(names::SYSTEM_ERROR, payload).await;
            }
        }
    }

    async fn deliver(&self, event_type: &str, payload: Value) -> Vec<SubscriberError> {
        let mut snapshot: Vec<Subscriber> = {
            let table = self.inner.subscribers.read().await;
            match table.get(event_type) {
                Some(entries) => entries.clone(),
                None => return Vec::new(),
            }
        };
        snapshot.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        let event = Event {
            event_type: event_type.to_string(),
            payload,
            timestamp: Utc::now(),
        };

        let mut failures = Vec::new();
        let mut concurrent = FuturesUnordered::new();
        let mut consumed = Vec::new();

        for subscriber in &snapshot {
            if subscriber.once {
                // Claim the one allowed invocation; a concurrent publish
                // or unsubscribe may have taken it already
                if !subscriber.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
                consumed.push(subscriber.id);
            } else if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }

            let invocation = (subscriber.callback)(event.clone());
            if subscriber.run_async {
                concurrent.push(invocation);
            } else if let Err(error) = invocation.await {
                tracing::error!(event_type, %error, "event subscriber failed");
                failures.push(error);
            }
        }

        while let Some(result) = concurrent.next().await {
            if let Err(error) = result {
                tracing::error!(event_type, %error, "event subscriber failed");
                failures.push(error);
            }
        }

        for id in consumed {
            remove_subscriber(&self.inner, event_type, id).await;
        }

        failures
    }

    pub async fn has_subscribers(&self, event_type: &str) -> bool {
        self.subscriber_count(event_type).await > 0
    }

    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        let table = self.inner.subscribers.read().await;
        table.get(event_type).map(|entries| entries.len()).unwrap_or(0)
    }

    pub async fn clear_event_subscriptions(&self, event_type: &str) {
        let mut table = self.inner.subscribers.write().await;
        if let Some(entries) = table.remove(event_type) {
            for subscriber in entries {
                subscriber.active.store(false, Ordering::SeqCst);
            }
        }
    }

    pub async fn clear_all_subscriptions(&self) {
        let mut table = self.inner.subscribers.write().await;
        for entries in table.values() {
            for subscriber in entries {
                subscriber.active.store(false, Ordering::SeqCst);
            }
        }
        table.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
