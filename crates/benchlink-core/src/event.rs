/*!
 * Registry event bus for BenchLink.
 *
 * Best-effort fan-out of registry and resource-state change
 * notifications to local and remote subscribers. Delivery is unordered
 * with respect to registry mutation completion: a subscriber may
 * receive a creation notice for a resource that has already been
 * removed again, and must re-query rather than trust the event.
 */
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::types::{ResourceId, Value};

/// Maximum number of events that can be buffered per subscriber
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The kind of a registry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A resource was created in the registry
    ResourceCreated,
    /// A resource was removed from the registry
    ResourceRemoved,
    /// A driver was attached to a resource
    DriverAttached,
    /// A driver was detached from a resource
    DriverDetached,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ResourceCreated => "resource-created",
            EventKind::ResourceRemoved => "resource-removed",
            EventKind::DriverAttached => "driver-attached",
            EventKind::DriverDetached => "driver-detached",
        };
        write!(f, "{}", s)
    }
}

/// A registry change notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// What happened
    pub kind: EventKind,
    /// The affected resource
    pub resource: ResourceId,
    /// Optional event payload
    pub payload: Option<Value>,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
}

impl RegistryEvent {
    /// Create a new event for a resource
    pub fn new(kind: EventKind, resource: ResourceId) -> Self {
        Self {
            kind,
            resource,
            payload: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a payload to the event
    pub fn with_payload<V: Into<Value>>(mut self, payload: V) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// A subscription pattern over event kinds.
///
/// An empty filter matches every kind.
#[derive(Debug, Clone, Default)]
pub struct EventFilter(Vec<EventKind>);

impl EventFilter {
    /// Match all event kinds
    pub fn all() -> Self {
        Self(Vec::new())
    }

    /// Match only the given kinds
    pub fn kinds<I: IntoIterator<Item = EventKind>>(kinds: I) -> Self {
        Self(kinds.into_iter().collect())
    }

    /// Check whether an event passes the filter
    pub fn matches(&self, event: &RegistryEvent) -> bool {
        self.0.is_empty() || self.0.contains(&event.kind)
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        Self(vec![kind])
    }
}

/// A filtered event subscription
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<RegistryEvent>,
    filter: EventFilter,
}

impl EventSubscription {
    /// Receive the next event passing the filter.
    ///
    /// Returns `None` once the bus has shut down and the backlog is
    /// drained. A lagged subscriber skips the lost events and keeps
    /// receiving; delivery is best-effort.
    pub async fn recv(&mut self) -> Option<RegistryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, {} events lost", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting; `None` if no matching event is queued
    pub fn try_recv(&mut self) -> Option<RegistryEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!("Event subscriber lagged, {} events lost", missed);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Event bus for publishing and subscribing to registry events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    /// Create a new event bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached. Publishing
    /// never blocks and never fails the caller; with no subscribers
    /// the event is simply dropped.
    pub fn publish(&self, event: RegistryEvent) -> usize {
        if self.sender.receiver_count() == 0 {
            trace!(kind = %event.kind, resource = %event.resource, "No subscribers for event");
            return 0;
        }
        match self.sender.send(event) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }

    /// Subscribe to events matching the filter
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Subscribe with a callback invoked for each matching event.
    ///
    /// The callback runs on a spawned delivery task; the returned
    /// handle ends when the bus shuts down.
    pub fn subscribe_fn<F>(&self, filter: EventFilter, callback: F) -> JoinHandle<()>
    where
        F: Fn(RegistryEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(filter);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                callback(event);
            }
        })
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared event bus that can be cloned
#[derive(Debug, Clone)]
pub struct SharedEventBus(Arc<EventBus>);

impl SharedEventBus {
    /// Create a new shared event bus
    pub fn new() -> Self {
        Self(Arc::new(EventBus::new()))
    }

    /// Create a new shared event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Publish an event
    pub fn publish(&self, event: RegistryEvent) -> usize {
        self.0.publish(event)
    }

    /// Subscribe to events matching the filter
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.0.subscribe(filter)
    }

    /// Subscribe with a callback invoked for each matching event
    pub fn subscribe_fn<F>(&self, filter: EventFilter, callback: F) -> JoinHandle<()>
    where
        F: Fn(RegistryEvent) + Send + 'static,
    {
        self.0.subscribe_fn(filter, callback)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }
}

impl Default for SharedEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        let id = ResourceId::new();
        let reached = bus.publish(RegistryEvent::new(EventKind::ResourceCreated, id));
        assert_eq!(reached, 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::ResourceCreated);
        assert_eq!(event.resource, id);
    }

    #[tokio::test]
    async fn test_filter_skips_other_kinds() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::kinds([EventKind::DriverAttached]));

        let id = ResourceId::new();
        bus.publish(RegistryEvent::new(EventKind::ResourceCreated, id));
        bus.publish(
            RegistryEvent::new(EventKind::DriverAttached, id).with_payload("scope-driver"),
        );

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::DriverAttached);
        assert_eq!(event.payload, Some(Value::String("scope-driver".into())));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_empty_filter_matches_all_kinds() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        let id = ResourceId::new();
        bus.publish(RegistryEvent::new(EventKind::ResourceCreated, id));
        bus.publish(RegistryEvent::new(EventKind::DriverAttached, id));
        bus.publish(RegistryEvent::new(EventKind::DriverDetached, id));
        bus.publish(RegistryEvent::new(EventKind::ResourceRemoved, id));

        for expected in [
            EventKind::ResourceCreated,
            EventKind::DriverAttached,
            EventKind::DriverDetached,
            EventKind::ResourceRemoved,
        ] {
            assert_eq!(sub.recv().await.unwrap().kind, expected);
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = SharedEventBus::new();
        let mut sub1 = bus.subscribe(EventFilter::all());
        let mut sub2 = bus.subscribe(EventFilter::all());

        let id = ResourceId::new();
        let reached = bus.publish(RegistryEvent::new(EventKind::ResourceRemoved, id));
        assert_eq!(reached, 2);

        assert_eq!(sub1.recv().await.unwrap().resource, id);
        assert_eq!(sub2.recv().await.unwrap().resource, id);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        let reached = bus.publish(RegistryEvent::new(
            EventKind::ResourceCreated,
            ResourceId::new(),
        ));
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn test_subscribe_fn_delivers() {
        let bus = SharedEventBus::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = bus.subscribe_fn(EventFilter::kinds([EventKind::ResourceRemoved]), move |e| {
            let _ = tx.send(e.resource);
        });

        let id = ResourceId::new();
        bus.publish(RegistryEvent::new(EventKind::ResourceCreated, id));
        bus.publish(RegistryEvent::new(EventKind::ResourceRemoved, id));

        assert_eq!(rx.recv().await, Some(id));
        handle.abort();
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::ResourceCreated.to_string(), "resource-created");
        assert_eq!(EventKind::DriverDetached.to_string(), "driver-detached");
    }
}
