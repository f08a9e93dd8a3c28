//! In-process publish/subscribe bus.
//!
//! # Overview
//!
//! An alternate delivery path to the log consumer, used for local runs and
//! tests. Subscribers register per event type and receive every event
//! published for that type.
//!
//! ```text
//! publish(event) ──► [sender: UserLikedPost] ──► subscriber task ──► EventRouter
//!                └─► [sender: UserLikedPost] ──► other subscriber
//! ```
//!
//! # Back-pressure
//!
//! Subscriber channels are bounded (capacity 1 by default). `publish` awaits
//! channel capacity for every subscriber in turn, so a subscriber that does not
//! keep up blocks the publisher.
//!
//! # Example
//!
//! ```
//! use readmodels_core::event::SerializedEvent;
//! use readmodels_core::event_bus::InProcessEventBus;
//!
//! # tokio_test::block_on(async {
//! let bus = InProcessEventBus::new();
//! let mut likes = bus.subscribe("UserLikedPost");
//!
//! let event = SerializedEvent::new("UserLikedPost".to_string(), b"{}".to_vec());
//! let publish = bus.publish(&event);
//! let (delivered, received) = tokio::join!(publish, likes.recv());
//!
//! assert_eq!(delivered, 1);
//! assert_eq!(received, Some(event));
//! # });
//! ```

use crate::event::SerializedEvent;
use crate::router::EventRouter;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default subscriber channel capacity.
pub const DEFAULT_CAPACITY: usize = 1;

/// Per-type fan-out bus backed by bounded channels.
#[derive(Debug)]
pub struct InProcessEventBus {
    subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<SerializedEvent>>>>,
    capacity: usize,
}

impl InProcessEventBus {
    /// Create a bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose subscriber channels buffer `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber for one event type.
    pub fn subscribe(&self, event_type: &str) -> mpsc::Receiver<SerializedEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber of its type.
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receiver was dropped are pruned.
    pub async fn publish(&self, event: &SerializedEvent) -> usize {
        let senders: Vec<_> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        let mut closed = false;
        for sender in &senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                closed = true;
            }
        }

        if closed {
            self.prune(&event.event_type);
        }

        tracing::trace!(event_type = %event.event_type, delivered, "Event published in-process");
        delivered
    }

    /// Number of live subscribers for an event type.
    #[must_use]
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    /// Subscribe the router to every type it routes.
    ///
    /// Spawns one task per event type; each task hands events to the router one
    /// at a time and ends when the bus is closed or dropped.
    pub fn run_router(&self, router: Arc<EventRouter>) -> Vec<JoinHandle<()>> {
        router
            .event_types()
            .into_iter()
            .map(|event_type| {
                let mut rx = self.subscribe(event_type);
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        router.dispatch(&event.event_type, &event.data).await;
                    }
                    tracing::debug!(event_type, "In-process subscriber stopped");
                })
            })
            .collect()
    }

    /// Drop every subscriber channel, ending subscriber tasks once drained.
    pub fn close(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn prune(&self, event_type: &str) {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = subscribers.get_mut(event_type) {
            senders.retain(|s| !s.is_closed());
        }
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}
