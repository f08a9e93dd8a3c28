//! Event-type routing.
//!
//! # Overview
//!
//! An [`EventRouter`] is an immutable table from event-type name to
//! [`EventHandler`]. It is built once at startup through
//! [`EventRouterBuilder`] and shared by reference (`Arc<EventRouter>`) with every
//! delivery path: the consumer group manager and the in-process bus.
//!
//! # Delivery contract
//!
//! - Known types are handed to exactly one handler.
//! - Unknown types are ignored: not routed, not treated as failures.
//! - Handler failures are terminal for that single event. The router logs the
//!   [`DropReason`] and moves on; it never retries and never propagates the
//!   failure to the event source.
//!
//! # Example
//!
//! ```
//! use readmodels_core::router::{Dispatch, DropReason, EventHandler, EventRouter};
//! use std::sync::Arc;
//!
//! struct Noop;
//!
//! #[async_trait::async_trait]
//! impl EventHandler for Noop {
//!     async fn handle(&self, _payload: &[u8]) -> Result<(), DropReason> {
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let router = EventRouter::builder().route("UserLikedPost", Arc::new(Noop)).build();
//! assert_eq!(router.dispatch("UserLikedPost", b"{}").await, Dispatch::Handled);
//! assert_eq!(router.dispatch("SomethingElse", b"{}").await, Dispatch::Ignored);
//! # });
//! ```

use crate::store::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a single event was dropped without being projected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Payload did not match the event shape.
    #[error("Invalid event data: {0}")]
    InvalidEventData(String),

    /// A timestamp field did not match the fixed layout.
    #[error("Invalid timestamp in field '{field}': {value}")]
    InvalidTimestamp {
        /// Payload field holding the timestamp
        field: &'static str,
        /// Raw value received
        value: String,
    },

    /// The projection repository failed (already logged by the repository).
    #[error("Projection failed: {0}")]
    Projection(#[from] StoreError),
}

/// Handles the raw payload of one event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Project one event payload.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] when the event cannot be projected.
    async fn handle(&self, payload: &[u8]) -> Result<(), DropReason>;
}

/// Outcome of routing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler projected the event.
    Handled,
    /// A handler rejected the event; it is lost.
    Dropped(DropReason),
    /// No handler is registered for the event type.
    Ignored,
}

/// Immutable event-type → handler table.
#[derive(Clone)]
pub struct EventRouter {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventRouter {
    /// Start building a router.
    #[must_use]
    pub fn builder() -> EventRouterBuilder {
        EventRouterBuilder::default()
    }

    /// Route one event to its handler and wait for the handler to finish.
    pub async fn dispatch(&self, event_type: &str, payload: &[u8]) -> Dispatch {
        let Some(handler) = self.handlers.get(event_type) else {
            tracing::debug!(event_type, "No handler registered, ignoring event");
            metrics::counter!("readmodels_events_ignored_total").increment(1);
            return Dispatch::Ignored;
        };

        match handler.handle(payload).await {
            Ok(()) => {
                tracing::debug!(event_type, "Event projected");
                metrics::counter!("readmodels_events_handled_total", "event_type" => event_type.to_string())
                    .increment(1);
                Dispatch::Handled
            }
            Err(reason) => {
                tracing::warn!(event_type, reason = %reason, "Event dropped");
                metrics::counter!("readmodels_events_dropped_total", "event_type" => event_type.to_string())
                    .increment(1);
                Dispatch::Dropped(reason)
            }
        }
    }

    /// Whether `event_type` has a handler.
    #[must_use]
    pub fn routes(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Every routed event type, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("event_types", &self.event_types())
            .finish()
    }
}

/// Builder for an [`EventRouter`].
#[derive(Default)]
pub struct EventRouterBuilder {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventRouterBuilder {
    /// Register the handler for `event_type`, replacing any previous one.
    #[must_use]
    pub fn route(mut self, event_type: &'static str, handler: Arc<dyn EventHandler>) -> Self {
        if self.handlers.insert(event_type, handler).is_some() {
            tracing::warn!(event_type, "Handler registered twice, keeping the last one");
        }
        self
    }

    /// Freeze the table.
    #[must_use]
    pub fn build(self) -> EventRouter {
        EventRouter {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        outcome: Result<(), DropReason>,
    }

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _payload: &[u8]) -> Result<(), DropReason> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn counting(outcome: Result<(), DropReason>) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            outcome,
        })
    }

    #[tokio::test]
    async fn dispatch_reaches_only_the_registered_handler() {
        let liked = counting(Ok(()));
        let unliked = counting(Ok(()));
        let router = EventRouter::builder()
            .route("UserLikedPost", liked.clone())
            .route("UserUnlikedPost", unliked.clone())
            .build();

        assert_eq!(router.dispatch("UserLikedPost", b"{}").await, Dispatch::Handled);

        assert_eq!(liked.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unliked.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let router = EventRouter::builder()
            .route("UserLikedPost", counting(Ok(())))
            .build();

        assert_eq!(router.dispatch("OrderPlaced", b"{}").await, Dispatch::Ignored);
        assert!(!router.routes("OrderPlaced"));
    }

    #[tokio::test]
    async fn handler_failure_is_reported_not_retried() {
        let failing = counting(Err(DropReason::InvalidEventData("bad".to_string())));
        let router = EventRouter::builder()
            .route("PostWasCreated", failing.clone())
            .build();

        let outcome = router.dispatch("PostWasCreated", b"nope").await;

        assert!(matches!(outcome, Dispatch::Dropped(DropReason::InvalidEventData(_))));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_types_are_sorted() {
        let router = EventRouter::builder()
            .route("b", counting(Ok(())))
            .route("a", counting(Ok(())))
            .build();
        assert_eq!(router.event_types(), vec!["a", "b"]);
    }

    #[test]
    fn invalid_event_data_message() {
        let reason = DropReason::InvalidEventData("missing field `postId`".to_string());
        assert!(reason.to_string().starts_with("Invalid event data"));
    }
}
