//! Domain event envelope.
//!
//! Events arrive from the log as JSON objects together with a routing key naming
//! their type. This module defines the [`Event`] trait implemented by every typed
//! event and the [`SerializedEvent`] envelope used on the wire.
//!
//! # Design
//!
//! Unlike an event store that owns its own binary format, the read side consumes
//! payloads produced upstream, so the wire format is plain JSON. The event type
//! travels next to the payload (as the log record key) rather than inside it.
//!
//! # Example
//!
//! ```
//! use readmodels_core::event::{Event, SerializedEvent};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct UserLikedPost {
//!     username: String,
//!     post_id: String,
//! }
//!
//! impl Event for UserLikedPost {
//!     const EVENT_TYPE: &'static str = "UserLikedPost";
//! }
//!
//! let event = UserLikedPost { username: "u1".into(), post_id: "p1".into() };
//! let serialized = SerializedEvent::from_event(&event).unwrap();
//! assert_eq!(serialized.event_type, "UserLikedPost");
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// A typed domain event consumed by the read side.
///
/// `EVENT_TYPE` is the stable routing name carried alongside the payload
/// (for example `"PostWasCreated"`). It is the key used by the
/// [`EventRouter`](crate::router::EventRouter).
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing name of this event type.
    const EVENT_TYPE: &'static str;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes do not match
    /// the expected event shape.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An event as it travels on the log: routing name plus raw JSON payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"UserLikedPost"`).
    pub event_type: String,

    /// The JSON payload.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, data: Vec<u8>) -> Self {
        Self { event_type, data }
    }

    /// Create a serialized event from a typed [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: E::EVENT_TYPE.to_string(),
            data: event.to_bytes()?,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct CommentWasDeleted {
        comment_id: String,
        post_id: String,
    }

    impl Event for CommentWasDeleted {
        const EVENT_TYPE: &'static str = "CommentWasDeleted";
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn serialized_event_uses_camel_case_json() {
        let event = CommentWasDeleted {
            comment_id: "c1".to_string(),
            post_id: "p1".to_string(),
        };

        let serialized = SerializedEvent::from_event(&event).expect("serialization should succeed");

        assert_eq!(serialized.event_type, "CommentWasDeleted");
        let json: serde_json::Value =
            serde_json::from_slice(&serialized.data).expect("payload should be JSON");
        assert_eq!(json["commentId"], "c1");
        assert_eq!(json["postId"], "p1");
    }

    #[test]
    fn from_bytes_rejects_wrong_shape() {
        let result = CommentWasDeleted::from_bytes(br#"{"commentId": 7}"#);
        assert!(matches!(result, Err(EventError::DeserializationError(_))));
    }

    #[test]
    fn serialized_event_display() {
        let serialized = SerializedEvent::new("UserLikedPost".to_string(), vec![1, 2, 3, 4, 5]);

        let display = format!("{serialized}");
        assert!(display.contains("UserLikedPost"));
        assert!(display.contains("5 bytes"));
    }
}
