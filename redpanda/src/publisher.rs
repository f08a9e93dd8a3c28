//! Publishes serialized events to a topic.
//!
//! Payloads are the event's JSON bytes as-is. The event type is written both
//! as the record key and as the `event-type` header, so consumers can route
//! without decoding the payload.

use crate::kafka::EVENT_TYPE_HEADER;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use readmodels_core::SerializedEvent;
use std::time::Duration;
use thiserror::Error;

/// Errors from [`KafkaEventPublisher`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The producer could not be created.
    #[error("Failed to connect producer: {0}")]
    Connection(String),

    /// The broker did not acknowledge the record.
    #[error("Failed to publish to {topic}: {reason}")]
    Publish {
        /// Destination topic
        topic: String,
        /// Broker or client error
        reason: String,
    },
}

/// Kafka producer for serialized events.
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaEventPublisher {
    /// Create a producer publishing to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Connection`] if the producer cannot be created.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Connection(format!("Failed to create producer: {e}")))?;

        let topic = topic.into();
        tracing::info!(brokers = %brokers, topic = %topic, "Event publisher created");

        Ok(Self {
            producer,
            topic,
            timeout: Duration::from_secs(5),
        })
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one event and return its `(partition, offset)`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Publish`] if delivery fails or times out.
    pub async fn publish(&self, event: &SerializedEvent) -> Result<(i32, i64), PublishError> {
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(event.event_type.as_bytes()),
        });
        let record = FutureRecord::to(&self.topic)
            .key(event.event_type.as_bytes())
            .payload(&event.data)
            .headers(headers);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    event_type = %event.event_type,
                    "Event published"
                );
                Ok((partition, offset))
            }
            Err((e, _)) => {
                tracing::error!(topic = %self.topic, error = %e, "Failed to publish event");
                Err(PublishError::Publish {
                    topic: self.topic.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for KafkaEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaEventPublisher")
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
