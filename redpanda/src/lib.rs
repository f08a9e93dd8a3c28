//! Consumer group manager and Redpanda/Kafka client.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  Claim   ┌──────────────────────┐  record  ┌─────────────┐
//! │ GroupClient      │ ───────► │ ConsumerGroupManager │ ───────► │ EventRouter │
//! │ (KafkaGroupClient│ ◄─────── │  one task/partition  │          └─────────────┘
//! │  or a test fake) │  commit  └──────────────────────┘
//! └──────────────────┘
//! ```
//!
//! # Delivery semantics
//!
//! **At-least-once**:
//! - Records of one partition are dispatched strictly in offset order, one at a time
//! - A record's offset is committed only after its dispatch completed
//! - A crash between dispatch and commit redelivers the record
//! - Partitions are processed concurrently with no cross-partition ordering
//!
//! # Example
//!
//! ```no_run
//! use readmodels_redpanda::{ConsumerGroupManager, KafkaGroupClient, KafkaGroupConfig};
//! use readmodels_core::EventRouter;
//! use std::sync::Arc;
//!
//! # async fn example(router: EventRouter) -> Result<(), Box<dyn std::error::Error>> {
//! let config = KafkaGroupConfig::new("localhost:9092", "readmodels", vec!["events".to_string()]);
//! let client = Arc::new(KafkaGroupClient::connect(&config)?);
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!
//! let manager = ConsumerGroupManager::new(client, Arc::new(router), shutdown);
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod group;
pub mod kafka;
pub mod manager;
pub mod publisher;

pub use group::{
    Claim, GroupClient, GroupError, GroupFuture, GroupSignal, GroupState, LogRecord, PartitionClaim,
    ReadyGate, RecordStream,
};
pub use kafka::{KafkaGroupClient, KafkaGroupConfig};
pub use manager::ConsumerGroupManager;
pub use publisher::{KafkaEventPublisher, PublishError};
