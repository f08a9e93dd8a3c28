//! Consumer group model: lifecycle states, claims and the client seam.
//!
//! # Lifecycle
//!
//! ```text
//!            Assigned            ClaimStarted
//! Joining ────────────► Ready ────────────────► Consuming
//!                         ▲                         │
//!                Assigned │                         │ ClaimEnded
//!                         │                         ▼
//!                         └────────────────── Rebalancing
//!
//! any state ── Closed ──► Closed
//! ```
//!
//! A [`GroupClient`] hands out one [`Claim`] per assignment generation. Each
//! claimed partition carries its own record stream, which ends when the
//! assignment is revoked.

use futures::stream::BoxStream;
use readmodels_core::SerializedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::watch;

/// Lifecycle state of a consumer group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupState {
    /// Waiting for the first assignment.
    Joining,
    /// Partitions assigned, consumption not started yet.
    Ready,
    /// Partition workers are draining the current claim.
    Consuming,
    /// The previous claim ended; waiting for the next assignment.
    Rebalancing,
    /// Membership released. Terminal.
    Closed,
}

/// Input driving [`GroupState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupSignal {
    /// The client delivered an assignment.
    Assigned,
    /// Partition workers were started for the assignment.
    ClaimStarted,
    /// Every partition worker of the claim finished.
    ClaimEnded,
    /// The group was closed.
    Closed,
}

impl GroupState {
    /// Apply `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::InvalidTransition`] if `signal` is not valid in this state.
    pub const fn on(self, signal: GroupSignal) -> Result<Self, GroupError> {
        match (self, signal) {
            (_, GroupSignal::Closed) => Ok(Self::Closed),
            (Self::Joining | Self::Rebalancing, GroupSignal::Assigned) => Ok(Self::Ready),
            (Self::Ready, GroupSignal::ClaimStarted) => Ok(Self::Consuming),
            (Self::Consuming, GroupSignal::ClaimEnded) => Ok(Self::Rebalancing),
            (from, signal) => Err(GroupError::InvalidTransition { from, signal }),
        }
    }
}

/// Errors from the consumer group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The group was closed; no further claims will be delivered.
    #[error("Consumer group closed")]
    Closed,

    /// A lifecycle signal arrived in a state that does not accept it.
    #[error("Invalid consumer group transition from {from:?} on {signal:?}")]
    InvalidTransition {
        /// State when the signal arrived
        from: GroupState,
        /// Rejected signal
        signal: GroupSignal,
    },

    /// The log client failed in a way it cannot recover from.
    #[error("Consumer group client error: {0}")]
    Client(String),

    /// An offset commit failed.
    #[error("Failed to commit offset: {0}")]
    Commit(String),

    /// A partition worker stopped abnormally.
    #[error("Partition worker failed: {0}")]
    Worker(String),
}

/// One record fetched from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Routing name of the event, if the record carried one
    pub event_type: Option<String>,
    /// Raw JSON payload
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Record carrying `event` at the given position.
    #[must_use]
    pub fn from_event(topic: impl Into<String>, partition: i32, offset: i64, event: &SerializedEvent) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            event_type: Some(event.event_type.clone()),
            payload: event.data.clone(),
        }
    }
}

/// Records of one claimed partition, in offset order.
pub type RecordStream = BoxStream<'static, Result<LogRecord, GroupError>>;

/// One partition of a claim.
pub struct PartitionClaim {
    /// Topic
    pub topic: String,
    /// Partition
    pub partition: i32,
    /// Records until the assignment is revoked
    pub records: RecordStream,
}

impl std::fmt::Debug for PartitionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionClaim")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

/// All partitions assigned to this member for one generation.
#[derive(Debug)]
pub struct Claim {
    /// Assignment generation, increasing per rebalance
    pub generation: u64,
    /// Assigned partitions
    pub partitions: Vec<PartitionClaim>,
}

/// Boxed future returned by [`GroupClient`] methods.
pub type GroupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GroupError>> + Send + 'a>>;

/// Seam between the consumer group manager and a concrete log client.
pub trait GroupClient: Send + Sync {
    /// Wait for the next assignment.
    ///
    /// Returns [`GroupError::Closed`] once the client has been closed. Errors on
    /// a claim or on a partition stream are unrecoverable; transient failures
    /// stay inside the client.
    fn next_claim(&self) -> GroupFuture<'_, Claim>;

    /// Mark `record` as processed.
    fn commit(&self, record: &LogRecord) -> GroupFuture<'_, ()>;

    /// Leave the group and release resources.
    fn close(&self) -> GroupFuture<'_, ()>;
}

/// Resolves each time the consumer group receives a new assignment.
///
/// A fresh gate resolves as soon as at least one assignment has happened; each
/// further [`ReadyGate::wait`] waits for the assignment after the one it last
/// reported, so callers observe every rebalance cycle.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    cycles: watch::Receiver<u64>,
    seen: u64,
}

impl ReadyGate {
    pub(crate) const fn new(cycles: watch::Receiver<u64>) -> Self {
        Self { cycles, seen: 0 }
    }

    /// Wait for the next assignment cycle and return its number (starting at 1).
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Closed`] if the manager is gone before a new cycle.
    pub async fn wait(&mut self) -> Result<u64, GroupError> {
        let seen = self.seen;
        let cycle = *self
            .cycles
            .wait_for(|cycle| *cycle > seen)
            .await
            .map_err(|_| GroupError::Closed)?;
        self.seen = cycle;
        Ok(cycle)
    }
}
