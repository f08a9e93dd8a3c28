//! rdkafka-backed [`GroupClient`].
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────── driver task ───────────────┐
//! rebalance callbacks │ Assigned ─► one lane per partition        │──► Claim ─► manager
//!   (GroupContext) ──►│ Revoked  ─► end partition streams         │
//!                     │ consumer.recv() ─► lane of the partition  │
//!                     └───────────────────────────────────────────┘
//! ```
//!
//! Every record comes off the single consumer queue and the driver routes it
//! into the lane of its partition, so each partition stream sees its records in
//! offset order. The consumer queue must keep being polled for rebalance
//! callbacks to fire, which is also the driver's job.
//!
//! A lane that falls [`PAUSE_AT`] records behind pauses its partition at the
//! broker and resumes it once the worker is back down to [`RESUME_AT`]. Other
//! partitions keep flowing meanwhile.
//!
//! # Errors
//!
//! Transient fetch errors (broker transport, timeouts, leader changes) are
//! logged at `warn` and consumption continues; librdkafka retries them itself.
//! Fatal client errors are pushed into every open partition stream and into the
//! claim channel, then the driver stops. The manager treats those as fatal.
//!
//! The event type is read from the record key, falling back to the
//! `event-type` header. Offsets are committed (`offset + 1`) after dispatch.
//!
//! The default eager assignor is assumed: a revocation ends every partition
//! stream of the current claim.

use crate::group::{Claim, GroupClient, GroupError, GroupFuture, LogRecord, PartitionClaim, RecordStream};
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Headers, Message};
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Undispatched records in one lane at which its partition is paused.
pub const PAUSE_AT: usize = 512;

/// Undispatched records in one lane at which a paused partition is resumed.
pub const RESUME_AT: usize = 64;

pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Connection and membership settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaGroupConfig {
    /// Comma-separated broker list
    pub brokers: String,
    /// Consumer group id
    pub group_id: String,
    /// Subscribed topics
    pub topics: Vec<String>,
    /// Where to start without a committed offset (`earliest` / `latest`)
    pub auto_offset_reset: String,
    /// Group session timeout
    pub session_timeout: Duration,
}

impl KafkaGroupConfig {
    /// Settings with `earliest` offset reset and a 6 s session timeout.
    #[must_use]
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            topics,
            auto_offset_reset: "earliest".to_string(),
            session_timeout: Duration::from_secs(6),
        }
    }

    /// Override the offset reset policy.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = policy.into();
        self
    }

    /// Override the session timeout.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

enum RebalanceEvent {
    Assigned(Vec<(String, i32)>),
    Revoked,
}

/// Forwards rebalance callbacks to the driver task.
struct GroupContext {
    events: mpsc::UnboundedSender<RebalanceEvent>,
    revocations: watch::Sender<u64>,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            tracing::info!(partitions = partitions.count(), "Partitions revoked");
            // Ends partition streams before the driver sees the event.
            self.revocations.send_modify(|count| *count += 1);
            if self.events.send(RebalanceEvent::Revoked).is_err() {
                tracing::debug!("Driver gone, dropping revocation");
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                let assigned = partitions
                    .elements()
                    .iter()
                    .map(|element| (element.topic().to_string(), element.partition()))
                    .collect();
                if self.events.send(RebalanceEvent::Assigned(assigned)).is_err() {
                    tracing::debug!("Driver gone, dropping assignment");
                }
            }
            Rebalance::Error(e) => tracing::error!(error = %e, "Rebalance failed"),
            Rebalance::Revoke(_) => {}
        }
    }
}

type GroupConsumer = StreamConsumer<GroupContext>;

/// Consumer group member backed by rdkafka.
pub struct KafkaGroupClient {
    consumer: Arc<GroupConsumer>,
    claims: tokio::sync::Mutex<mpsc::Receiver<Result<Claim, GroupError>>>,
    close: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl KafkaGroupClient {
    /// Create the consumer, subscribe, and start the driver task.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Client`] if the consumer cannot be created or subscribed.
    pub fn connect(config: &KafkaGroupConfig) -> Result<Self, GroupError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (revocations, revoked) = watch::channel(0);
        let context = GroupContext {
            events: events_tx,
            revocations,
        };

        let consumer: GroupConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create_with_context(context)
            .map_err(|e| GroupError::Client(format!("Failed to create consumer: {e}")))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| GroupError::Client(format!("Failed to subscribe to topics: {e}")))?;

        tracing::info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?config.topics,
            auto_offset_reset = %config.auto_offset_reset,
            "Subscribed to topics"
        );

        let consumer = Arc::new(consumer);
        let (claims_tx, claims_rx) = mpsc::channel(1);
        let (close, close_rx) = watch::channel(false);
        let driver = tokio::spawn(drive(
            Arc::clone(&consumer),
            events_rx,
            claims_tx,
            revoked,
            close_rx,
        ));

        Ok(Self {
            consumer,
            claims: tokio::sync::Mutex::new(claims_rx),
            close,
            driver: Mutex::new(Some(driver)),
        })
    }
}

impl GroupClient for KafkaGroupClient {
    fn next_claim(&self) -> GroupFuture<'_, Claim> {
        Box::pin(async move {
            if *self.close.borrow() {
                return Err(GroupError::Closed);
            }
            self.claims.lock().await.recv().await.ok_or(GroupError::Closed)?
        })
    }

    fn commit(&self, record: &LogRecord) -> GroupFuture<'_, ()> {
        let mut offsets = TopicPartitionList::new();
        let result = offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .and_then(|()| self.consumer.commit(&offsets, CommitMode::Async))
            .map_err(|e| GroupError::Commit(e.to_string()));
        Box::pin(std::future::ready(result))
    }

    fn close(&self) -> GroupFuture<'_, ()> {
        Box::pin(async move {
            self.close.send_replace(true);
            let driver = self
                .driver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(driver) = driver {
                driver
                    .await
                    .map_err(|e| GroupError::Client(format!("Driver task failed: {e}")))?;
            }
            self.consumer.unsubscribe();
            tracing::info!("Left consumer group");
            Ok(())
        })
    }
}

async fn closed(close: &mut watch::Receiver<bool>) {
    // A dropped sender means the client itself is gone.
    let _ = close.wait_for(|closed| *closed).await;
}

type PartitionKey = (String, i32);

async fn drive(
    consumer: Arc<GroupConsumer>,
    mut events: mpsc::UnboundedReceiver<RebalanceEvent>,
    claims: mpsc::Sender<Result<Claim, GroupError>>,
    revoked: watch::Receiver<u64>,
    mut close: watch::Receiver<bool>,
) {
    let mut generation: u64 = 0;
    let (resume_tx, mut resumes) = mpsc::unbounded_channel();
    let mut lanes = Lanes::new(PAUSE_AT, RESUME_AT, resume_tx);

    loop {
        tokio::select! {
            () = closed(&mut close) => break,
            event = events.recv() => match event {
                Some(RebalanceEvent::Assigned(assigned)) => {
                    generation += 1;
                    // A partition paused in an earlier generation starts flowing again.
                    for key in &assigned {
                        set_paused(&consumer, key, false);
                    }
                    let partitions = lanes.assign(assigned, &revoked);
                    let claim = Claim { generation, partitions };
                    if claims.send(Ok(claim)).await.is_err() {
                        break;
                    }
                }
                Some(RebalanceEvent::Revoked) => lanes.clear(),
                None => break,
            },
            Some(key) = resumes.recv() => {
                if lanes.release(&key) {
                    set_paused(&consumer, &key, false);
                }
            }
            message = consumer.recv() => match message {
                Ok(message) => match lanes.route(to_record(&message)) {
                    Routed::Delivered => {}
                    Routed::Saturated(key) => {
                        set_paused(&consumer, &key, true);
                        // The worker may have caught up before the flag was visible to it.
                        if lanes.drained(&key) {
                            set_paused(&consumer, &key, false);
                        }
                    }
                    Routed::Unclaimed((topic, partition)) => tracing::warn!(
                        topic = %topic,
                        partition,
                        "Record for an unclaimed partition, it will be redelivered"
                    ),
                },
                Err(e) if is_fatal(&e) => {
                    tracing::error!(error = %e, "Fatal Kafka client error, stopping consumption");
                    let error = GroupError::Client(format!("Fatal Kafka client error: {e}"));
                    lanes.fail(&error);
                    tokio::select! {
                        () = closed(&mut close) => {}
                        _ = claims.send(Err(error)) => {}
                    }
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "Transient Kafka fetch error, continuing"),
            },
        }
    }

    tracing::debug!("Consumer driver stopped");
}

/// Whether a fetch error leaves the client unusable.
///
/// Authorization failures count: they persist until ACLs change.
fn is_fatal(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::Fatal
                | RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
        )
    )
}

fn set_paused(consumer: &GroupConsumer, (topic, partition): &PartitionKey, paused: bool) {
    let mut partitions = TopicPartitionList::new();
    partitions.add_partition(topic, *partition);
    let result = if paused {
        consumer.pause(&partitions)
    } else {
        consumer.resume(&partitions)
    };
    match result {
        Ok(()) => tracing::debug!(topic = %topic, partition, paused, "Partition flow changed"),
        Err(e) => tracing::warn!(topic = %topic, partition, paused, error = %e, "Failed to change partition flow"),
    }
}

/// Undispatched record count of one lane.
#[derive(Debug, Default)]
struct Backlog {
    pending: AtomicUsize,
    paused: AtomicBool,
}

struct Lane {
    records: mpsc::UnboundedSender<Result<LogRecord, GroupError>>,
    backlog: Arc<Backlog>,
}

#[derive(Debug, PartialEq, Eq)]
enum Routed {
    Delivered,
    /// The lane just reached the pause mark; the partition should be paused.
    Saturated(PartitionKey),
    Unclaimed(PartitionKey),
}

/// Per-partition channels of the current claim.
struct Lanes {
    pause_at: usize,
    resume_at: usize,
    resumes: mpsc::UnboundedSender<PartitionKey>,
    open: HashMap<PartitionKey, Lane>,
}

impl Lanes {
    fn new(pause_at: usize, resume_at: usize, resumes: mpsc::UnboundedSender<PartitionKey>) -> Self {
        Self {
            pause_at,
            resume_at,
            resumes,
            open: HashMap::new(),
        }
    }

    /// Replace every lane with one per assigned partition.
    fn assign(&mut self, assigned: Vec<PartitionKey>, revoked: &watch::Receiver<u64>) -> Vec<PartitionClaim> {
        self.open.clear();
        let mut partitions = Vec::with_capacity(assigned.len());
        for (topic, partition) in assigned {
            let (records_tx, records_rx) = mpsc::unbounded_channel();
            let backlog = Arc::new(Backlog::default());
            self.open.insert(
                (topic.clone(), partition),
                Lane {
                    records: records_tx,
                    backlog: Arc::clone(&backlog),
                },
            );
            let drain = LaneDrain {
                key: (topic.clone(), partition),
                backlog,
                resume_at: self.resume_at,
                resumes: self.resumes.clone(),
            };
            partitions.push(PartitionClaim {
                records: partition_records(records_rx, drain, revoked.clone()),
                topic,
                partition,
            });
        }
        partitions
    }

    fn route(&self, record: LogRecord) -> Routed {
        let key = (record.topic.clone(), record.partition);
        let Some(lane) = self.open.get(&key) else {
            return Routed::Unclaimed(key);
        };
        // Counted before the send so the worker never takes more than was counted.
        let pending = lane.backlog.pending.fetch_add(1, Ordering::AcqRel) + 1;
        if lane.records.send(Ok(record)).is_err() {
            lane.backlog.pending.fetch_sub(1, Ordering::AcqRel);
            return Routed::Unclaimed(key);
        }
        if pending >= self.pause_at && !lane.backlog.paused.swap(true, Ordering::AcqRel) {
            return Routed::Saturated(key);
        }
        Routed::Delivered
    }

    /// Clears the paused flag; `true` if the partition was paused.
    fn release(&self, key: &PartitionKey) -> bool {
        self.open
            .get(key)
            .is_some_and(|lane| lane.backlog.paused.swap(false, Ordering::AcqRel))
    }

    /// Like [`Lanes::release`], but only once the lane is back under the resume mark.
    fn drained(&self, key: &PartitionKey) -> bool {
        self.open.get(key).is_some_and(|lane| {
            lane.backlog.pending.load(Ordering::Acquire) <= self.resume_at
                && lane.backlog.paused.swap(false, Ordering::AcqRel)
        })
    }

    /// Push `error` into every open lane and drop them.
    fn fail(&mut self, error: &GroupError) {
        for (_, lane) in self.open.drain() {
            let _ = lane.records.send(Err(error.clone()));
        }
    }

    fn clear(&mut self) {
        self.open.clear();
    }
}

/// Worker side of a lane: counts records out and asks for a resume.
struct LaneDrain {
    key: PartitionKey,
    backlog: Arc<Backlog>,
    resume_at: usize,
    resumes: mpsc::UnboundedSender<PartitionKey>,
}

impl LaneDrain {
    fn taken(&self) {
        let left = self.backlog.pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if left <= self.resume_at && self.backlog.paused.load(Ordering::Acquire) {
            // Driver gone means nothing is left to resume.
            let _ = self.resumes.send(self.key.clone());
        }
    }
}

enum Next {
    Record(Result<LogRecord, GroupError>),
    Revoked,
}

fn partition_records(
    mut records: mpsc::UnboundedReceiver<Result<LogRecord, GroupError>>,
    drain: LaneDrain,
    mut revoked: watch::Receiver<u64>,
) -> RecordStream {
    // Only revocations after this assignment end the stream.
    revoked.borrow_and_update();

    Box::pin(async_stream::stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = revoked.changed() => Next::Revoked,
                record = records.recv() => match record {
                    Some(record) => Next::Record(record),
                    None => Next::Revoked,
                },
            };
            match next {
                Next::Record(record) => {
                    if record.is_ok() {
                        drain.taken();
                    }
                    yield record;
                }
                Next::Revoked => break,
            }
        }
    })
}

fn to_record<M: Message>(message: &M) -> LogRecord {
    let event_type = message
        .key()
        .and_then(|key| std::str::from_utf8(key).ok())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| header_event_type(message));

    LogRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        event_type,
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

fn header_event_type<M: Message>(message: &M) -> Option<String> {
    message
        .headers()?
        .iter()
        .find(|header| header.key == EVENT_TYPE_HEADER)
        .and_then(|header| header.value)
        .and_then(|value| std::str::from_utf8(value).ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;
    use rdkafka::Timestamp;
    use rdkafka::message::{Header, OwnedHeaders, OwnedMessage};

    fn message(key: Option<&str>, headers: Option<OwnedHeaders>) -> OwnedMessage {
        OwnedMessage::new(
            Some(br#"{"username":"u1","postId":"p1"}"#.to_vec()),
            key.map(|k| k.as_bytes().to_vec()),
            "readmodels.events".to_string(),
            Timestamp::NotAvailable,
            3,
            42,
            headers,
        )
    }

    #[test]
    fn event_type_comes_from_the_key() {
        let record = to_record(&message(Some("UserLikedPost"), None));
        assert_eq!(record.event_type.as_deref(), Some("UserLikedPost"));
        assert_eq!((record.partition, record.offset), (3, 42));
        assert_eq!(record.topic, "readmodels.events");
    }

    #[test]
    fn header_is_the_fallback() {
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some("UserUnlikedPost"),
        });
        let record = to_record(&message(None, Some(headers)));
        assert_eq!(record.event_type.as_deref(), Some("UserUnlikedPost"));
    }

    #[test]
    fn untyped_record_has_no_event_type() {
        assert_eq!(to_record(&message(None, None)).event_type, None);
    }

    fn record(partition: i32, offset: i64) -> LogRecord {
        LogRecord {
            topic: "events".to_string(),
            partition,
            offset,
            event_type: Some("UserLikedPost".to_string()),
            payload: Vec::new(),
        }
    }

    fn key(partition: i32) -> PartitionKey {
        ("events".to_string(), partition)
    }

    async fn offsets(stream: RecordStream) -> Vec<i64> {
        stream.map(|record| record.unwrap().offset).collect().await
    }

    #[tokio::test]
    async fn each_partition_stream_keeps_offset_order() {
        let (_revocations, revoked) = watch::channel(0);
        let (resumes, _resume_rx) = mpsc::unbounded_channel();
        let mut lanes = Lanes::new(PAUSE_AT, RESUME_AT, resumes);
        let mut claimed = lanes.assign(vec![key(0), key(1)], &revoked);

        for (partition, offset) in [(0, 10), (1, 7), (0, 11), (0, 12), (1, 8), (0, 13)] {
            assert_eq!(lanes.route(record(partition, offset)), Routed::Delivered);
        }
        lanes.clear();

        let second = claimed.pop().unwrap();
        let first = claimed.pop().unwrap();
        assert_eq!((first.partition, second.partition), (0, 1));
        assert_eq!(offsets(first.records).await, vec![10, 11, 12, 13]);
        assert_eq!(offsets(second.records).await, vec![7, 8]);
    }

    #[tokio::test]
    async fn lagging_lane_pauses_until_the_worker_catches_up() {
        let (_revocations, revoked) = watch::channel(0);
        let (resumes, mut resume_rx) = mpsc::unbounded_channel();
        let mut lanes = Lanes::new(3, 1, resumes);
        let mut claimed = lanes.assign(vec![key(0)], &revoked);
        let mut records = claimed.pop().unwrap().records;

        assert_eq!(lanes.route(record(0, 1)), Routed::Delivered);
        assert_eq!(lanes.route(record(0, 2)), Routed::Delivered);
        assert_eq!(lanes.route(record(0, 3)), Routed::Saturated(key(0)));
        assert_eq!(lanes.route(record(0, 4)), Routed::Delivered);
        assert!(!lanes.drained(&key(0)));

        records.next().await.unwrap().unwrap();
        records.next().await.unwrap().unwrap();
        assert!(resume_rx.try_recv().is_err());

        records.next().await.unwrap().unwrap();
        assert_eq!(resume_rx.try_recv().unwrap(), key(0));
        assert!(lanes.release(&key(0)));
        assert!(!lanes.release(&key(0)));
    }

    #[tokio::test]
    async fn records_for_other_partitions_are_unclaimed() {
        let (_revocations, revoked) = watch::channel(0);
        let (resumes, _resume_rx) = mpsc::unbounded_channel();
        let mut lanes = Lanes::new(PAUSE_AT, RESUME_AT, resumes);
        let _claimed = lanes.assign(vec![key(0)], &revoked);

        assert_eq!(lanes.route(record(5, 1)), Routed::Unclaimed(key(5)));
        lanes.clear();
        assert_eq!(lanes.route(record(0, 1)), Routed::Unclaimed(key(0)));
    }

    #[tokio::test]
    async fn revocation_ends_the_stream_with_records_left() {
        let (revocations, revoked) = watch::channel(0);
        let (resumes, _resume_rx) = mpsc::unbounded_channel();
        let mut lanes = Lanes::new(PAUSE_AT, RESUME_AT, resumes);
        let mut claimed = lanes.assign(vec![key(0)], &revoked);
        lanes.route(record(0, 1));

        revocations.send_modify(|count| *count += 1);
        assert!(claimed.pop().unwrap().records.next().await.is_none());
    }

    #[tokio::test]
    async fn fatal_error_reaches_every_partition_stream() {
        let (_revocations, revoked) = watch::channel(0);
        let (resumes, _resume_rx) = mpsc::unbounded_channel();
        let mut lanes = Lanes::new(PAUSE_AT, RESUME_AT, resumes);
        let mut claimed = lanes.assign(vec![key(0), key(1)], &revoked);
        lanes.route(record(0, 1));

        let error = GroupError::Client("broker fenced".to_string());
        lanes.fail(&error);

        let mut second = claimed.pop().unwrap().records;
        let mut first = claimed.pop().unwrap().records;
        assert_eq!(first.next().await.unwrap().unwrap().offset, 1);
        assert_eq!(first.next().await.unwrap(), Err(error.clone()));
        assert!(first.next().await.is_none());
        assert_eq!(second.next().await.unwrap(), Err(error));
        assert!(second.next().await.is_none());
    }

    #[test]
    fn only_unrecoverable_fetch_errors_are_fatal() {
        assert!(is_fatal(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)));
        assert!(is_fatal(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::TopicAuthorizationFailed
        )));
        assert!(!is_fatal(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerTransportFailure
        )));
        assert!(!is_fatal(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::NotLeaderForPartition
        )));
    }

    #[test]
    fn config_defaults() {
        let config = KafkaGroupConfig::new("localhost:9092", "readmodels", vec!["events".to_string()])
            .auto_offset_reset("latest");
        assert_eq!(config.auto_offset_reset, "latest");
        assert_eq!(config.session_timeout, Duration::from_secs(6));
    }
}
