//! Scripted [`GroupClient`] for driving the consumer group manager in tests.

use readmodels_core::SerializedEvent;
use readmodels_redpanda::{Claim, GroupClient, GroupError, GroupFuture, LogRecord, PartitionClaim};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Records of one partition in a scripted claim.
#[derive(Debug, Clone)]
pub struct ScriptedPartition {
    topic: String,
    partition: i32,
    records: Vec<Result<LogRecord, GroupError>>,
    hold_open: bool,
}

impl ScriptedPartition {
    /// Empty partition script.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
            records: Vec::new(),
            hold_open: false,
        }
    }

    /// Append a record carrying `event` at `offset`.
    #[must_use]
    pub fn event(mut self, offset: i64, event: &SerializedEvent) -> Self {
        let record = LogRecord::from_event(self.topic.clone(), self.partition, offset, event);
        self.records.push(Ok(record));
        self
    }

    /// Append an arbitrary record (untyped, malformed, ...).
    #[must_use]
    pub fn record(mut self, record: LogRecord) -> Self {
        self.records.push(Ok(record));
        self
    }

    /// Append a stream error.
    #[must_use]
    pub fn error(mut self, error: GroupError) -> Self {
        self.records.push(Err(error));
        self
    }

    /// Keep the stream open after the last record until the client closes,
    /// as a live partition would.
    #[must_use]
    pub const fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[derive(Debug)]
enum Step {
    Claim(Vec<ScriptedPartition>),
    Fail(GroupError),
}

/// A [`GroupClient`] replaying a fixed script of claims.
///
/// Once the script is exhausted, `next_claim` waits for [`GroupClient::close`]
/// and then reports [`GroupError::Closed`], unless
/// [`ScriptedGroupClient::close_when_exhausted`] was set.
///
/// # Example
///
/// ```
/// use readmodels_core::SerializedEvent;
/// use readmodels_testing::{ScriptedGroupClient, ScriptedPartition};
///
/// let event = SerializedEvent::new("UserLikedPost".to_string(), b"{}".to_vec());
/// let client = ScriptedGroupClient::new()
///     .claim(vec![ScriptedPartition::new("events", 0).event(0, &event)])
///     .close_when_exhausted();
/// assert!(client.commits().is_empty());
/// ```
#[derive(Debug)]
pub struct ScriptedGroupClient {
    steps: Mutex<VecDeque<Step>>,
    generation: Mutex<u64>,
    commits: Mutex<Vec<LogRecord>>,
    failing_commits: bool,
    close_when_exhausted: bool,
    closed: watch::Sender<bool>,
}

impl Default for ScriptedGroupClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGroupClient {
    /// Client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            steps: Mutex::new(VecDeque::new()),
            generation: Mutex::new(0),
            commits: Mutex::new(Vec::new()),
            failing_commits: false,
            close_when_exhausted: false,
            closed,
        }
    }

    /// Append an assignment of `partitions`.
    #[must_use]
    pub fn claim(self, partitions: Vec<ScriptedPartition>) -> Self {
        lock(&self.steps).push_back(Step::Claim(partitions));
        self
    }

    /// Append a `next_claim` failure.
    #[must_use]
    pub fn fail(self, error: GroupError) -> Self {
        lock(&self.steps).push_back(Step::Fail(error));
        self
    }

    /// Report [`GroupError::Closed`] as soon as the script is exhausted.
    #[must_use]
    pub const fn close_when_exhausted(mut self) -> Self {
        self.close_when_exhausted = true;
        self
    }

    /// Make every commit fail.
    #[must_use]
    pub const fn failing_commits(mut self) -> Self {
        self.failing_commits = true;
        self
    }

    /// Records committed so far, in commit order.
    #[must_use]
    pub fn commits(&self) -> Vec<LogRecord> {
        lock(&self.commits).clone()
    }

    /// Committed `(partition, offset)` pairs, in commit order.
    #[must_use]
    pub fn committed_offsets(&self) -> Vec<(i32, i64)> {
        lock(&self.commits)
            .iter()
            .map(|record| (record.partition, record.offset))
            .collect()
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn partition_claim(&self, script: ScriptedPartition) -> PartitionClaim {
        let ScriptedPartition {
            topic,
            partition,
            records,
            hold_open,
        } = script;
        let mut closed = self.closed.subscribe();
        let records = Box::pin(async_stream::stream! {
            for record in records {
                yield record;
            }
            if hold_open {
                let _ = closed.wait_for(|closed| *closed).await;
            }
        });
        PartitionClaim {
            topic,
            partition,
            records,
        }
    }
}

impl GroupClient for ScriptedGroupClient {
    fn next_claim(&self) -> GroupFuture<'_, Claim> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(GroupError::Closed);
            }
            let step = lock(&self.steps).pop_front();
            match step {
                Some(Step::Claim(partitions)) => {
                    let generation = {
                        let mut generation = lock(&self.generation);
                        *generation += 1;
                        *generation
                    };
                    Ok(Claim {
                        generation,
                        partitions: partitions
                            .into_iter()
                            .map(|script| self.partition_claim(script))
                            .collect(),
                    })
                }
                Some(Step::Fail(error)) => Err(error),
                None if self.close_when_exhausted => Err(GroupError::Closed),
                None => {
                    let mut closed = self.closed.subscribe();
                    let _ = closed.wait_for(|closed| *closed).await;
                    Err(GroupError::Closed)
                }
            }
        })
    }

    fn commit(&self, record: &LogRecord) -> GroupFuture<'_, ()> {
        let result = if self.failing_commits {
            Err(GroupError::Commit(format!(
                "offset {} rejected",
                record.offset
            )))
        } else {
            lock(&self.commits).push(record.clone());
            Ok(())
        };
        Box::pin(std::future::ready(result))
    }

    fn close(&self) -> GroupFuture<'_, ()> {
        self.closed.send_replace(true);
        Box::pin(std::future::ready(Ok(())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
