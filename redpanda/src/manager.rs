//! Consumer group manager.
//!
//! # Overview
//!
//! [`ConsumerGroupManager::start`] runs the outer claim loop:
//!
//! 1. Wait for the next [`Claim`] from the [`GroupClient`].
//! 2. Arm the ready gate for that assignment cycle.
//! 3. Drain every claimed partition on its own task, handing records one at a
//!    time to the [`EventRouter`] and committing each record after dispatch.
//! 4. When every partition stream has ended (revocation), go back to 1.
//!
//! # Failure model
//!
//! - A [`GroupError::Closed`] from the client ends the loop with `Ok(())`.
//! - Any other client or stream error is fatal: the claim is abandoned, the
//!   group is closed and the error is returned. Clients absorb transient fetch
//!   errors themselves (see [`crate::kafka`]), so whatever reaches this layer is
//!   one they could not recover from.
//! - Handler failures never reach this layer; the router reports them.
//!
//! # Shutdown
//!
//! When the shutdown signal flips to `true` the manager stops claiming, lets
//! each partition worker finish the record it is dispatching, then closes the
//! group.

use crate::group::{Claim, GroupClient, GroupError, GroupSignal, GroupState, PartitionClaim, ReadyGate};
use futures::StreamExt;
use readmodels_core::EventRouter;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Drives one consumer group membership.
pub struct ConsumerGroupManager {
    client: Arc<dyn GroupClient>,
    router: Arc<EventRouter>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<GroupState>,
    cycles: watch::Sender<u64>,
}

impl ConsumerGroupManager {
    /// Create a manager. Nothing happens until [`Self::start`].
    #[must_use]
    pub fn new(
        client: Arc<dyn GroupClient>,
        router: Arc<EventRouter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state, _) = watch::channel(GroupState::Joining);
        let (cycles, _) = watch::channel(0);
        Self {
            client,
            router,
            shutdown,
            state,
            cycles,
        }
    }

    /// Observe lifecycle state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<GroupState> {
        self.state.subscribe()
    }

    /// Gate resolving on each new assignment.
    #[must_use]
    pub fn ready(&self) -> ReadyGate {
        ReadyGate::new(self.cycles.subscribe())
    }

    /// Run the claim loop until shutdown, close, or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`GroupError`] (anything other than `Closed`).
    pub async fn start(&self) -> Result<(), GroupError> {
        let mut shutdown = self.shutdown.clone();
        tracing::info!(event_types = ?self.router.event_types(), "Joining consumer group");

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let claim = tokio::select! {
                claim = self.client.next_claim() => claim,
                () = shutdown_requested(&mut shutdown) => break Ok(()),
            };

            let claim = match claim {
                Ok(claim) => claim,
                Err(GroupError::Closed) => {
                    tracing::info!("Consumer group closed");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Consumer group failed, stopping consumption");
                    break Err(e);
                }
            };

            if let Err(e) = self.run_claim(claim).await {
                tracing::error!(error = %e, "Claim failed, stopping consumption");
                break Err(e);
            }
        };

        if let Err(e) = self.client.close().await {
            tracing::warn!(error = %e, "Failed to leave consumer group cleanly");
        }
        self.transition(GroupSignal::Closed)?;
        outcome
    }

    async fn run_claim(&self, claim: Claim) -> Result<(), GroupError> {
        self.transition(GroupSignal::Assigned)?;
        let cycle = *self.cycles.borrow() + 1;
        self.cycles.send_replace(cycle);
        tracing::info!(
            generation = claim.generation,
            cycle,
            partitions = ?claim.partitions,
            "Partitions assigned"
        );
        metrics::counter!("readmodels_group_rebalances_total").increment(1);

        self.transition(GroupSignal::ClaimStarted)?;

        let mut workers = JoinSet::new();
        for partition in claim.partitions {
            workers.spawn(drain_partition(
                partition,
                Arc::clone(&self.client),
                Arc::clone(&self.router),
                self.shutdown.clone(),
            ));
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(|e| GroupError::Worker(e.to_string())).and_then(|r| r);
            if let Err(e) = result {
                if failure.is_none() {
                    workers.abort_all();
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.transition(GroupSignal::ClaimEnded)?;
        tracing::info!(generation = claim.generation, "Claim ended");
        Ok(())
    }

    fn transition(&self, signal: GroupSignal) -> Result<(), GroupError> {
        let from = *self.state.borrow();
        let to = from.on(signal)?;
        self.state.send_replace(to);
        tracing::debug!(?from, ?to, ?signal, "Consumer group state changed");
        Ok(())
    }
}

impl std::fmt::Debug for ConsumerGroupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerGroupManager")
            .field("state", &*self.state.borrow())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Resolves once shutdown is requested. A dropped sender never requests it.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn drain_partition(
    claim: PartitionClaim,
    client: Arc<dyn GroupClient>,
    router: Arc<EventRouter>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), GroupError> {
    let PartitionClaim {
        topic,
        partition,
        mut records,
    } = claim;
    tracing::debug!(topic = %topic, partition, "Partition worker started");
    let mut delivered: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown_requested(&mut shutdown) => break,
            next = records.next() => next,
        };
        let Some(record) = next else {
            break;
        };
        let record = record?;

        match record.event_type.as_deref() {
            Some(event_type) => {
                router.dispatch(event_type, &record.payload).await;
            }
            None => tracing::warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Record carries no event type, skipping"
            ),
        }

        if let Err(e) = client.commit(&record).await {
            tracing::warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Failed to commit offset (record may be redelivered)"
            );
        }
        delivered += 1;
    }

    tracing::debug!(topic = %topic, partition, delivered, "Partition worker stopped");
    Ok(())
}
