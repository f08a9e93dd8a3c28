//! Tests for the scripted consumer group client

#![allow(clippy::unwrap_used)] // Tests can unwrap

use futures::StreamExt;
use readmodels_redpanda::{GroupClient, GroupError};
use readmodels_testing::{ScriptedGroupClient, ScriptedPartition, fixtures};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn claims_replay_in_script_order() {
    let liked = fixtures::serialized("UserLikedPost", &json!({"username": "u1", "postId": "p1"}));
    let client = ScriptedGroupClient::new()
        .claim(vec![ScriptedPartition::new("events", 0).event(7, &liked)])
        .fail(GroupError::Client("broker down".to_string()))
        .close_when_exhausted();

    let claim = client.next_claim().await.unwrap();
    assert_eq!(claim.generation, 1);
    let mut partitions = claim.partitions;
    let mut records = partitions.remove(0).records;
    let record = records.next().await.unwrap().unwrap();
    assert_eq!(record.offset, 7);
    assert_eq!(record.event_type.as_deref(), Some("UserLikedPost"));
    assert!(records.next().await.is_none());

    assert_eq!(
        client.next_claim().await.unwrap_err(),
        GroupError::Client("broker down".to_string())
    );
    assert_eq!(client.next_claim().await.unwrap_err(), GroupError::Closed);
}

#[tokio::test]
async fn exhausted_script_waits_for_close() {
    let client = std::sync::Arc::new(ScriptedGroupClient::new());

    let waiting = tokio::spawn({
        let client = client.clone();
        async move { client.next_claim().await.map(|claim| claim.generation) }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiting.is_finished());

    client.close().await.unwrap();

    assert_eq!(waiting.await.unwrap(), Err(GroupError::Closed));
    assert!(client.is_closed());
}

#[tokio::test]
async fn held_partition_ends_on_close() {
    let client = ScriptedGroupClient::new().claim(vec![ScriptedPartition::new("events", 1).hold_open()]);
    let mut claim = client.next_claim().await.unwrap();
    let mut records = claim.partitions.remove(0).records;

    let pending = tokio::time::timeout(Duration::from_millis(20), records.next()).await;
    assert!(pending.is_err());

    client.close().await.unwrap();
    assert!(records.next().await.is_none());
}

#[tokio::test]
async fn commits_are_recorded_unless_rejected() {
    let event = fixtures::serialized("UserUnlikedPost", &json!({}));
    let record = readmodels_redpanda::LogRecord::from_event("events", 2, 5, &event);

    let client = ScriptedGroupClient::new();
    client.commit(&record).await.unwrap();
    assert_eq!(client.committed_offsets(), vec![(2, 5)]);

    let rejecting = ScriptedGroupClient::new().failing_commits();
    assert!(matches!(rejecting.commit(&record).await, Err(GroupError::Commit(_))));
    assert!(rejecting.commits().is_empty());
}
