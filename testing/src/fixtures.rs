//! Deterministic timestamps and event payloads.

use chrono::{DateTime, TimeDelta, Utc};
use readmodels_core::SerializedEvent;

/// Wire layout of every event and record timestamp.
pub const TIMESTAMP_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// 2025-01-01 00:00:00 UTC, the origin of [`timestamp`].
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

/// [`base_time`] plus `offset_secs`, as a wire timestamp.
///
/// Larger offsets sort later, lexically and chronologically.
#[must_use]
pub fn timestamp(offset_secs: i64) -> String {
    (base_time() + TimeDelta::seconds(offset_secs))
        .format(TIMESTAMP_LAYOUT)
        .to_string()
}

/// Serialized event from a JSON payload.
#[must_use]
pub fn serialized(event_type: &str, payload: &serde_json::Value) -> SerializedEvent {
    SerializedEvent::new(event_type.to_string(), payload.to_string().into_bytes())
}
