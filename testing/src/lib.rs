//! Test doubles and fixtures for the read-model synchronizer.
//!
//! - [`InMemoryAggregateStore`]: aggregate store recording every call, with failure injection
//! - [`InMemoryCacheStore`]: TTL cache on the Tokio clock
//! - [`ScriptedGroupClient`]: replays scripted partition assignments to the consumer group manager
//! - [`fixtures`]: wire timestamps and serialized events
//! - [`properties`]: proptest strategies
//! - [`logs`]: capture log output for assertions
//!
//! ## Example
//!
//! ```
//! use readmodels_testing::{InMemoryAggregateStore, fixtures};
//!
//! let store = InMemoryAggregateStore::new();
//! assert!(store.calls().is_empty());
//! assert_eq!(fixtures::timestamp(0), "2025-01-01T00:00:00.000000000Z");
//! ```

pub mod cache;
pub mod fixtures;
pub mod group;
pub mod logs;
pub mod properties;
pub mod store;

pub use cache::InMemoryCacheStore;
pub use group::{ScriptedGroupClient, ScriptedPartition};
pub use logs::{CapturedLogs, capture_logs};
pub use store::InMemoryAggregateStore;
