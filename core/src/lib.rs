//! # Readmodels Core
//!
//! Contracts shared by every part of the read-model synchronizer.
//!
//! The synchronizer consumes domain events from a partitioned log, projects them
//! into denormalized aggregates, and serves paginated reads of those aggregates
//! through a cache-aside layer.
//!
//! ```text
//! log record ─► consumer group ─► EventRouter ─► EventHandler ─► repository ─► AggregateStore
//!                                                                   │
//! read request ───────────────────────────────────────────────────► repository ─► CacheStore
//! ```
//!
//! ## Modules
//!
//! - [`event`]: typed events and the JSON wire envelope
//! - [`router`]: the immutable event-type → handler table and [`router::DropReason`]
//! - [`event_bus`]: in-process publish/subscribe delivery feeding the same router
//! - [`store`]: aggregate store contract, keys, cursors and pages
//! - [`cache`]: key-value cache contract with TTL

pub mod cache;
pub mod event;
pub mod event_bus;
pub mod router;
pub mod store;

pub use cache::{CacheError, CacheStore};
pub use event::{Event, SerializedEvent};
pub use event_bus::InProcessEventBus;
pub use router::{Dispatch, DropReason, EventHandler, EventRouter};
pub use store::{
    AggregateStore, AggregateStoreExt, Attributes, Cursor, Index, Key, Page, Record, StoreError,
    Table,
};
