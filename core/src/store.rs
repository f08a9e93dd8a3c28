//! Aggregate store contract.
//!
//! # Overview
//!
//! The read side persists two kinds of rows:
//!
//! - **Aggregates**: authoritative denormalized rows with derived counters
//!   (user profiles, post metadata), queried directly by key.
//! - **Detail records**: child rows referencing an aggregate (one comment, one like).
//!
//! Every row is a flat attribute map ([`Attributes`]) living in a named [`Table`].
//! Keys are small ordered maps of one or two named string attributes ([`Key`]).
//! Range reads go through a secondary [`Index`] with a `(cursor, limit)` contract
//! returning a [`Page`] and the cursor of the next page.
//!
//! # Layers
//!
//! [`AggregateStore`] is the untyped, dyn-compatible backend contract operating on
//! attribute maps. [`AggregateStoreExt`] layers typed access on top for anything
//! implementing [`Record`], keeping the same attribute-map wire shape.
//!
//! # Consistency
//!
//! The store offers no multi-row transactions. The only concurrency-control
//! primitive is [`AggregateStore::increment_counter`], which backends must apply
//! atomically. [`AggregateStoreExt::insert_and_increment_counter`] and
//! [`AggregateStoreExt::remove_and_decrement_counter`] are two sequential calls,
//! detail first, counter second; a failure between them leaves the counter
//! diverged from the detail rows, and the error says which step failed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Flat attribute map: the wire shape of every stored row.
pub type Attributes = serde_json::Map<String, Value>;

/// Errors surfaced by aggregate store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No row exists for the key.
    ///
    /// Kept distinct from other failures so the read path can map it to a
    /// "not found" response.
    #[error("Record not found in {table}: {key}")]
    NotFound {
        /// Table that was searched
        table: String,
        /// Canonical form of the missing key
        key: String,
    },

    /// Backend failure (network, throttling, constraint violation).
    #[error("Storage error: {0}")]
    Backend(String),

    /// A row could not be converted to or from its typed form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A key was missing attributes or carried non-string values.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    /// Build a [`StoreError::NotFound`] for a table and key.
    #[must_use]
    pub fn not_found(table: Table, key: &Key) -> Self {
        Self::NotFound {
            table: table.name.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether this error signals a missing row.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by [`AggregateStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A named table and the attributes forming its primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    /// Table name as known to the backend.
    pub name: &'static str,
    /// Key attribute names, in canonical order.
    pub key: &'static [&'static str],
}

impl Table {
    /// Declare a table.
    #[must_use]
    pub const fn new(name: &'static str, key: &'static [&'static str]) -> Self {
        Self { name, key }
    }

    /// Extract this table's key from a full row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if a key attribute is absent or not a string.
    pub fn key_of(&self, attributes: &Attributes) -> Result<Key> {
        let mut key = Key::default();
        for name in self.key {
            let value = string_attribute(attributes, name).ok_or_else(|| {
                StoreError::InvalidKey(format!(
                    "{} row is missing string key attribute '{name}'",
                    self.name
                ))
            })?;
            key = key.with(*name, value);
        }
        Ok(key)
    }

    /// Check that `key` names exactly this table's key attributes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] on mismatch.
    pub fn validate_key(&self, key: &Key) -> Result<()> {
        let matches = key.0.len() == self.key.len()
            && self.key.iter().all(|name| key.0.contains_key(*name));
        if matches {
            Ok(())
        } else {
            Err(StoreError::InvalidKey(format!(
                "key {key} does not match {} key {:?}",
                self.name, self.key
            )))
        }
    }

    /// Canonical string form of a key for this table.
    ///
    /// Values are joined by `#`, with `\` and `#` inside a value escaped by a
    /// backslash, so distinct keys never share a canonical form.
    #[must_use]
    pub fn canonical_key(&self, key: &Key) -> String {
        self.key
            .iter()
            .map(|name| escape_key_value(key.get(name).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("#")
    }
}

fn escape_key_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '#') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A secondary index: rows sharing `partition` ordered by `sort` (ties broken by key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Index {
    /// Index name (informational; backends may map it to a physical index).
    pub name: &'static str,
    /// Attribute whose value selects the rows.
    pub partition: &'static str,
    /// String attribute defining the order within a partition.
    pub sort: &'static str,
}

impl Index {
    /// Declare an index.
    #[must_use]
    pub const fn new(name: &'static str, partition: &'static str, sort: &'static str) -> Self {
        Self {
            name,
            partition,
            sort,
        }
    }
}

/// Primary key: one or two named string attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(BTreeMap<String, String>);

impl Key {
    /// Key made of a single attribute.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().with(name, value)
    }

    /// Composite key made of two attributes.
    #[must_use]
    pub fn pair(
        first: impl Into<String>,
        first_value: impl Into<String>,
        second: impl Into<String>,
        second_value: impl Into<String>,
    ) -> Self {
        Self::default()
            .with(first, first_value)
            .with(second, second_value)
    }

    /// Add or replace an attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Value of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The key as an attribute map.
    #[must_use]
    pub fn to_attributes(&self) -> Attributes {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Error decoding a client-supplied cursor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid cursor: {0}")]
pub struct CursorError(String);

/// Opaque continuation token: the key and sort attributes of the last-seen row.
///
/// A cursor is only meaningful for the exact index and partition value it was
/// issued for. Its external form is URL-safe base64 of its JSON attribute map;
/// the empty string means "first page".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Key);

impl Cursor {
    /// Build the cursor positioned on `row`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the row lacks its key or sort attribute.
    pub fn from_row(table: Table, index: Index, row: &Attributes) -> Result<Self> {
        let sort = string_attribute(row, index.sort).ok_or_else(|| {
            StoreError::InvalidKey(format!(
                "{} row is missing sort attribute '{}' for index {}",
                table.name, index.sort, index.name
            ))
        })?;
        Ok(Self(table.key_of(row)?.with(index.sort, sort)))
    }

    /// Position of this cursor within `index`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the cursor was not issued for this index.
    pub fn position(&self, table: Table, index: Index) -> Result<IndexPosition> {
        let sort = self.0.get(index.sort).ok_or_else(|| {
            StoreError::InvalidKey(format!("cursor has no '{}' attribute", index.sort))
        })?;
        for name in table.key {
            if self.0.get(name).is_none() {
                return Err(StoreError::InvalidKey(format!(
                    "cursor has no '{name}' attribute"
                )));
            }
        }
        Ok(IndexPosition {
            sort: sort.to_string(),
            key: table.canonical_key(&self.0),
        })
    }

    /// Attribute value carried by the cursor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name)
    }

    /// External (URL-safe) form.
    #[must_use]
    pub fn encode(&self) -> String {
        // A map of strings always serializes.
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parse the external form. Empty input means "no cursor".
    ///
    /// # Errors
    ///
    /// Returns [`CursorError`] if the input is not a cursor produced by [`Cursor::encode`].
    pub fn decode(encoded: &str) -> std::result::Result<Option<Self>, CursorError> {
        if encoded.is_empty() {
            return Ok(None);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CursorError(e.to_string()))?;
        let key: Key = serde_json::from_slice(&bytes).map_err(|e| CursorError(e.to_string()))?;
        if key.0.is_empty() {
            return Err(CursorError("cursor carries no attributes".to_string()));
        }
        Ok(Some(Self(key)))
    }
}

impl From<Key> for Cursor {
    fn from(key: Key) -> Self {
        Self(key)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded)
            .map_err(de::Error::custom)?
            .ok_or_else(|| de::Error::custom("empty cursor"))
    }
}

/// Total order of rows within an index partition: sort value, then canonical key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexPosition {
    /// Value of the index sort attribute.
    pub sort: String,
    /// Canonical primary key (tie breaker).
    pub key: String,
}

impl IndexPosition {
    /// Position of a stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the row lacks key or sort attributes.
    pub fn of(table: Table, index: Index, row: &Attributes) -> Result<Self> {
        Cursor::from_row(table, index, row)?.position(table, index)
    }
}

/// One page of a range query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows in index order.
    pub items: Vec<T>,
    /// Cursor for the following page; `None` once the index is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// An empty, final page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Convert every item, keeping the cursor.
    ///
    /// # Errors
    ///
    /// Returns the first conversion error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> std::result::Result<U, E>) -> std::result::Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<std::result::Result<_, _>>()?,
            next_cursor: self.next_cursor,
        })
    }
}

impl Page<Attributes> {
    /// Finish an index scan: the next cursor points at the last row when the
    /// scan filled `limit`, otherwise the index is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the last row cannot form a cursor.
    pub fn from_scan(table: Table, index: Index, rows: Vec<Attributes>, limit: usize) -> Result<Self> {
        let next_cursor = match rows.last() {
            Some(last) if rows.len() >= limit => Some(Cursor::from_row(table, index, last)?),
            _ => None,
        };
        Ok(Self {
            items: rows,
            next_cursor,
        })
    }
}

/// Untyped storage backend for aggregates and detail records.
///
/// # Semantics
///
/// - `insert` writes a full row, replacing any existing row with the same key.
/// - `update` merges attributes into an existing row (`NotFound` if absent);
///   key attributes cannot be changed.
/// - `remove` / `remove_batch` succeed whether or not the rows exist.
/// - `increment_counter` atomically adds `delta` to a numeric attribute
///   (absent attributes count as zero); `NotFound` if the row is absent.
/// - `query` returns rows of `index` whose partition attribute equals
///   `partition_value`, strictly after `after`, in index order, at most `limit`.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn AggregateStore>` across repositories and request handlers.
pub trait AggregateStore: Send + Sync {
    /// Fetch a row by key.
    fn get(&self, table: Table, key: &Key) -> StoreFuture<'_, Attributes>;

    /// Write a full row.
    fn insert(&self, table: Table, row: Attributes) -> StoreFuture<'_, ()>;

    /// Merge attributes into an existing row.
    fn update(&self, table: Table, key: &Key, changes: Attributes) -> StoreFuture<'_, ()>;

    /// Delete a row.
    fn remove(&self, table: Table, key: &Key) -> StoreFuture<'_, ()>;

    /// Delete several rows of one table.
    fn remove_batch(&self, table: Table, keys: &[Key]) -> StoreFuture<'_, ()>;

    /// Atomically add `delta` to a counter attribute.
    fn increment_counter(
        &self,
        table: Table,
        key: &Key,
        field: &str,
        delta: i64,
    ) -> StoreFuture<'_, ()>;

    /// Range read through a secondary index.
    fn query(
        &self,
        table: Table,
        index: Index,
        partition_value: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> StoreFuture<'_, Page<Attributes>>;
}

/// A typed row stored in a fixed table.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Table holding rows of this type.
    const TABLE: Table;

    /// Primary key of this row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not serialize to a map carrying its key.
    fn key(&self) -> Result<Key> {
        Self::TABLE.key_of(&to_attributes(self)?)
    }
}

/// Serialize a value into a flat attribute map.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the value is not a JSON object.
pub fn to_attributes<T: Serialize + ?Sized>(value: &T) -> Result<Attributes> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Serialization(format!(
            "expected an attribute map, got {other}"
        ))),
        Err(e) => Err(StoreError::Serialization(e.to_string())),
    }
}

/// Deserialize a typed value from an attribute map.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the attributes do not match `T`.
pub fn from_attributes<T: DeserializeOwned>(attributes: Attributes) -> Result<T> {
    serde_json::from_value(Value::Object(attributes))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn string_attribute<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a str> {
    attributes.get(name).and_then(Value::as_str)
}

/// Typed operations over any [`AggregateStore`].
pub trait AggregateStoreExt: AggregateStore {
    /// Fetch and decode a row.
    fn get_record<R: Record>(&self, key: &Key) -> impl Future<Output = Result<R>> + Send {
        async move { from_attributes(self.get(R::TABLE, key).await?) }
    }

    /// Encode and write a row.
    fn insert_record<R: Record>(&self, record: &R) -> impl Future<Output = Result<()>> + Send {
        async move {
            let row = to_attributes(record)?;
            R::TABLE.key_of(&row)?;
            self.insert(R::TABLE, row).await
        }
    }

    /// Range read decoding each row.
    fn query_records<R: Record>(
        &self,
        index: Index,
        partition_value: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> impl Future<Output = Result<Page<R>>> + Send {
        async move {
            self.query(R::TABLE, index, partition_value, after, limit)
                .await?
                .try_map(from_attributes)
        }
    }

    /// Insert a detail row, then increment a counter on its aggregate.
    ///
    /// Two sequential calls with no atomicity: if the insert fails the counter
    /// is untouched; if the increment fails the detail row is already written.
    fn insert_and_increment_counter<R: Record>(
        &self,
        record: &R,
        aggregate: Table,
        aggregate_key: &Key,
        field: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.insert_record(record).await?;
            self.increment_counter(aggregate, aggregate_key, field, 1)
                .await
        }
    }

    /// Remove a detail row, then decrement a counter on its aggregate.
    ///
    /// Mirror of [`AggregateStoreExt::insert_and_increment_counter`].
    fn remove_and_decrement_counter(
        &self,
        detail: Table,
        detail_key: &Key,
        aggregate: Table,
        aggregate_key: &Key,
        field: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.remove(detail, detail_key).await?;
            self.increment_counter(aggregate, aggregate_key, field, -1)
                .await
        }
    }
}

impl<S: AggregateStore + ?Sized> AggregateStoreExt for S {}
