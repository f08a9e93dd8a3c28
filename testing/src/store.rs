//! In-memory [`AggregateStore`] for fast, deterministic tests.

use readmodels_core::store::{
    AggregateStore, Attributes, Cursor, Index, IndexPosition, Key, Page, StoreError, StoreFuture, Table,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<&'static str, BTreeMap<String, Attributes>>,
    calls: Vec<String>,
    failures: HashMap<&'static str, VecDeque<StoreError>>,
}

impl Inner {
    /// Record the call and pop an injected failure for `op`, if any.
    fn enter(&mut self, op: &'static str, call: String) -> Result<(), StoreError> {
        self.calls.push(call);
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn table(&mut self, table: Table) -> &mut BTreeMap<String, Attributes> {
        self.tables.entry(table.name).or_default()
    }
}

/// `HashMap`-backed aggregate store that records every call.
///
/// Calls are recorded as short strings (`"get UserProfile {username=u1}"`,
/// `"increment_counter PostMetadata {postId=p1} likes 1"`) so tests can assert
/// the exact sequence a repository issued. Failures can be injected per
/// operation with [`InMemoryAggregateStore::fail_next`].
///
/// # Example
///
/// ```
/// use readmodels_core::store::{AggregateStore, Key, Table};
/// use readmodels_testing::InMemoryAggregateStore;
/// use serde_json::json;
///
/// const USERS: Table = Table::new("UserProfile", &["username"]);
///
/// # tokio_test::block_on(async {
/// let store = InMemoryAggregateStore::new();
/// let row = json!({"username": "u1", "followers": 0}).as_object().cloned().unwrap();
/// store.insert(USERS, row).await.unwrap();
///
/// let key = Key::single("username", "u1");
/// store.increment_counter(USERS, &key, "followers", 1).await.unwrap();
///
/// assert_eq!(store.get(USERS, &key).await.unwrap()["followers"], 1);
/// assert_eq!(store.call_count("increment_counter"), 1);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryAggregateStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryAggregateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    /// Forget recorded calls (seeded data is kept).
    pub fn clear_calls(&self) {
        self.write().calls.clear();
    }

    /// Number of recorded calls of one operation (`"query"`, `"insert"`, ...).
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .count()
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, op: &'static str, error: StoreError) {
        self.write().failures.entry(op).or_default().push_back(error);
    }

    /// Number of rows currently stored in `table`.
    #[must_use]
    pub fn len(&self, table: Table) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .get(table.name)
            .map_or(0, BTreeMap::len)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_now(&self, table: Table, key: &Key) -> Result<Attributes, StoreError> {
        let mut inner = self.write();
        inner.enter("get", format!("get {} {key}", table.name))?;
        table.validate_key(key)?;
        inner
            .table(table)
            .get(&table.canonical_key(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(table, key))
    }

    fn insert_now(&self, table: Table, row: Attributes) -> Result<(), StoreError> {
        let key = table.key_of(&row)?;
        let mut inner = self.write();
        inner.enter("insert", format!("insert {} {key}", table.name))?;
        inner.table(table).insert(table.canonical_key(&key), row);
        Ok(())
    }

    fn update_now(&self, table: Table, key: &Key, changes: Attributes) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.enter("update", format!("update {} {key}", table.name))?;
        table.validate_key(key)?;
        let row = inner
            .table(table)
            .get_mut(&table.canonical_key(key))
            .ok_or_else(|| StoreError::not_found(table, key))?;
        for (name, value) in changes {
            if !table.key.contains(&name.as_str()) {
                row.insert(name, value);
            }
        }
        Ok(())
    }

    fn remove_now(&self, table: Table, key: &Key) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.enter("remove", format!("remove {} {key}", table.name))?;
        table.validate_key(key)?;
        inner.table(table).remove(&table.canonical_key(key));
        Ok(())
    }

    fn remove_batch_now(&self, table: Table, keys: &[Key]) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.enter("remove_batch", format!("remove_batch {} {}", table.name, keys.len()))?;
        for key in keys {
            table.validate_key(key)?;
        }
        let rows = inner.table(table);
        for key in keys {
            rows.remove(&table.canonical_key(key));
        }
        Ok(())
    }

    fn increment_now(&self, table: Table, key: &Key, field: &str, delta: i64) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.enter(
            "increment_counter",
            format!("increment_counter {} {key} {field} {delta}", table.name),
        )?;
        table.validate_key(key)?;
        let row = inner
            .table(table)
            .get_mut(&table.canonical_key(key))
            .ok_or_else(|| StoreError::not_found(table, key))?;
        let current = row.get(field).and_then(Value::as_i64).unwrap_or(0);
        row.insert(field.to_string(), Value::from(current + delta));
        Ok(())
    }

    fn query_now(
        &self,
        table: Table,
        index: Index,
        partition_value: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<Attributes>, StoreError> {
        let mut inner = self.write();
        inner.enter(
            "query",
            format!("query {} {} {partition_value}", table.name, index.name),
        )?;
        let after = after.map(|cursor| cursor.position(table, index)).transpose()?;

        let mut matching = Vec::new();
        for row in inner.table(table).values() {
            if row.get(index.partition).and_then(Value::as_str) != Some(partition_value) {
                continue;
            }
            let position = IndexPosition::of(table, index, row)?;
            if after.as_ref().is_none_or(|after| position > *after) {
                matching.push((position, row.clone()));
            }
        }
        matching.sort_by(|a, b| a.0.cmp(&b.0));

        let rows = matching.into_iter().take(limit).map(|(_, row)| row).collect();
        Page::from_scan(table, index, rows, limit)
    }
}

impl AggregateStore for InMemoryAggregateStore {
    fn get(&self, table: Table, key: &Key) -> StoreFuture<'_, Attributes> {
        Box::pin(std::future::ready(self.get_now(table, key)))
    }

    fn insert(&self, table: Table, row: Attributes) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.insert_now(table, row)))
    }

    fn update(&self, table: Table, key: &Key, changes: Attributes) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.update_now(table, key, changes)))
    }

    fn remove(&self, table: Table, key: &Key) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.remove_now(table, key)))
    }

    fn remove_batch(&self, table: Table, keys: &[Key]) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.remove_batch_now(table, keys)))
    }

    fn increment_counter(&self, table: Table, key: &Key, field: &str, delta: i64) -> StoreFuture<'_, ()> {
        Box::pin(std::future::ready(self.increment_now(table, key, field, delta)))
    }

    fn query(
        &self,
        table: Table,
        index: Index,
        partition_value: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> StoreFuture<'_, Page<Attributes>> {
        Box::pin(std::future::ready(
            self.query_now(table, index, partition_value, after, limit),
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    const LIKES: Table = Table::new("readmodels.postLikes", &["postId", "username"]);
    const BY_POST: Index = Index::new("postId-username-index", "postId", "username");

    fn like(post: &str, user: &str) -> Attributes {
        json!({"postId": post, "username": user}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = InMemoryAggregateStore::new();
        for (post, user) in [("p1", "c"), ("p1", "a"), ("p2", "b"), ("p1", "b")] {
            store.insert(LIKES, like(post, user)).await.unwrap();
        }

        let first = store.query(LIKES, BY_POST, "p1", None, 2).await.unwrap();
        let users: Vec<_> = first.items.iter().map(|r| r["username"].clone()).collect();
        assert_eq!(users, vec![json!("a"), json!("b")]);

        let second = store
            .query(LIKES, BY_POST, "p1", first.next_cursor.as_ref(), 2)
            .await
            .unwrap();
        assert_eq!(second.items, vec![like("p1", "c")]);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn keys_containing_the_separator_stay_distinct() {
        let store = InMemoryAggregateStore::new();
        store.insert(LIKES, like("p#1", "x")).await.unwrap();
        store.insert(LIKES, like("p", "1#x")).await.unwrap();

        assert_eq!(store.len(LIKES), 2);
        let row = store.get(LIKES, &Key::pair("postId", "p#1", "username", "x")).await.unwrap();
        assert_eq!(row, like("p#1", "x"));
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryAggregateStore::new();
        store.fail_next("insert", StoreError::Backend("throttled".to_string()));

        assert!(store.insert(LIKES, like("p1", "a")).await.is_err());
        assert!(store.insert(LIKES, like("p1", "a")).await.is_ok());
        assert_eq!(store.len(LIKES), 1);
        assert_eq!(store.call_count("insert"), 2);
    }

    #[tokio::test]
    async fn counter_on_missing_row_is_not_found() {
        let store = InMemoryAggregateStore::new();
        let key = Key::pair("postId", "p1", "username", "a");

        let err = store.increment_counter(LIKES, &key, "n", 1).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(
            store.calls(),
            vec!["increment_counter readmodels.postLikes {postId=p1, username=a} n 1".to_string()]
        );
    }

    #[tokio::test]
    async fn update_keeps_key_attributes() {
        let store = InMemoryAggregateStore::new();
        store.insert(LIKES, like("p1", "a")).await.unwrap();
        let key = Key::pair("postId", "p1", "username", "a");

        let changes = json!({"username": "z", "name": "A"}).as_object().cloned().unwrap();
        store.update(LIKES, &key, changes).await.unwrap();

        let row = store.get(LIKES, &key).await.unwrap();
        assert_eq!(row["username"], "a");
        assert_eq!(row["name"], "A");
    }
}
