//! `PostgreSQL` aggregate store.
//!
//! # Overview
//!
//! Every read-model table lives in one generic `readmodel_records` table,
//! each row holding its attribute map as JSONB:
//!
//! ```sql
//! CREATE TABLE readmodel_records (
//!     table_name TEXT NOT NULL,
//!     record_key TEXT NOT NULL,
//!     attributes JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (table_name, record_key)
//! );
//! ```
//!
//! `record_key` is the canonical key string (key attribute values joined by
//! `#`). Index queries filter on the partition attribute and order by the sort
//! attribute, then `record_key`, both under the `C` collation so the database
//! order matches the byte order used by cursors.
//!
//! Counter increments are single `UPDATE` statements, so concurrent writers on
//! the same aggregate never lose updates.
//!
//! # Example
//!
//! ```ignore
//! use readmodels_projections::postgres::PostgresAggregateStore;
//!
//! let store = PostgresAggregateStore::connect("postgres://localhost/readmodels", 10).await?;
//! store.migrate().await?;
//! ```

use readmodels_core::store::{Result, StoreFuture};
use readmodels_core::{AggregateStore, Attributes, Cursor, Index, Key, Page, StoreError, Table};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

/// PostgreSQL-backed [`AggregateStore`].
#[derive(Clone)]
pub struct PostgresAggregateStore {
    pool: PgPool,
}

impl PostgresAggregateStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a dedicated pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the records table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn into_attributes(table: Table, value: Value) -> Result<Attributes> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "{} row is not an attribute map: {other}",
            table.name
        ))),
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl AggregateStore for PostgresAggregateStore {
    fn get(&self, table: Table, key: &Key) -> StoreFuture<'_, Attributes> {
        let key = key.clone();
        Box::pin(async move {
            table.validate_key(&key)?;
            let row: Option<(Json<Value>,)> = sqlx::query_as(
                "SELECT attributes FROM readmodel_records
                 WHERE table_name = $1 AND record_key = $2",
            )
            .bind(table.name)
            .bind(table.canonical_key(&key))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to get: {e}")))?;

            match row {
                Some((Json(value),)) => into_attributes(table, value),
                None => Err(StoreError::not_found(table, &key)),
            }
        })
    }

    fn insert(&self, table: Table, row: Attributes) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let key = table.key_of(&row)?;
            sqlx::query(
                "INSERT INTO readmodel_records (table_name, record_key, attributes, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (table_name, record_key) DO UPDATE
                 SET attributes = EXCLUDED.attributes, updated_at = now()",
            )
            .bind(table.name)
            .bind(table.canonical_key(&key))
            .bind(Json(Value::Object(row)))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to insert: {e}")))?;
            Ok(())
        })
    }

    fn update(&self, table: Table, key: &Key, changes: Attributes) -> StoreFuture<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            table.validate_key(&key)?;
            if let Some(name) = table.key.iter().find(|name| changes.contains_key(**name)) {
                return Err(StoreError::InvalidKey(format!(
                    "cannot update key attribute '{name}' of {}",
                    table.name
                )));
            }

            let result = sqlx::query(
                "UPDATE readmodel_records
                 SET attributes = attributes || $3, updated_at = now()
                 WHERE table_name = $1 AND record_key = $2",
            )
            .bind(table.name)
            .bind(table.canonical_key(&key))
            .bind(Json(Value::Object(changes)))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to update: {e}")))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(table, &key));
            }
            Ok(())
        })
    }

    fn remove(&self, table: Table, key: &Key) -> StoreFuture<'_, ()> {
        let key = key.clone();
        Box::pin(async move {
            table.validate_key(&key)?;
            sqlx::query("DELETE FROM readmodel_records WHERE table_name = $1 AND record_key = $2")
                .bind(table.name)
                .bind(table.canonical_key(&key))
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to remove: {e}")))?;
            Ok(())
        })
    }

    fn remove_batch(&self, table: Table, keys: &[Key]) -> StoreFuture<'_, ()> {
        let keys = keys.to_vec();
        Box::pin(async move {
            let mut record_keys = Vec::with_capacity(keys.len());
            for key in &keys {
                table.validate_key(key)?;
                record_keys.push(table.canonical_key(key));
            }
            if record_keys.is_empty() {
                return Ok(());
            }

            sqlx::query(
                "DELETE FROM readmodel_records WHERE table_name = $1 AND record_key = ANY($2)",
            )
            .bind(table.name)
            .bind(&record_keys)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to remove batch: {e}")))?;
            Ok(())
        })
    }

    fn increment_counter(
        &self,
        table: Table,
        key: &Key,
        field: &str,
        delta: i64,
    ) -> StoreFuture<'_, ()> {
        let key = key.clone();
        let field = field.to_string();
        Box::pin(async move {
            table.validate_key(&key)?;
            let result = sqlx::query(
                "UPDATE readmodel_records
                 SET attributes = jsonb_set(
                         attributes,
                         ARRAY[$3::text],
                         to_jsonb(COALESCE((attributes->>$3)::bigint, 0) + $4)
                     ),
                     updated_at = now()
                 WHERE table_name = $1 AND record_key = $2",
            )
            .bind(table.name)
            .bind(table.canonical_key(&key))
            .bind(&field)
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to increment {field}: {e}")))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(table, &key));
            }
            Ok(())
        })
    }

    fn query(
        &self,
        table: Table,
        index: Index,
        partition_value: &str,
        after: Option<&Cursor>,
        limit: usize,
    ) -> StoreFuture<'_, Page<Attributes>> {
        let partition_value = partition_value.to_string();
        let after = after.cloned();
        Box::pin(async move {
            if limit == 0 {
                return Ok(Page::empty());
            }
            let position = after.map(|cursor| cursor.position(table, index)).transpose()?;
            let (after_sort, after_key) = position.map(|p| (p.sort, p.key)).unzip();

            let rows: Vec<(Json<Value>,)> = sqlx::query_as(
                r#"SELECT attributes FROM readmodel_records
                   WHERE table_name = $1
                     AND attributes->>$2 = $3
                     AND attributes ? $4
                     AND ($5::text IS NULL
                          OR (attributes->>$4 COLLATE "C", record_key COLLATE "C") > ($5, $6))
                   ORDER BY attributes->>$4 COLLATE "C", record_key COLLATE "C"
                   LIMIT $7"#,
            )
            .bind(table.name)
            .bind(index.partition)
            .bind(&partition_value)
            .bind(index.sort)
            .bind(after_sort)
            .bind(after_key)
            .bind(sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to query {}: {e}", index.name)))?;

            let rows = rows
                .into_iter()
                .map(|(Json(value),)| into_attributes(table, value))
                .collect::<Result<Vec<_>>>()?;
            Page::from_scan(table, index, rows, limit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_saturate() {
        assert_eq!(sql_limit(12), 12);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[test]
    fn non_object_rows_are_rejected() {
        let table = Table::new("UserProfile", &["username"]);
        assert!(matches!(
            into_attributes(table, Value::Bool(true)),
            Err(StoreError::Serialization(_))
        ));
    }
}
