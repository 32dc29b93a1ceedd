//! Sharded multi-tenant object store: per-type table triple (runtime,
//! history, lock), CRUD with append-only history, content-hash-guarded
//! safe update, and pessimistic advisory locks. One runtime table triple
//! per registered Rust type, fanned out across shards by
//! [`ward_shard::Router`].

use std::sync::Arc;

use futures::TryStreamExt;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tokio::sync::OnceCell;
use ward_types::{Key, Metadata};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error(transparent)]
    Query(#[from] ward_query::QueryError),
    #[error(transparent)]
    Shard(#[from] ward_shard::ShardError),
    #[error("row does not exist")]
    NotFound,
    #[error("content hash of current row does not match the caller's `from` image")]
    Conflict,
    #[error("row is locked by another writer (SELECT ... FOR UPDATE NOWAIT)")]
    Busy,
    #[error("`from.id` ({from}) and `to.id` ({to}) must be equal")]
    KeyMismatch { from: String, to: String },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A registered post-select hook. Invoked after every deserialization,
/// including streamed `process` items. Must not perform I/O on the
/// store — there is no recursion guard.
pub type ComputeFn<T, Ctx> = Arc<dyn Fn(&Ctx, &Metadata, &mut T) + Send + Sync>;

/// An outstanding advisory lock on one object's key, held until [`ObjectStore::unlock`]
/// is called against it. Dropping a handle without unlocking leaks the lock
/// row; callers are expected to unlock in a `finally`-shaped path.
pub struct LockHandle {
    table: String,
    shard_index: usize,
    id: String,
}

/// A sharded, transactional, history-tracked store for one Rust type `T`.
///
/// `Ctx` is whatever request-scoped carrier the caller threads through
/// (claims, workflow id, clock override); the store does not interpret it
/// beyond handing it to the compute hook.
pub struct ObjectStore<T, Ctx = ()> {
    type_name: &'static str,
    router: ward_shard::Router<sqlx::PgPool>,
    compute: Option<ComputeFn<T, Ctx>>,
    schema_ready: Arc<Vec<OnceCell<()>>>,
}

impl<T, Ctx> Clone for ObjectStore<T, Ctx> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name,
            router: self.router.clone(),
            compute: self.compute.clone(),
            schema_ready: self.schema_ready.clone(),
        }
    }
}

struct Decoded<T> {
    object: T,
    metadata: Metadata,
}

impl<T, Ctx> ObjectStore<T, Ctx>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    Ctx: Send + Sync,
{
    /// `type_name` must already be in lower-snake form; it is used verbatim
    /// as the runtime table name, with `_history`/`_lock` suffixes for the
    /// other two members of the table triple.
    pub fn new(type_name: &'static str, router: ward_shard::Router<sqlx::PgPool>) -> Self {
        let shard_count = router.len();
        Self {
            type_name,
            router,
            compute: None,
            schema_ready: Arc::new((0..shard_count).map(|_| OnceCell::new()).collect()),
        }
    }

    pub fn with_compute(mut self, compute: ComputeFn<T, Ctx>) -> Self {
        self.compute = Some(compute);
        self
    }

    fn table(&self) -> String {
        self.type_name.to_string()
    }

    fn history_table(&self) -> String {
        format!("{}_history", self.type_name)
    }

    fn lock_table(&self) -> String {
        format!("{}_lock", self.type_name)
    }

    async fn ensure_schema(&self, shard_index: usize) -> Result<(), StoreError> {
        self.schema_ready[shard_index]
            .get_or_try_init(|| async {
                let pool = &self.router.all()[shard_index];
                let table = self.table();
                let history = self.history_table();
                let lock = self.lock_table();

                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id text PRIMARY KEY,
                        created_at timestamptz NOT NULL,
                        created_by text NOT NULL,
                        updated_at timestamptz NOT NULL,
                        updated_by text NOT NULL,
                        object jsonb NOT NULL,
                        text_search tsvector
                    )"
                ))
                .execute(pool)
                .await?;

                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {history} (
                        id text NOT NULL,
                        created_at timestamptz NOT NULL,
                        created_by text NOT NULL,
                        updated_at timestamptz NOT NULL,
                        updated_by text NOT NULL,
                        object jsonb
                    )"
                ))
                .execute(pool)
                .await?;

                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {lock} (
                        id text PRIMARY KEY,
                        created_at timestamptz NOT NULL,
                        description text NOT NULL
                    )"
                ))
                .execute(pool)
                .await?;

                Ok::<_, StoreError>(())
            })
            .await?;
        Ok(())
    }

    fn shard_for(&self, shard_key: &str) -> (usize, &sqlx::PgPool) {
        let index = self.router.index(shard_key.as_bytes());
        (index, self.router.handle(shard_key.as_bytes()))
    }

    fn hash_of(object: &T) -> Result<[u8; 32], StoreError> {
        let canonical = serde_json::to_vec(object)?;
        Ok(Sha256::digest(canonical).into())
    }

    fn deserialize_row(&self, ctx: &Ctx, row: &sqlx::postgres::PgRow) -> Result<Decoded<T>, StoreError> {
        let object_json: serde_json::Value = row.try_get("object")?;
        let mut object: T = serde_json::from_value(object_json)?;
        let metadata = Metadata {
            created_at: row.try_get("created_at")?,
            created_by: row.try_get("created_by")?,
            updated_at: row.try_get("updated_at")?,
            updated_by: row.try_get("updated_by")?,
        };
        if let Some(compute) = &self.compute {
            compute(ctx, &metadata, &mut object);
        }
        Ok(Decoded { object, metadata })
    }

    #[tracing::instrument(skip(self, ctx, object), fields(type_name = self.type_name))]
    pub async fn insert(&self, ctx: &Ctx, actor: &str, key: &Key, object: &T) -> Result<(), StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let now = chrono::Utc::now();
        let payload = serde_json::to_value(object)?;
        let table = self.table();
        let history = self.history_table();

        let mut txn = pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $2, $3, $4)"
        ))
        .bind(&key.id)
        .bind(now)
        .bind(actor)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $2, $3, $4)"
        ))
        .bind(&key.id)
        .bind(now)
        .bind(actor)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, object), fields(type_name = self.type_name))]
    pub async fn upsert(&self, ctx: &Ctx, actor: &str, key: &Key, object: &T) -> Result<(), StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let now = chrono::Utc::now();
        let payload = serde_json::to_value(object)?;
        let table = self.table();
        let history = self.history_table();

        let mut txn = pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO {table} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET updated_at = $2, updated_by = $3, object = $4
             RETURNING created_at, created_by, updated_at, updated_by"
        ))
        .bind(&key.id)
        .bind(now)
        .bind(actor)
        .bind(&payload)
        .fetch_one(&mut *txn)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&key.id)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("created_at")?)
        .bind(row.try_get::<String, _>("created_by")?)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("updated_at")?)
        .bind(row.try_get::<String, _>("updated_by")?)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, object, metadata), fields(type_name = self.type_name))]
    pub async fn upsert_with_metadata(
        &self,
        ctx: &Ctx,
        key: &Key,
        object: &T,
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let payload = serde_json::to_value(object)?;
        let table = self.table();
        let history = self.history_table();

        let mut txn = pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                created_at = $2, created_by = $3, updated_at = $4, updated_by = $5, object = $6"
        ))
        .bind(&key.id)
        .bind(metadata.created_at)
        .bind(&metadata.created_by)
        .bind(metadata.updated_at)
        .bind(&metadata.updated_by)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&key.id)
        .bind(metadata.created_at)
        .bind(&metadata.created_by)
        .bind(metadata.updated_at)
        .bind(&metadata.updated_by)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx, object), fields(type_name = self.type_name))]
    pub async fn update(&self, ctx: &Ctx, actor: &str, key: &Key, object: &T) -> Result<(), StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let now = chrono::Utc::now();
        let payload = serde_json::to_value(object)?;
        let table = self.table();
        let history = self.history_table();

        let mut txn = pool.begin().await?;
        let updated = sqlx::query(&format!(
            "UPDATE {table} SET updated_at = $2, updated_by = $3, object = $4
             WHERE id = $1
             RETURNING created_at, created_by, updated_at, updated_by"
        ))
        .bind(&key.id)
        .bind(now)
        .bind(actor)
        .bind(&payload)
        .fetch_optional(&mut *txn)
        .await?;

        let Some(row) = updated else {
            return Err(StoreError::NotFound);
        };

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&key.id)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("created_at")?)
        .bind(row.try_get::<String, _>("created_by")?)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("updated_at")?)
        .bind(row.try_get::<String, _>("updated_by")?)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Content-hash-guarded compare-and-swap. An unchanged `from` image
    /// succeeds idempotently (hash of current == hash of `from` == hash
    /// of `to` is a degenerate but valid case). `from_key.id` and
    /// `to_key.id` must be equal.
    #[tracing::instrument(skip(self, ctx, from, to), fields(type_name = self.type_name))]
    pub async fn safe_update(
        &self,
        ctx: &Ctx,
        actor: &str,
        from_key: &Key,
        to_key: &Key,
        from: &T,
        to: &T,
    ) -> Result<(), StoreError> {
        Self::check_same_key(&from_key.id, &to_key.id)?;
        let key = from_key;
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let now = chrono::Utc::now();
        let table = self.table();
        let history = self.history_table();
        let from_hash = Self::hash_of(from)?;

        let mut txn = pool.begin().await?;
        let current = sqlx::query(&format!("SELECT object FROM {table} WHERE id = $1 FOR UPDATE NOWAIT"))
            .bind(&key.id)
            .fetch_optional(&mut *txn)
            .await;

        let current = match current {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("55P03") => {
                return Err(StoreError::Busy);
            }
            Err(other) => return Err(other.into()),
        };

        let Some(current) = current else {
            return Err(StoreError::NotFound);
        };

        let current_object: serde_json::Value = current.try_get("object")?;
        let current_hash: [u8; 32] = Sha256::digest(serde_json::to_vec(&current_object)?).into();
        if current_hash != from_hash {
            return Err(StoreError::Conflict);
        }

        let payload = serde_json::to_value(to)?;
        let row = sqlx::query(&format!(
            "UPDATE {table} SET updated_at = $2, updated_by = $3, object = $4
             WHERE id = $1
             RETURNING created_at, created_by, updated_at, updated_by"
        ))
        .bind(&key.id)
        .bind(now)
        .bind(actor)
        .bind(&payload)
        .fetch_one(&mut *txn)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&key.id)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("created_at")?)
        .bind(row.try_get::<String, _>("created_by")?)
        .bind(row.try_get::<chrono::DateTime<chrono::Utc>, _>("updated_at")?)
        .bind(row.try_get::<String, _>("updated_by")?)
        .bind(&payload)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// `from.id`/`to.id` equality is the caller's contract; check it once
    /// up front so a mismatched pair never reaches the database.
    pub fn check_same_key(from_id: &str, to_id: &str) -> Result<(), StoreError> {
        if from_id != to_id {
            return Err(StoreError::KeyMismatch {
                from: from_id.to_string(),
                to: to_id.to_string(),
            });
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(type_name = self.type_name))]
    pub async fn delete(&self, ctx: &Ctx, actor: &str, key: &Key) -> Result<(), StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        self.delete_on_shard(pool, &key.id, actor).await
    }

    /// Deletes `id` on every shard when the caller doesn't know which
    /// shard holds it. Each shard's delete runs in its own transaction;
    /// every shard is attempted even after an earlier one fails, and on
    /// partial failure the last encountered error is returned (there is
    /// no way to roll a committed shard back once a later shard's commit
    /// fails, so this is best-effort, not atomic across shards).
    #[tracing::instrument(skip(self, ctx), fields(type_name = self.type_name))]
    pub async fn delete_by_id_across_shards(&self, ctx: &Ctx, actor: &str, id: &str) -> Result<(), StoreError> {
        let _ = ctx;
        let mut last_error = None;

        for shard_index in 0..self.router.len() {
            self.ensure_schema(shard_index).await?;
            let pool = &self.router.all()[shard_index];
            if let Err(err) = self.delete_on_shard(pool, id, actor).await {
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_on_shard(&self, pool: &sqlx::PgPool, id: &str, actor: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        let table = self.table();
        let history = self.history_table();

        let mut txn = pool.begin().await?;
        let deleted = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1 RETURNING created_at, created_by"))
            .bind(id)
            .fetch_optional(&mut *txn)
            .await?;

        let Some(deleted) = deleted else {
            // Absent id: no error, nothing to append to history.
            txn.commit().await?;
            return Ok(());
        };

        sqlx::query(&format!(
            "INSERT INTO {history} (id, created_at, created_by, updated_at, updated_by, object)
             VALUES ($1, $2, $3, $4, $5, NULL)"
        ))
        .bind(id)
        .bind(deleted.try_get::<chrono::DateTime<chrono::Utc>, _>("created_at")?)
        .bind(deleted.try_get::<String, _>("created_by")?)
        .bind(now)
        .bind(actor)
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(type_name = self.type_name))]
    pub async fn select_by_id(&self, ctx: &Ctx, key: &Key) -> Result<Option<(T, Metadata)>, StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let table = self.table();

        let row = sqlx::query(&format!("SELECT * FROM {table} WHERE id = $1"))
            .bind(&key.id)
            .fetch_optional(pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let decoded = self.deserialize_row(ctx, &row)?;
                Ok(Some((decoded.object, decoded.metadata)))
            }
        }
    }

    /// Fans the predicate out across every shard. Per-shard
    /// `LimitPerShard`/`Offset` apply independently; a merged top-n is
    /// the caller's responsibility.
    #[tracing::instrument(skip(self, ctx, predicate), fields(type_name = self.type_name))]
    pub async fn select<S>(&self, ctx: &Ctx, predicate: &ward_query::Where<S>) -> Result<Vec<(String, T, Metadata)>, StoreError> {
        let (sql, params) = predicate.statement()?;
        let table = self.table();
        let mut results = Vec::new();

        for shard_index in 0..self.router.len() {
            self.ensure_schema(shard_index).await?;
            let pool = &self.router.all()[shard_index];
            let query_sql = if sql.is_empty() {
                format!("SELECT * FROM {table}")
            } else {
                format!("SELECT * FROM {table} WHERE {sql}")
            };
            let mut query = sqlx::query(&query_sql);
            for value in &params {
                query = bind_param(query, value);
            }
            let rows = query.fetch_all(pool).await?;
            for row in rows {
                let id: String = row.try_get("id")?;
                let decoded = self.deserialize_row(ctx, &row)?;
                results.push((id, decoded.object, decoded.metadata));
            }
        }

        Ok(results)
    }

    /// Streams each matching row through `f` without materialising the
    /// full result set; any `f` error aborts the scan.
    #[tracing::instrument(skip(self, ctx, predicate, f), fields(type_name = self.type_name))]
    pub async fn process<S, F>(&self, ctx: &Ctx, predicate: &ward_query::Where<S>, mut f: F) -> Result<(), StoreError>
    where
        F: FnMut(String, T, Metadata) -> Result<(), StoreError>,
    {
        let (sql, params) = predicate.statement()?;
        let table = self.table();

        for shard_index in 0..self.router.len() {
            self.ensure_schema(shard_index).await?;
            let pool = &self.router.all()[shard_index];
            let query_sql = if sql.is_empty() {
                format!("SELECT * FROM {table}")
            } else {
                format!("SELECT * FROM {table} WHERE {sql}")
            };
            let mut query = sqlx::query(&query_sql);
            for value in &params {
                query = bind_param(query, value);
            }
            let mut stream = query.fetch(pool);
            while let Some(row) = stream.try_next().await? {
                let id: String = row.try_get("id")?;
                let decoded = self.deserialize_row(ctx, &row)?;
                f(id, decoded.object, decoded.metadata)?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(type_name = self.type_name))]
    pub async fn lock(&self, ctx: &Ctx, key: &Key, description: &str) -> Result<Option<LockHandle>, StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let _ = ctx;
        let lock = self.lock_table();

        let result = sqlx::query(&format!(
            "INSERT INTO {lock} (id, created_at, description) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING"
        ))
        .bind(&key.id)
        .bind(chrono::Utc::now())
        .bind(description)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Some(LockHandle {
                table: lock,
                shard_index,
                id: key.id.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    #[tracing::instrument(skip(self, ctx, handle), fields(type_name = self.type_name))]
    pub async fn unlock(&self, ctx: &Ctx, handle: LockHandle) -> Result<(), StoreError> {
        let _ = ctx;
        let pool = &self.router.all()[handle.shard_index];
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", handle.table))
            .bind(&handle.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Combined `lock` then `select_by_id`: `None` on lock contention,
    /// otherwise the lock handle and whatever `select_by_id` would have
    /// returned.
    pub async fn select_by_id_and_lock(
        &self,
        ctx: &Ctx,
        key: &Key,
        description: &str,
    ) -> Result<Option<(Option<(T, Metadata)>, LockHandle)>, StoreError> {
        let Some(handle) = self.lock(ctx, key, description).await? else {
            return Ok(None);
        };
        let found = self.select_by_id(ctx, key).await?;
        Ok(Some((found, handle)))
    }

    pub async fn metadata(&self, key: &Key) -> Result<Option<Metadata>, StoreError> {
        let (shard_index, pool) = self.shard_for(&key.shard_key);
        self.ensure_schema(shard_index).await?;
        let table = self.table();

        let row = sqlx::query(&format!(
            "SELECT created_at, created_by, updated_at, updated_by FROM {table} WHERE id = $1"
        ))
        .bind(&key.id)
        .fetch_optional(pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(Metadata {
                created_at: row.try_get("created_at")?,
                created_by: row.try_get("created_by")?,
                updated_at: row.try_get("updated_at")?,
                updated_by: row.try_get("updated_by")?,
            })),
        }
    }
}

/// Binds a `Where`-emitted JSON scalar as its closest native Postgres type
/// so comparisons against plain metadata columns (`created_by`, ...) don't
/// round-trip through `jsonb`. Composite values fall back to `jsonb`.
fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    value: &'q serde_json::Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match value {
        serde_json::Value::String(s) => query.bind(s.as_str()),
        serde_json::Value::Bool(b) => query.bind(*b),
        serde_json::Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
        serde_json::Value::Number(n) => query.bind(n.as_f64()),
        serde_json::Value::Null => query.bind(Option::<String>::None),
        other => query.bind(sqlx::types::Json(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[test]
    fn content_hash_is_stable_for_equal_objects() {
        let a = Widget { name: "x".into(), count: 1 };
        let b = Widget { name: "x".into(), count: 1 };
        assert_eq!(ObjectStore::<Widget>::hash_of(&a).unwrap(), ObjectStore::<Widget>::hash_of(&b).unwrap());
    }

    #[test]
    fn content_hash_differs_for_different_objects() {
        let a = Widget { name: "x".into(), count: 1 };
        let b = Widget { name: "x".into(), count: 2 };
        assert_ne!(ObjectStore::<Widget>::hash_of(&a).unwrap(), ObjectStore::<Widget>::hash_of(&b).unwrap());
    }

    #[test]
    fn same_key_check_accepts_matching_ids_and_rejects_mismatch() {
        assert!(ObjectStore::<Widget>::check_same_key("a", "a").is_ok());
        match ObjectStore::<Widget>::check_same_key("a", "b") {
            Err(StoreError::KeyMismatch { from, to }) => {
                assert_eq!(from, "a");
                assert_eq!(to, "b");
            }
            _ => panic!("expected KeyMismatch"),
        }
    }

    #[test]
    fn table_names_derive_from_type_name() {
        // `connect_lazy` builds a pool without establishing a connection, so this
        // exercises the real constructor without requiring a running database.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ward_test")
            .unwrap();
        let router = ward_shard::Router::new(vec![pool]).unwrap();
        let store: ObjectStore<Widget> = ObjectStore::new("widget", router);
        assert_eq!(store.table(), "widget");
        assert_eq!(store.history_table(), "widget_history");
        assert_eq!(store.lock_table(), "widget_lock");
    }

    #[tokio::test]
    async fn safe_update_rejects_mismatched_from_and_to_keys_before_touching_the_database() {
        // `connect_lazy` never opens a connection, so a `KeyMismatch` returned
        // here proves the check ran before any database access was attempted.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ward_test")
            .unwrap();
        let router = ward_shard::Router::new(vec![pool]).unwrap();
        let store: ObjectStore<Widget> = ObjectStore::new("widget", router);
        let from_key = Key::self_sharded("a");
        let to_key = Key::self_sharded("b");
        let from = Widget { name: "x".into(), count: 1 };
        let to = Widget { name: "x".into(), count: 2 };

        let result = store.safe_update(&(), "caller", &from_key, &to_key, &from, &to).await;
        assert!(matches!(result, Err(StoreError::KeyMismatch { .. })));
    }
}
