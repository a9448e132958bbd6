//! Query and resource persistence.
//!
//! The gateway keeps one row per submitted query (aggregates included) and one
//! row per configured resource. Times are stored as epoch milliseconds.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{QueryRecord, Resource, ResourceCapabilities, Status};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Storage backing the query lifecycle.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Looks up a configured resource.
    async fn get_resource(&self, id: &str) -> AppResult<Option<Resource>>;

    /// Lists all configured resources ordered by id.
    async fn list_resources(&self) -> AppResult<Vec<Resource>>;

    /// Inserts or replaces a resource definition.
    async fn upsert_resource(&self, resource: &Resource) -> AppResult<()>;

    /// Persists a new query record.
    async fn insert_query(&self, record: &QueryRecord) -> AppResult<()>;

    /// Looks up a query record.
    async fn get_query(&self, id: &str) -> AppResult<Option<QueryRecord>>;

    /// Overwrites status and ready time of an existing record.
    async fn update_status(&self, record: &QueryRecord) -> AppResult<()>;
}

/// Row from the `resources` table.
#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: String,
    name: String,
    description: Option<String>,
    base_url: Option<String>,
    supports_search: bool,
    supports_async: bool,
    supports_sync: bool,
}

impl ResourceRow {
    fn into_resource(self) -> Resource {
        Resource {
            id: self.id,
            name: self.name,
            description: self.description,
            base_url: self.base_url,
            capabilities: ResourceCapabilities {
                search: self.supports_search,
                async_query: self.supports_async,
                sync_query: self.supports_sync,
            },
        }
    }
}

/// Row from the `queries` table.
#[derive(sqlx::FromRow)]
struct QueryRow {
    id: String,
    resource_id: Option<String>,
    resource_result_id: Option<String>,
    status: String,
    start_time: i64,
    ready_time: Option<i64>,
    original_query: Option<String>,
    metadata: Option<String>,
}

impl QueryRow {
    fn into_record(self) -> AppResult<QueryRecord> {
        let sub_query_ids = match self.metadata.as_deref() {
            Some(text) if !text.is_empty() => serde_json::from_str::<Vec<String>>(text).map_err(|e| {
                AppError::Application(format!("Corrupt metadata on query {}: {}", self.id, e))
            })?,
            _ => Vec::new(),
        };

        Ok(QueryRecord {
            id: self.id,
            resource_id: self.resource_id,
            resource_result_id: self.resource_result_id,
            status: Status::parse(&self.status),
            start_time: from_millis(self.start_time),
            ready_time: self.ready_time.map(from_millis),
            original_query: self.original_query,
            sub_query_ids,
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// SQLite-backed [`QueryStore`].
#[derive(Clone)]
pub struct SqlQueryStore {
    pool: SqlitePool,
}

impl SqlQueryStore {
    /// Wraps an existing pool and creates the tables if needed.
    pub async fn new(pool: SqlitePool) -> AppResult<Self> {
        let store = Self { pool };
        store.ensure_tables().await?;
        Ok(store)
    }

    /// Opens the database at `database_url`, creating the file if missing.
    ///
    /// In-memory databases are held on a single connection that never expires.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        tracing::info!(url = %database_url, "Query store opened");
        Self::new(pool).await
    }

    async fn ensure_tables(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS resources (
                id              TEXT    NOT NULL PRIMARY KEY,
                name            TEXT    NOT NULL,
                description     TEXT,
                base_url        TEXT,
                supports_search INTEGER NOT NULL DEFAULT 1,
                supports_async  INTEGER NOT NULL DEFAULT 1,
                supports_sync   INTEGER NOT NULL DEFAULT 1
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Application(format!("Failed to create resources table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queries (
                id                 TEXT    NOT NULL PRIMARY KEY,
                resource_id        TEXT    REFERENCES resources(id),
                resource_result_id TEXT,
                status             TEXT    NOT NULL,
                start_time         INTEGER NOT NULL,
                ready_time         INTEGER,
                original_query     TEXT,
                metadata           TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Application(format!("Failed to create queries table: {}", e)))?;

        tracing::debug!("Tables `resources` and `queries` ensured");
        Ok(())
    }

    /// Every stored query record, oldest first.
    #[cfg(test)]
    pub async fn list_queries(&self) -> AppResult<Vec<QueryRecord>> {
        let rows = sqlx::query_as::<_, QueryRow>(
            "SELECT id, resource_id, resource_result_id, status, start_time, ready_time, original_query, metadata
             FROM queries ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueryRow::into_record).collect()
    }
}

#[async_trait]
impl QueryStore for SqlQueryStore {
    async fn get_resource(&self, id: &str) -> AppResult<Option<Resource>> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, name, description, base_url, supports_search, supports_async, supports_sync
             FROM resources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ResourceRow::into_resource))
    }

    async fn list_resources(&self) -> AppResult<Vec<Resource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, name, description, base_url, supports_search, supports_async, supports_sync
             FROM resources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResourceRow::into_resource).collect())
    }

    async fn upsert_resource(&self, resource: &Resource) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO resources (id, name, description, base_url, supports_search, supports_async, supports_sync)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                base_url = excluded.base_url,
                supports_search = excluded.supports_search,
                supports_async = excluded.supports_async,
                supports_sync = excluded.supports_sync",
        )
        .bind(&resource.id)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(&resource.base_url)
        .bind(resource.capabilities.search)
        .bind(resource.capabilities.async_query)
        .bind(resource.capabilities.sync_query)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %resource.id, "Resource saved");
        Ok(())
    }

    async fn insert_query(&self, record: &QueryRecord) -> AppResult<()> {
        let metadata = if record.sub_query_ids.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.sub_query_ids).map_err(|e| {
                AppError::Application(format!("Failed to encode metadata: {}", e))
            })?)
        };

        sqlx::query(
            "INSERT INTO queries (id, resource_id, resource_result_id, status, start_time, ready_time, original_query, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.resource_id)
        .bind(&record.resource_result_id)
        .bind(record.status.as_str())
        .bind(record.start_time.timestamp_millis())
        .bind(record.ready_time.map(|t| t.timestamp_millis()))
        .bind(&record.original_query)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_query(&self, id: &str) -> AppResult<Option<QueryRecord>> {
        let row = sqlx::query_as::<_, QueryRow>(
            "SELECT id, resource_id, resource_result_id, status, start_time, ready_time, original_query, metadata
             FROM queries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueryRow::into_record).transpose()
    }

    async fn update_status(&self, record: &QueryRecord) -> AppResult<()> {
        let result = sqlx::query("UPDATE queries SET status = ?, ready_time = ? WHERE id = ?")
            .bind(record.status.as_str())
            .bind(record.ready_time.map(|t| t.timestamp_millis()))
            .bind(&record.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("No query with id {}", record.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlQueryStore {
        SqlQueryStore::connect("sqlite::memory:").await.unwrap()
    }

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.into(),
            name: format!("{} resource", id),
            description: None,
            base_url: Some(format!("http://{}.local", id)),
            capabilities: ResourceCapabilities::default(),
        }
    }

    fn record(id: &str) -> QueryRecord {
        QueryRecord {
            id: id.into(),
            resource_id: Some("r1".into()),
            resource_result_id: Some("230958".into()),
            status: Status::Pending,
            start_time: from_millis(1_700_000_000_000),
            ready_time: None,
            original_query: Some(r#"{"query":"Q"}"#.into()),
            sub_query_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_resource_replaces_definition() {
        let store = store().await;
        store.upsert_resource(&resource("r1")).await.unwrap();

        let mut changed = resource("r1");
        changed.name = "renamed".into();
        changed.capabilities.sync_query = false;
        store.upsert_resource(&changed).await.unwrap();

        let loaded = store.get_resource("r1").await.unwrap().unwrap();
        assert_eq!(loaded, changed);
        assert_eq!(store.list_resources().await.unwrap().len(), 1);
        assert!(store.get_resource("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_record_round_trips_through_store() {
        let store = store().await;
        store.upsert_resource(&resource("r1")).await.unwrap();
        store.insert_query(&record("q1")).await.unwrap();

        let loaded = store.get_query("q1").await.unwrap().unwrap();
        assert_eq!(loaded, record("q1"));

        store.insert_query(&record("q0")).await.unwrap();
        let ids: Vec<_> = store.list_queries().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["q1", "q0"]);
    }

    #[tokio::test]
    async fn test_aggregate_metadata_keeps_child_order() {
        let store = store().await;
        let mut parent = record("parent");
        parent.resource_id = None;
        parent.resource_result_id = None;
        parent.sub_query_ids = vec!["c2".into(), "c1".into(), "c3".into()];
        store.insert_query(&parent).await.unwrap();

        let loaded = store.get_query("parent").await.unwrap().unwrap();
        assert!(loaded.is_aggregate());
        assert_eq!(loaded.sub_query_ids, ["c2", "c1", "c3"]);
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = store().await;
        store.upsert_resource(&resource("r1")).await.unwrap();
        let mut rec = record("q1");
        store.insert_query(&rec).await.unwrap();

        rec.apply_status(Status::Available, from_millis(1_700_000_005_000));
        store.update_status(&rec).await.unwrap();

        let loaded = store.get_query("q1").await.unwrap().unwrap();
        assert_eq!(loaded.status, Status::Available);
        assert_eq!(loaded.ready_time, Some(from_millis(1_700_000_005_000)));

        let missing = store.update_status(&record("nope")).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }
}
