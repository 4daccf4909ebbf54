//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **Cascades**: Deleting an endpoint removes its samples (foreign keys on)
//!
//! ## Concurrency
//!
//! Every liveness and credential change is a single `UPDATE` statement, so a
//! rotated token replaces the previous one atomically. Sample inserts and
//! retention deletes are keyed by endpoint and never touch other endpoints'
//! rows.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{Endpoint, EndpointId, NewEndpoint, NewSample, Sample};
use crate::{LivenessStatus, MetricsPayload};

const ENDPOINT_COLUMNS: &str =
    "id, name, address, status, latency_ms, last_checked, agent_token";

const SAMPLE_COLUMNS: &str = r#"
    id, endpoint_id, collected_at,
    cpu_percent, memory_percent, memory_used_mb, memory_total_mb,
    disk_percent, disk_used_gb, disk_total_gb, uptime_seconds,
    load_avg_1, load_avg_5, load_avg_15
"#;

/// SQLite storage backend
///
/// This backend stores endpoints and samples in a local SQLite database file.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite (WAL mode, foreign keys)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use fleetwatch::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./fleetwatch.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::CorruptRow(format!("timestamp out of range: {millis}")))
    }

    /// Insert one sample row, returning its id
    async fn insert_sample_row<'e, E>(executor: E, sample: &NewSample) -> StorageResult<i64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let m = &sample.metrics;

        let result = sqlx::query(
            r#"
            INSERT INTO samples (
                endpoint_id, collected_at,
                cpu_percent, memory_percent, memory_used_mb, memory_total_mb,
                disk_percent, disk_used_gb, disk_total_gb, uptime_seconds,
                load_avg_1, load_avg_5, load_avg_15
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.endpoint_id)
        .bind(Self::timestamp_to_millis(&sample.collected_at))
        .bind(m.cpu_percent)
        .bind(m.memory_percent)
        .bind(m.memory_used_mb as i64)
        .bind(m.memory_total_mb as i64)
        .bind(m.disk_percent)
        .bind(m.disk_used_gb)
        .bind(m.disk_total_gb)
        .bind(m.uptime_seconds as i64)
        .bind(m.load_avg_1)
        .bind(m.load_avg_5)
        .bind(m.load_avg_15)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }

    fn endpoint_from_row(row: &SqliteRow) -> StorageResult<Endpoint> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<LivenessStatus>()
            .map_err(StorageError::CorruptRow)?;

        let last_checked = row
            .try_get::<Option<i64>, _>("last_checked")?
            .map(Self::millis_to_timestamp)
            .transpose()?;

        Ok(Endpoint {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            status,
            latency_ms: row
                .try_get::<Option<i64>, _>("latency_ms")?
                .map(|v| v.max(0) as u64),
            last_checked,
            agent_token: row.try_get("agent_token")?,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<Sample> {
        Ok(Sample {
            id: row.try_get("id")?,
            endpoint_id: row.try_get("endpoint_id")?,
            collected_at: Self::millis_to_timestamp(row.try_get("collected_at")?)?,
            metrics: MetricsPayload {
                cpu_percent: row.try_get("cpu_percent")?,
                memory_percent: row.try_get("memory_percent")?,
                memory_used_mb: row.try_get::<i64, _>("memory_used_mb")? as u64,
                memory_total_mb: row.try_get::<i64, _>("memory_total_mb")? as u64,
                disk_percent: row.try_get("disk_percent")?,
                disk_used_gb: row.try_get("disk_used_gb")?,
                disk_total_gb: row.try_get("disk_total_gb")?,
                uptime_seconds: row.try_get::<i64, _>("uptime_seconds")? as u64,
                load_avg_1: row.try_get("load_avg_1")?,
                load_avg_5: row.try_get("load_avg_5")?,
                load_avg_15: row.try_get("load_avg_15")?,
            },
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self), fields(address = %endpoint.address))]
    async fn insert_endpoint(&self, endpoint: NewEndpoint) -> StorageResult<Endpoint> {
        let result = sqlx::query("INSERT INTO endpoints (name, address) VALUES (?, ?)")
            .bind(&endpoint.name)
            .bind(&endpoint.address)
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        debug!("registered endpoint {id}");

        Ok(Endpoint {
            id,
            name: endpoint.name,
            address: endpoint.address,
            status: LivenessStatus::Unknown,
            latency_ms: None,
            last_checked: None,
            agent_token: None,
        })
    }

    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>> {
        let sql = format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(Self::endpoint_from_row).collect()
    }

    async fn get_endpoint(&self, id: EndpointId) -> StorageResult<Option<Endpoint>> {
        let sql = format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::endpoint_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_endpoint(&self, id: EndpointId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, checked_at))]
    async fn record_probe_result(
        &self,
        id: EndpointId,
        status: LivenessStatus,
        latency_ms: Option<u64>,
        checked_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE endpoints SET status = ?, latency_ms = ?, last_checked = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(latency_ms.map(|v| v as i64))
        .bind(Self::timestamp_to_millis(&checked_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, sample), fields(endpoint_id = sample.endpoint_id))]
    async fn record_push(&self, sample: NewSample) -> StorageResult<Option<Sample>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE endpoints SET status = ?, last_checked = ? WHERE id = ?")
            .bind(LivenessStatus::Online.as_str())
            .bind(Self::timestamp_to_millis(&sample.collected_at))
            .bind(sample.endpoint_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let id = Self::insert_sample_row(&mut *tx, &sample).await?;
        tx.commit().await?;

        Ok(Some(Sample::from_new(id, sample)))
    }

    async fn find_endpoint_by_token(&self, token: &str) -> StorageResult<Option<Endpoint>> {
        let sql = format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE agent_token = ?");
        let row = sqlx::query(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::endpoint_from_row).transpose()
    }

    #[instrument(skip(self, token))]
    async fn set_agent_token(&self, id: EndpointId, token: Option<String>) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE endpoints SET agent_token = ? WHERE id = ?")
            .bind(token)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, sample), fields(endpoint_id = sample.endpoint_id))]
    async fn insert_sample(&self, sample: NewSample) -> StorageResult<Sample> {
        let id = Self::insert_sample_row(&self.pool, &sample).await?;
        Ok(Sample::from_new(id, sample))
    }

    async fn latest_sample(&self, id: EndpointId) -> StorageResult<Option<Sample>> {
        let sql = format!(
            r#"
            SELECT {SAMPLE_COLUMNS}
            FROM samples
            WHERE endpoint_id = ?
            ORDER BY collected_at DESC, id DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }

    #[instrument(skip(self), fields(since = %since))]
    async fn samples_since(
        &self,
        id: EndpointId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<Sample>> {
        let sql = format!(
            r#"
            SELECT {SAMPLE_COLUMNS}
            FROM samples
            WHERE endpoint_id = ? AND collected_at >= ?
            ORDER BY collected_at DESC, id DESC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(id)
            .bind(Self::timestamp_to_millis(&since))
            .fetch_all(&self.pool)
            .await?;

        let samples: StorageResult<Vec<Sample>> = rows.iter().map(Self::sample_from_row).collect();
        let samples = samples?;
        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn delete_samples_before(
        &self,
        id: EndpointId,
        before: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM samples WHERE endpoint_id = ? AND collected_at < ?")
            .bind(id)
            .bind(Self::timestamp_to_millis(&before))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        if deleted > 0 {
            debug!("deleted {} expired samples", deleted);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        let (endpoints,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM endpoints")
            .fetch_one(&self.pool)
            .await?;

        let (samples,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let file_size_mb = file_size as f64 / 1_000_000.0;

        Ok(format!(
            "SQLite: {} endpoints, {} samples, {:.2} MB on disk",
            endpoints, samples, file_size_mb
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
