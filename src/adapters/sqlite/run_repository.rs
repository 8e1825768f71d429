//! SQLite implementation of the RunRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{QueueClass, Run, RunStatus, TriggerSource};
use crate::domain::ports::{Finalization, RunFilters, RunRepository};

#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Raw row shape; conversion to the domain model happens in `TryFrom`.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    job_id: String,
    status: String,
    trigger_source: String,
    queue_class: String,
    queue_position: Option<i64>,
    engine: Option<String>,
    location: Option<String>,
    error_detail: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
}

impl TryFrom<RunRow> for Run {
    type Error = DomainError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let parse_uuid = |s: &str| {
            Uuid::parse_str(s)
                .map_err(|e| DomainError::SerializationError(format!("invalid uuid {s}: {e}")))
        };
        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| DomainError::SerializationError(format!("invalid timestamp {s}: {e}")))
        };

        Ok(Run {
            id: parse_uuid(&row.id)?,
            job_id: parse_uuid(&row.job_id)?,
            status: RunStatus::from_str(&row.status).ok_or_else(|| {
                DomainError::SerializationError(format!("unknown run status {}", row.status))
            })?,
            trigger: TriggerSource::from_str(&row.trigger_source).ok_or_else(|| {
                DomainError::SerializationError(format!(
                    "unknown trigger source {}",
                    row.trigger_source
                ))
            })?,
            queue_class: QueueClass::parse(&row.queue_class),
            queue_position: row.queue_position,
            engine: row.engine,
            location: row.location,
            error_detail: row.error_detail,
            started_at: parse_time(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse_time).transpose()?,
            duration_ms: row.duration_ms,
        })
    }
}

const TERMINAL_STATUSES: &str = "('passed', 'failed', 'error', 'timeout')";

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: &Run) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO runs (id, job_id, status, trigger_source, queue_class,
               queue_position, engine, location, error_detail, started_at, completed_at, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.job_id.to_string())
        .bind(run.status.as_str())
        .bind(run.trigger.as_str())
        .bind(run.queue_class.as_str())
        .bind(run.queue_position)
        .bind(&run.engine)
        .bind(&run.location)
        .bind(&run.error_detail)
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(run.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Run>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Run::try_from).transpose()
    }

    async fn list(&self, filters: RunFilters) -> DomainResult<Vec<Run>> {
        let mut query = String::from("SELECT * FROM runs WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filters.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(job_id) = &filters.job_id {
            query.push_str(" AND job_id = ?");
            bindings.push(job_id.to_string());
        }
        if let Some(class) = &filters.queue_class {
            query.push_str(" AND queue_class = ?");
            bindings.push(class.clone());
        }

        query.push_str(" ORDER BY started_at DESC");

        if let Some(limit) = filters.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, RunRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<RunRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Run::try_from).collect()
    }

    async fn list_by_status(&self, status: RunStatus) -> DomainResult<Vec<Run>> {
        self.list(RunFilters {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn count(&self, filters: RunFilters) -> DomainResult<i64> {
        let mut query = String::from("SELECT COUNT(*) FROM runs WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filters.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(job_id) = &filters.job_id {
            query.push_str(" AND job_id = ?");
            bindings.push(job_id.to_string());
        }
        if let Some(class) = &filters.queue_class {
            query.push_str(" AND queue_class = ?");
            bindings.push(class.clone());
        }

        let mut q = sqlx::query_as::<_, (i64,)>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let (count,) = q.fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn mark_running(&self, id: Uuid, queue_position: Option<i64>) -> DomainResult<bool> {
        // Guard on 'queued' so a worker pickup racing a finalization can
        // never resurrect a settled run.
        let result = sqlx::query(
            "UPDATE runs SET status = 'running', queue_position = COALESCE(?, queue_position)
             WHERE id = ? AND status = 'queued'",
        )
        .bind(queue_position)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_queue_position(&self, id: Uuid, queue_position: i64) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE runs SET queue_position = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(queue_position)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finalize(&self, id: Uuid, finalization: &Finalization) -> DomainResult<bool> {
        let completed_at = finalization.completed_at.to_rfc3339();
        let query = format!(
            "UPDATE runs SET status = ?, error_detail = ?, completed_at = ?,
             duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000.0 AS INTEGER)
             WHERE id = ? AND status NOT IN {TERMINAL_STATUSES}"
        );

        let result = sqlx::query(&query)
            .bind(finalization.status.as_str())
            .bind(&finalization.error_detail)
            .bind(&completed_at)
            .bind(&completed_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finalize_batch(
        &self,
        ids: &[Uuid],
        finalization: &Finalization,
    ) -> DomainResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Single statement for the whole batch, guarded on 'running' only:
        // a worker report landing mid-pass wins and the batch skips that row.
        let placeholders = vec!["?"; ids.len()].join(", ");
        let completed_at = finalization.completed_at.to_rfc3339();
        let query = format!(
            "UPDATE runs SET status = ?, error_detail = ?, completed_at = ?,
             duration_ms = CAST((julianday(?) - julianday(started_at)) * 86400000.0 AS INTEGER)
             WHERE status = 'running' AND id IN ({placeholders})"
        );

        let mut q = sqlx::query(&query)
            .bind(finalization.status.as_str())
            .bind(&finalization.error_detail)
            .bind(&completed_at)
            .bind(&completed_at);
        for id in ids {
            q = q.bind(id.to_string());
        }

        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
