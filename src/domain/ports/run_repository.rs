//! Repository port for run persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Run, RunStatus};

/// Filters for querying runs.
#[derive(Default, Debug, Clone)]
pub struct RunFilters {
    pub status: Option<RunStatus>,
    pub job_id: Option<Uuid>,
    pub queue_class: Option<String>,
    pub limit: Option<i64>,
}

/// A terminal transition applied by `finalize` / `finalize_batch`.
#[derive(Debug, Clone)]
pub struct Finalization {
    /// Terminal status to set
    pub status: RunStatus,
    /// Failure detail, if any
    pub error_detail: Option<String>,
    /// Completion instant; duration is computed against `started_at`
    pub completed_at: DateTime<Utc>,
}

impl Finalization {
    pub fn new(status: RunStatus, error_detail: Option<String>) -> Self {
        Self {
            status,
            error_detail,
            completed_at: Utc::now(),
        }
    }
}

/// Repository port for run persistence operations.
///
/// Every status-changing operation is a *guarded* write: the update applies
/// only when the row's current status matches the expected prior status, so
/// racing writers (dispatcher, worker report, reconciler) cannot produce lost
/// updates or resurrect a terminal run. Guarded operations return whether the
/// guard matched.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert a new run record.
    async fn create(&self, run: &Run) -> DomainResult<()>;

    /// Get a run by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Run>>;

    /// List runs with optional filters, newest first.
    async fn list(&self, filters: RunFilters) -> DomainResult<Vec<Run>>;

    /// All runs currently in the given status.
    async fn list_by_status(&self, status: RunStatus) -> DomainResult<Vec<Run>>;

    /// Count runs matching filters.
    async fn count(&self, filters: RunFilters) -> DomainResult<i64>;

    /// Guarded `queued -> running` promotion. Records the broker position
    /// when one is known (an existing position is kept otherwise). Returns
    /// false when the run was not `queued`.
    async fn mark_running(&self, id: Uuid, queue_position: Option<i64>) -> DomainResult<bool>;

    /// Record the broker-assigned position on a still-queued run.
    async fn set_queue_position(&self, id: Uuid, queue_position: i64) -> DomainResult<bool>;

    /// Guarded transition into a terminal state from any non-terminal state.
    /// Returns false when the run was already terminal (or missing).
    async fn finalize(&self, id: Uuid, finalization: &Finalization) -> DomainResult<bool>;

    /// Batched guarded finalize, applied only to rows still in `running`.
    /// One statement for the whole batch; returns the number of rows moved.
    async fn finalize_batch(&self, ids: &[Uuid], finalization: &Finalization)
        -> DomainResult<u64>;
}
