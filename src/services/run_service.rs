//! Run Record Manager.
//!
//! Owns the persisted lifecycle of a run. Every transition goes through a
//! guarded repository write; terminal transitions additionally publish a
//! completion event. Re-running a job always creates a fresh run; records
//! are never reused and never deleted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{Run, RunOutcome, RunStatus};
use crate::domain::ports::{
    CompletionSource, Finalization, RunCompleted, RunEventSink, RunFilters, RunRepository,
};

/// Service coordinating run record persistence and completion events.
pub struct RunService {
    repo: Arc<dyn RunRepository>,
    events: Arc<dyn RunEventSink>,
}

impl RunService {
    pub fn new(repo: Arc<dyn RunRepository>, events: Arc<dyn RunEventSink>) -> Self {
        Self { repo, events }
    }

    /// Insert a freshly built run (status `queued`).
    #[instrument(skip(self, run), fields(run_id = %run.id), err)]
    pub async fn create(&self, run: &Run) -> Result<()> {
        self.repo
            .create(run)
            .await
            .context("Failed to insert run record")
    }

    /// Get a run by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Run>> {
        self.repo.get(id).await.context("Failed to fetch run")
    }

    /// List runs with filters, newest first.
    pub async fn list(&self, filters: RunFilters) -> Result<Vec<Run>> {
        self.repo.list(filters).await.context("Failed to list runs")
    }

    /// Count runs matching filters.
    pub async fn count(&self, filters: RunFilters) -> Result<i64> {
        self.repo.count(filters).await.context("Failed to count runs")
    }

    /// Promote a run to `running` once the broker (or a worker pickup)
    /// confirms acceptance. Ignored when the run already left `queued`.
    #[instrument(skip(self), err)]
    pub async fn mark_started(&self, id: Uuid, queue_position: Option<i64>) -> Result<bool> {
        let promoted = self
            .repo
            .mark_running(id, queue_position)
            .await
            .context("Failed to mark run running")?;
        if promoted {
            info!(run_id = %id, "run accepted into worker pool");
        }
        Ok(promoted)
    }

    /// Record the broker-assigned position on a reservation-style submit.
    pub async fn record_position(&self, id: Uuid, position: i64) -> Result<()> {
        self.repo
            .set_queue_position(id, position)
            .await
            .context("Failed to record queue position")?;
        Ok(())
    }

    /// Worker report path: a run finished with an execution verdict.
    ///
    /// Runs still `queued` (reservation brokers without a pickup signal) are
    /// promoted first so the lifecycle ordering holds. Returns false when the
    /// run was already settled: a reconciliation pass won the race, and the
    /// verdict is dropped rather than overwriting a terminal state.
    #[instrument(skip(self), err)]
    pub async fn record_outcome(
        &self,
        id: Uuid,
        outcome: RunOutcome,
        error_detail: Option<String>,
    ) -> Result<bool> {
        let _ = self.repo.mark_running(id, None).await?;

        let finalization = Finalization::new(outcome.status(), error_detail);
        let settled = self
            .repo
            .finalize(id, &finalization)
            .await
            .context("Failed to finalize run outcome")?;

        if settled {
            self.publish_completion(id, CompletionSource::Worker).await;
        } else {
            warn!(run_id = %id, "outcome report ignored, run already terminal");
        }
        Ok(settled)
    }

    /// Dispatch failure path: settle a run that never made it onto the queue
    /// (admission rejected, broker submission failed).
    #[instrument(skip(self, detail), err)]
    pub async fn fail_dispatch(&self, id: Uuid, detail: impl Into<String>) -> Result<()> {
        let finalization = Finalization::new(RunStatus::Failed, Some(detail.into()));
        let settled = self
            .repo
            .finalize(id, &finalization)
            .await
            .context("Failed to settle rejected run")?;

        if settled {
            self.publish_completion(id, CompletionSource::Dispatch).await;
        }
        Ok(())
    }

    async fn publish_completion(&self, id: Uuid, source: CompletionSource) {
        match self.repo.get(id).await {
            Ok(Some(run)) => {
                self.events
                    .run_completed(RunCompleted::from_run(&run, source))
                    .await;
            }
            Ok(None) => warn!(run_id = %id, "finalized run vanished before event publish"),
            Err(err) => warn!(run_id = %id, %err, "failed to load run for completion event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::CaptureEventSink;
    use crate::domain::errors::DomainResult;
    use crate::domain::models::{QueueClass, TriggerSource};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::*;

    mock! {
        pub Repo {}

        #[async_trait]
        impl RunRepository for Repo {
            async fn create(&self, run: &Run) -> DomainResult<()>;
            async fn get(&self, id: Uuid) -> DomainResult<Option<Run>>;
            async fn list(&self, filters: RunFilters) -> DomainResult<Vec<Run>>;
            async fn list_by_status(&self, status: RunStatus) -> DomainResult<Vec<Run>>;
            async fn count(&self, filters: RunFilters) -> DomainResult<i64>;
            async fn mark_running(&self, id: Uuid, queue_position: Option<i64>) -> DomainResult<bool>;
            async fn set_queue_position(&self, id: Uuid, queue_position: i64) -> DomainResult<bool>;
            async fn finalize(&self, id: Uuid, finalization: &Finalization) -> DomainResult<bool>;
            async fn finalize_batch(&self, ids: &[Uuid], finalization: &Finalization) -> DomainResult<u64>;
        }
    }

    fn test_run() -> Run {
        Run::new(
            Uuid::new_v4(),
            QueueClass::browser(),
            TriggerSource::Manual,
        )
    }

    #[tokio::test]
    async fn test_record_outcome_publishes_event() {
        let mut repo = MockRepo::new();
        let mut run = test_run();
        let run_id = run.id;
        run.transition_to(RunStatus::Running).unwrap();
        run.transition_to(RunStatus::Passed).unwrap();

        repo.expect_mark_running().returning(|_, _| Ok(false));
        repo.expect_finalize()
            .with(eq(run_id), always())
            .times(1)
            .returning(|_, _| Ok(true));
        let run_clone = run.clone();
        repo.expect_get()
            .returning(move |_| Ok(Some(run_clone.clone())));

        let sink = CaptureEventSink::new();
        let service = RunService::new(Arc::new(repo), Arc::new(sink.clone()));

        let settled = service
            .record_outcome(run_id, RunOutcome::Passed, None)
            .await
            .unwrap();
        assert!(settled);

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, RunStatus::Passed);
        assert_eq!(events[0].source, CompletionSource::Worker);
    }

    #[tokio::test]
    async fn test_late_outcome_is_dropped() {
        let mut repo = MockRepo::new();
        repo.expect_mark_running().returning(|_, _| Ok(false));
        // Guard misses: the run is already terminal.
        repo.expect_finalize().returning(|_, _| Ok(false));

        let sink = CaptureEventSink::new();
        let service = RunService::new(Arc::new(repo), Arc::new(sink.clone()));

        let settled = service
            .record_outcome(Uuid::new_v4(), RunOutcome::Failed, None)
            .await
            .unwrap();
        assert!(!settled);
        assert!(sink.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_dispatch_settles_and_publishes() {
        let mut repo = MockRepo::new();
        let mut run = test_run();
        let run_id = run.id;
        run.transition_to(RunStatus::Failed).unwrap();
        run.error_detail = Some("queue browser is at capacity".to_string());

        repo.expect_finalize()
            .withf(|_, f| f.status == RunStatus::Failed)
            .times(1)
            .returning(|_, _| Ok(true));
        let run_clone = run.clone();
        repo.expect_get()
            .returning(move |_| Ok(Some(run_clone.clone())));

        let sink = CaptureEventSink::new();
        let service = RunService::new(Arc::new(repo), Arc::new(sink.clone()));

        service
            .fail_dispatch(run_id, "queue browser is at capacity")
            .await
            .unwrap();

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, CompletionSource::Dispatch);
    }
}
