//! Dispatch Orchestrator.
//!
//! Composes validation, variable resolution, admission, run record creation
//! and broker submission. Each failure short-circuits and leaves no partial
//! state: nothing before run creation writes anywhere, and everything after
//! it settles the run to `failed` before propagating.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DispatchError, DomainError};
use crate::domain::models::{CheckTask, ExecutionProfile, ProjectScope, Run, RunStatus, TriggerSource};
use crate::domain::ports::{
    BrokerError, QueueBroker, QueuePayload, QueueScript, ResolvedScript, SubmitReceipt,
    VariableResolver,
};
use crate::services::admission::{AdmissionController, AdmissionDecision};
use crate::services::run_service::RunService;

/// What the caller gets back from a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The created run
    pub run_id: Uuid,
    /// Status the run landed in (`running`, or `queued` for reservation
    /// brokers)
    pub status: RunStatus,
    /// Broker-assigned position, when reported
    pub queue_position: Option<i64>,
}

/// Orchestrates one dispatch from request to queued/running run.
pub struct Dispatcher {
    resolver: Arc<dyn VariableResolver>,
    admission: AdmissionController,
    broker: Arc<dyn QueueBroker>,
    runs: Arc<RunService>,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn VariableResolver>,
        admission: AdmissionController,
        broker: Arc<dyn QueueBroker>,
        runs: Arc<RunService>,
    ) -> Self {
        Self {
            resolver,
            admission,
            broker,
            runs,
        }
    }

    /// Dispatch a task. Fresh run id per call; retried client calls create
    /// distinct runs; dedup is the caller's concern.
    #[instrument(skip(self, task, scope), fields(job_id = %task.job_id, class = %task.queue_class()), err)]
    pub async fn dispatch(
        &self,
        task: CheckTask,
        scope: &ProjectScope,
        trigger: TriggerSource,
    ) -> Result<DispatchOutcome, DispatchError> {
        // 1. Shape validation, before any state exists.
        task.validate()
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        // 2. Resolve variables for every script. A resolution failure aborts
        //    with no run record and no queue entry.
        let mut resolved: Vec<(usize, ResolvedScript)> = Vec::with_capacity(task.scripts.len());
        for (idx, script) in task.scripts.iter().enumerate() {
            let script_resolved = self.resolver.resolve(&script.body, scope).await?;
            if !script_resolved.substitutions.is_empty() {
                // Names only; secret values never reach the log.
                info!(
                    script = %script.name,
                    variables = ?script_resolved.audit_names(),
                    "resolved script variables"
                );
            }
            resolved.push((idx, script_resolved));
        }

        // 3. Create the run record in `queued`.
        let class = task.queue_class();
        let mut run = Run::new(task.job_id, class.clone(), trigger)
            .with_engine(task.profile.engine());
        if let Some(location) = task.location() {
            run = run.with_location(location);
        }
        self.runs.create(&run).await.map_err(into_db_error)?;

        // 4. Advisory admission check.
        match self.admission.admit(&class).await {
            Ok(AdmissionDecision::Admitted { position }) => {
                info!(run_id = %run.id, position, "admission granted");
            }
            Ok(AdmissionDecision::Rejected { reason }) => {
                return Err(self.reject_capacity(&run, reason).await);
            }
            Err(err) => {
                return Err(self.fail_submission(&run, err).await);
            }
        }

        // 5. Submit; the broker re-checks the ceiling atomically with the
        //    enqueue, closing the admission race window.
        let payload = build_payload(&run, &task, resolved);
        let ceiling = self.admission.ceiling_for(&class);
        match self.broker.submit(&payload, &class, Some(ceiling)).await {
            Ok(receipt) => self.apply_receipt(&run, receipt).await,
            Err(BrokerError::CapacityExceeded { reason, .. }) => {
                Err(self.reject_capacity(&run, reason).await)
            }
            Err(err) => Err(self.fail_submission(&run, err).await),
        }
    }

    /// Transition the run per the broker's receipt.
    async fn apply_receipt(
        &self,
        run: &Run,
        receipt: SubmitReceipt,
    ) -> Result<DispatchOutcome, DispatchError> {
        use crate::domain::ports::EntryState;

        let status = match receipt.state {
            EntryState::Active => {
                self.runs
                    .mark_started(run.id, receipt.position)
                    .await
                    .map_err(into_db_error)?;
                RunStatus::Running
            }
            // Reservation-style broker: stays queued until a pickup signal.
            EntryState::Waiting | EntryState::Delayed => {
                if let Some(position) = receipt.position {
                    self.runs
                        .record_position(run.id, position)
                        .await
                        .map_err(into_db_error)?;
                }
                RunStatus::Queued
            }
            // A submit landing terminal or unknown is a protocol breach.
            other => {
                let err = BrokerError::Protocol(format!(
                    "submit receipt reported entry state {other:?}"
                ));
                return Err(self.fail_submission(run, err).await);
            }
        };

        info!(run_id = %run.id, status = status.as_str(), "task submitted");
        Ok(DispatchOutcome {
            run_id: run.id,
            status,
            queue_position: receipt.position,
        })
    }

    /// Capacity rejection: settle the run as failed with the reason, then
    /// surface the retryable capacity error.
    async fn reject_capacity(&self, run: &Run, reason: String) -> DispatchError {
        warn!(run_id = %run.id, %reason, "dispatch rejected for capacity");
        if let Err(err) = self.runs.fail_dispatch(run.id, reason.clone()).await {
            warn!(run_id = %run.id, %err, "failed to settle capacity-rejected run");
        }
        DispatchError::CapacityExceeded {
            class: run.queue_class.clone(),
            reason,
        }
    }

    /// Broker failure after the run exists: settle as failed, propagate.
    async fn fail_submission(&self, run: &Run, broker_err: BrokerError) -> DispatchError {
        warn!(run_id = %run.id, %broker_err, "broker submission failed");
        if let Err(err) = self
            .runs
            .fail_dispatch(run.id, broker_err.to_string())
            .await
        {
            warn!(run_id = %run.id, %err, "failed to settle run after submission error");
        }
        DispatchError::Broker(broker_err)
    }
}

fn into_db_error(err: anyhow::Error) -> DispatchError {
    DispatchError::Database(DomainError::DatabaseError(err.to_string()))
}

/// Build the broker payload for a task. One builder per execution profile so
/// the two submission paths stay statically distinguishable.
fn build_payload(run: &Run, task: &CheckTask, resolved: Vec<(usize, ResolvedScript)>) -> QueuePayload {
    let scripts = resolved
        .into_iter()
        .map(|(idx, r)| {
            let spec = &task.scripts[idx];
            QueueScript {
                id: spec.id,
                name: spec.name.clone(),
                body: r.body,
                declared_type: spec.declared_type.clone(),
            }
        })
        .collect();

    match &task.profile {
        ExecutionProfile::Browser => browser_payload(run, scripts),
        ExecutionProfile::LoadTest { .. } => load_test_payload(run, task, scripts),
    }
}

fn browser_payload(run: &Run, scripts: Vec<QueueScript>) -> QueuePayload {
    QueuePayload {
        run_id: run.id,
        job_id: run.job_id,
        engine: "browser".to_string(),
        scripts,
        location: None,
    }
}

fn load_test_payload(run: &Run, task: &CheckTask, scripts: Vec<QueueScript>) -> QueuePayload {
    QueuePayload {
        run_id: run.id,
        job_id: run.job_id,
        engine: "loadtest".to_string(),
        scripts,
        location: task.location().map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use crate::adapters::events::CaptureEventSink;
    use crate::adapters::resolver::StaticVariableResolver;
    use crate::adapters::sqlite::{
        all_embedded_migrations, create_test_pool, Migrator, SqliteRunRepository,
    };
    use crate::domain::models::{CapacityConfig, QueueClass, ScriptSpec};
    use crate::domain::ports::{RunFilters, RunRepository};

    struct Harness {
        dispatcher: Dispatcher,
        repo: Arc<SqliteRunRepository>,
        broker: Arc<InMemoryBroker>,
        sink: CaptureEventSink,
    }

    async fn harness(default_ceiling: u64) -> Harness {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        let repo = Arc::new(SqliteRunRepository::new(pool));

        let broker = Arc::new(InMemoryBroker::new([
            QueueClass::browser(),
            QueueClass::load_test(None),
        ]));
        let sink = CaptureEventSink::new();
        let runs = Arc::new(RunService::new(repo.clone(), Arc::new(sink.clone())));

        let mut resolver = StaticVariableResolver::new();
        resolver.insert("proj", "TARGET", "https://example.test", false);
        resolver.insert("proj", "TOKEN", "hunter2", true);

        let capacity = CapacityConfig {
            default_ceiling,
            per_class: std::collections::HashMap::new(),
        };
        let dispatcher = Dispatcher::new(
            Arc::new(resolver),
            AdmissionController::new(broker.clone(), capacity),
            broker.clone(),
            runs,
        );

        Harness {
            dispatcher,
            repo,
            broker,
            sink,
        }
    }

    fn browser_task() -> CheckTask {
        CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::Browser,
            vec![ScriptSpec::new("homepage", "open('{{TARGET}}');")],
        )
    }

    #[tokio::test]
    async fn test_successful_dispatch_runs_immediately() {
        let h = harness(5).await;
        let outcome = h
            .dispatcher
            .dispatch(browser_task(), &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Running);

        let run = h.repo.get(outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.engine.as_deref(), Some("browser"));

        let probe = h
            .broker
            .probe(outcome.run_id, &QueueClass::browser())
            .await
            .unwrap();
        assert!(probe.is_live());
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_no_run() {
        let h = harness(5).await;
        let task = CheckTask::new(Uuid::new_v4(), ExecutionProfile::Browser, vec![]);

        let err = h
            .dispatcher
            .dispatch(task, &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let count = h.repo.count(RunFilters::default()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_no_run() {
        let h = harness(5).await;
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::Browser,
            vec![ScriptSpec::new("bad", "open('{{NOT_DEFINED}}');")],
        );

        let err = h
            .dispatcher
            .dispatch(task, &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Resolution(_)));

        let count = h.repo.count(RunFilters::default()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_admission_rejection_settles_run_failed() {
        let h = harness(1).await;

        // Fill the only slot.
        h.dispatcher
            .dispatch(browser_task(), &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap();

        let err = h
            .dispatcher
            .dispatch(browser_task(), &ProjectScope::new("proj"), TriggerSource::Scheduled)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, DispatchError::CapacityExceeded { .. }));

        let failed = h
            .repo
            .list_by_status(RunStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        let detail = failed[0].error_detail.as_deref().unwrap();
        assert!(detail.contains("ceiling"), "unexpected detail: {detail}");

        let events = h.sink.events().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_broker_outage_settles_run_failed() {
        let h = harness(5).await;
        h.broker.set_unreachable(true).await;

        let err = h
            .dispatcher
            .dispatch(browser_task(), &ProjectScope::new("proj"), TriggerSource::Remote)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Broker(_)));
        assert!(!err.is_retryable());

        // The run store is independent of the broker, so the settled
        // record must exist even while the broker is down.
        h.broker.set_unreachable(false).await;
        let failed = h.repo.list_by_status(RunStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_values_never_stored_on_run() {
        let h = harness(5).await;
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::Browser,
            vec![ScriptSpec::new("auth", "login('{{TOKEN}}');")],
        );

        let outcome = h
            .dispatcher
            .dispatch(task, &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap();

        let run = h.repo.get(outcome.run_id).await.unwrap().unwrap();
        let serialized = serde_json::to_string(&run).unwrap();
        assert!(!serialized.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_reservation_broker_leaves_run_queued_with_position() {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        let repo = Arc::new(SqliteRunRepository::new(pool));
        let broker =
            Arc::new(InMemoryBroker::new([QueueClass::browser()]).with_reservation());
        let runs = Arc::new(RunService::new(
            repo.clone(),
            Arc::new(CaptureEventSink::new()),
        ));
        let dispatcher = Dispatcher::new(
            Arc::new(StaticVariableResolver::new()),
            AdmissionController::new(broker.clone(), CapacityConfig::default()),
            broker,
            runs,
        );

        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::Browser,
            vec![ScriptSpec::new("plain", "open('/');")],
        );
        let outcome = dispatcher
            .dispatch(task, &ProjectScope::new("proj"), TriggerSource::Manual)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Queued);
        assert_eq!(outcome.queue_position, Some(1));

        let run = repo.get(outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.queue_position, Some(1));
    }

    #[tokio::test]
    async fn test_load_test_payload_carries_location() {
        let h = harness(5).await;
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::LoadTest {
                location: Some("eu-west".to_string()),
            },
            vec![ScriptSpec::new("surge", "get('{{TARGET}}');")],
        );

        let outcome = h
            .dispatcher
            .dispatch(task, &ProjectScope::new("proj"), TriggerSource::Scheduled)
            .await
            .unwrap();

        let run = h.repo.get(outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.queue_class.as_str(), "loadtest:eu-west");
        assert_eq!(run.location.as_deref(), Some("eu-west"));
        assert_eq!(run.engine.as_deref(), Some("loadtest"));
    }
}
