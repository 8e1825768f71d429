//! Property tests for run status monotonicity.
//!
//! The run table tolerates any interleaving of the three writers (dispatch
//! path, worker reports, reconciliation) because every status write is a
//! guarded update. These properties drive arbitrary operation sequences at a
//! real repository and assert that a run settles into exactly one terminal
//! state and never moves again.

mod helpers;

use proptest::prelude::*;
use uuid::Uuid;

use vigil::adapters::sqlite::SqliteRunRepository;
use vigil::domain::models::{QueueClass, Run, RunOutcome, RunStatus, TriggerSource};
use vigil::domain::ports::{Finalization, RunRepository};

use helpers::database::setup_test_db;

/// One write any of the system's writers could attempt.
#[derive(Debug, Clone)]
enum Op {
    /// Broker acceptance / worker pickup
    MarkRunning,
    /// Worker verdict
    Outcome(RunOutcome),
    /// Dispatch failure path
    FailDispatch,
    /// Reconciler correction
    ReconcileError,
    /// Reconciler timeout
    ReconcileTimeout,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::MarkRunning),
        Just(Op::Outcome(RunOutcome::Passed)),
        Just(Op::Outcome(RunOutcome::Failed)),
        Just(Op::Outcome(RunOutcome::Error)),
        Just(Op::FailDispatch),
        Just(Op::ReconcileError),
        Just(Op::ReconcileTimeout),
    ]
}

async fn apply(repo: &SqliteRunRepository, id: Uuid, op: &Op) {
    match op {
        Op::MarkRunning => {
            let _ = repo.mark_running(id, None).await.unwrap();
        }
        Op::Outcome(outcome) => {
            // Worker report path: promote if needed, then settle.
            let _ = repo.mark_running(id, None).await.unwrap();
            let _ = repo
                .finalize(id, &Finalization::new(outcome.status(), None))
                .await
                .unwrap();
        }
        Op::FailDispatch => {
            let _ = repo
                .finalize(
                    id,
                    &Finalization::new(RunStatus::Failed, Some("submit failed".into())),
                )
                .await
                .unwrap();
        }
        Op::ReconcileError => {
            let _ = repo
                .finalize_batch(
                    &[id],
                    &Finalization::new(
                        RunStatus::Error,
                        Some("not found in execution queue".into()),
                    ),
                )
                .await
                .unwrap();
        }
        Op::ReconcileTimeout => {
            let _ = repo
                .finalize_batch(
                    &[id],
                    &Finalization::new(RunStatus::Timeout, None),
                )
                .await
                .unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: whatever sequence of writes arrives, every observed status
    /// change is a legal state-machine edge, and once a terminal status is
    /// observed it never changes again.
    #[test]
    fn prop_status_is_monotonic(ops in prop::collection::vec(op_strategy(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let pool = setup_test_db().await;
            let repo = SqliteRunRepository::new(pool);

            let run = Run::new(
                Uuid::new_v4(),
                QueueClass::browser(),
                TriggerSource::Manual,
            );
            repo.create(&run).await.unwrap();

            let mut previous = RunStatus::Queued;
            let mut terminal_seen: Option<RunStatus> = None;

            for op in &ops {
                apply(&repo, run.id, op).await;
                let current = repo.get(run.id).await.unwrap().unwrap().status;

                if let Some(terminal) = terminal_seen {
                    prop_assert_eq!(
                        current, terminal,
                        "terminal status changed after {:?}", op
                    );
                } else if current != previous {
                    prop_assert!(
                        previous.can_transition_to(current),
                        "illegal edge {} -> {} via {:?}",
                        previous.as_str(),
                        current.as_str(),
                        op
                    );
                }

                if current.is_terminal() {
                    terminal_seen = Some(current);
                }
                previous = current;
            }
            Ok(())
        })?;
    }

    /// Property: a settled run has its completion metadata set exactly once;
    /// later writes never touch it.
    #[test]
    fn prop_completion_metadata_is_stable(
        ops in prop::collection::vec(op_strategy(), 2..10)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let pool = setup_test_db().await;
            let repo = SqliteRunRepository::new(pool);

            let run = Run::new(
                Uuid::new_v4(),
                QueueClass::browser(),
                TriggerSource::Scheduled,
            );
            repo.create(&run).await.unwrap();

            let mut settled: Option<Run> = None;
            for op in &ops {
                apply(&repo, run.id, op).await;
                let current = repo.get(run.id).await.unwrap().unwrap();

                if let Some(previous) = &settled {
                    prop_assert_eq!(&current, previous, "settled run mutated by {:?}", op);
                } else if current.status.is_terminal() {
                    prop_assert!(current.completed_at.is_some());
                    prop_assert!(current.duration_ms.is_some());
                    settled = Some(current);
                }
            }
            Ok(())
        })?;
    }
}
