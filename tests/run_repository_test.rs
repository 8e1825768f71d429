mod helpers;

use chrono::Utc;
use uuid::Uuid;

use vigil::adapters::sqlite::SqliteRunRepository;
use vigil::domain::models::{QueueClass, Run, RunStatus, TriggerSource};
use vigil::domain::ports::{Finalization, RunFilters, RunRepository};

use helpers::database::{setup_test_db, teardown_test_db};

fn create_test_run(status: RunStatus) -> Run {
    let mut run = Run::new(
        Uuid::new_v4(),
        QueueClass::browser(),
        TriggerSource::Manual,
    )
    .with_engine("browser");
    run.status = status;
    run
}

#[tokio::test]
async fn test_create_and_get_run() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let run = create_test_run(RunStatus::Queued);
    let run_id = run.id;

    repo.create(&run).await.expect("failed to insert run");

    let retrieved = repo
        .get(run_id)
        .await
        .expect("failed to get run")
        .expect("run missing");
    assert_eq!(retrieved.id, run_id);
    assert_eq!(retrieved.status, RunStatus::Queued);
    assert_eq!(retrieved.trigger, TriggerSource::Manual);
    assert_eq!(retrieved.queue_class, QueueClass::browser());
    assert_eq!(retrieved.engine.as_deref(), Some("browser"));
    assert!(retrieved.completed_at.is_none());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_get_nonexistent_run() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let result = repo.get(Uuid::new_v4()).await.expect("failed to query");
    assert!(result.is_none());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_list_filters_by_status_and_job() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let running = create_test_run(RunStatus::Running);
    let queued = create_test_run(RunStatus::Queued);
    repo.create(&running).await.unwrap();
    repo.create(&queued).await.unwrap();

    let by_status = repo.list_by_status(RunStatus::Running).await.unwrap();
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0].id, running.id);

    let by_job = repo
        .list(RunFilters {
            job_id: Some(queued.job_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_job.len(), 1);
    assert_eq!(by_job[0].id, queued.id);

    let count = repo
        .count(RunFilters {
            status: Some(RunStatus::Queued),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(count, 1);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_mark_running_guards_on_queued() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let run = create_test_run(RunStatus::Queued);
    repo.create(&run).await.unwrap();

    assert!(repo.mark_running(run.id, Some(3)).await.unwrap());
    let stored = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert_eq!(stored.queue_position, Some(3));

    // Second promotion misses the guard.
    assert!(!repo.mark_running(run.id, Some(9)).await.unwrap());
    let stored = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored.queue_position, Some(3));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_mark_running_keeps_existing_position_when_none_given() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let run = create_test_run(RunStatus::Queued);
    repo.create(&run).await.unwrap();
    repo.set_queue_position(run.id, 7).await.unwrap();

    assert!(repo.mark_running(run.id, None).await.unwrap());
    let stored = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored.queue_position, Some(7));

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_finalize_sets_completion_and_duration() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let mut run = create_test_run(RunStatus::Running);
    run.started_at = Utc::now() - chrono::Duration::seconds(90);
    repo.create(&run).await.unwrap();

    let moved = repo
        .finalize(run.id, &Finalization::new(RunStatus::Passed, None))
        .await
        .unwrap();
    assert!(moved);

    let stored = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Passed);
    assert!(stored.completed_at.is_some());
    let duration = stored.duration_ms.expect("duration not set");
    assert!((85_000..95_000).contains(&duration), "duration {duration}");

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_finalize_never_overwrites_terminal_state() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let run = create_test_run(RunStatus::Running);
    repo.create(&run).await.unwrap();

    repo.finalize(run.id, &Finalization::new(RunStatus::Passed, None))
        .await
        .unwrap();

    // A racing writer loses: the guard misses and nothing changes.
    let moved = repo
        .finalize(
            run.id,
            &Finalization::new(RunStatus::Error, Some("late".to_string())),
        )
        .await
        .unwrap();
    assert!(!moved);

    let stored = repo.get(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Passed);
    assert!(stored.error_detail.is_none());

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_finalize_batch_only_touches_running_rows() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let running_a = create_test_run(RunStatus::Running);
    let running_b = create_test_run(RunStatus::Running);
    let queued = create_test_run(RunStatus::Queued);
    let passed = create_test_run(RunStatus::Passed);
    for run in [&running_a, &running_b, &queued, &passed] {
        repo.create(run).await.unwrap();
    }

    let ids = vec![running_a.id, running_b.id, queued.id, passed.id];
    let moved = repo
        .finalize_batch(
            &ids,
            &Finalization::new(RunStatus::Error, Some("not found in execution queue".into())),
        )
        .await
        .unwrap();
    assert_eq!(moved, 2);

    assert_eq!(
        repo.get(running_a.id).await.unwrap().unwrap().status,
        RunStatus::Error
    );
    assert_eq!(
        repo.get(queued.id).await.unwrap().unwrap().status,
        RunStatus::Queued
    );
    assert_eq!(
        repo.get(passed.id).await.unwrap().unwrap().status,
        RunStatus::Passed
    );

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_finalize_batch_with_no_ids_is_a_noop() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    let moved = repo
        .finalize_batch(&[], &Finalization::new(RunStatus::Error, None))
        .await
        .unwrap();
    assert_eq!(moved, 0);

    teardown_test_db(pool).await;
}

#[tokio::test]
async fn test_list_orders_newest_first_and_limits() {
    let pool = setup_test_db().await;
    let repo = SqliteRunRepository::new(pool.clone());

    for age in [300, 200, 100] {
        let mut run = create_test_run(RunStatus::Queued);
        run.started_at = Utc::now() - chrono::Duration::seconds(age);
        repo.create(&run).await.unwrap();
    }

    let runs = repo
        .list(RunFilters {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].started_at > runs[1].started_at);

    teardown_test_db(pool).await;
}
