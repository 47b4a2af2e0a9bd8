//! End-to-end behaviour of the pool-backed job manager.

use jobmill_core::{
    Job, JobId, WorkArgs, WorkDescriptor, WorkId, WorkOutcome, WorkStatus, RESULT_CANCELLED_ITEM,
    RESULT_KEY, RESULT_SUCCESSFUL_ITEM,
};
use jobmill_execution::ExecutorFlavor;
use jobmill_work::{JobManager, JobManagerConfig, JobManagerError, PoolJobManager};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("jobmill=debug")
        .with_test_writer()
        .try_init();
}

fn manager(max_workers: usize) -> PoolJobManager {
    init_tracing();
    PoolJobManager::new(
        JobManagerConfig::new()
            .with_name("test")
            .with_max_workers(max_workers)
            .with_wait_poll_interval(Duration::from_millis(50)),
    )
    .unwrap()
}

fn sleep_scaled(args: WorkArgs) -> WorkOutcome {
    let x = args.arg(0).and_then(Value::as_f64).unwrap_or(0.0);
    std::thread::sleep(Duration::from_secs_f64(0.1 * x));
    Ok(json!({ "x": x }))
}

#[derive(Debug, thiserror::Error)]
enum SimError {
    #[error("boom")]
    ValueError,
}

#[tokio::test(flavor = "multi_thread")]
async fn async_map_collects_every_result() {
    let manager = manager(2);

    let submission = manager
        .async_map(sleep_scaled, [json!(1), json!(2), json!(3)], Map::new())
        .unwrap();
    assert_eq!(submission.work_ids.len(), 3);
    assert!(manager.get_results(&submission.job_id).unwrap().is_none());

    manager
        .wait(Some(&submission.job_id), None, None)
        .await
        .unwrap();

    let results = manager.get_results(&submission.job_id).unwrap().unwrap();
    assert_eq!(results.len(), 3);
    for work_id in &submission.work_ids {
        assert_eq!(
            results[work_id].get(RESULT_KEY),
            Some(&json!(RESULT_SUCCESSFUL_ITEM))
        );
    }
    let mut xs: Vec<f64> = results
        .values()
        .filter_map(|r| r.get("x").and_then(Value::as_f64))
        .collect();
    xs.sort_by(f64::total_cmp);
    assert_eq!(xs, vec![1.0, 2.0, 3.0]);

    // Results are handed over once.
    assert!(matches!(
        manager.get_results(&submission.job_id),
        Err(JobManagerError::UnknownJob(_))
    ));
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn keyword_arguments_reach_every_item() {
    let manager = manager(2);
    let mut kwargs = Map::new();
    kwargs.insert("offset".into(), json!(10));

    let submission = manager
        .map(
            |args: WorkArgs| {
                let x = args.arg(0).and_then(Value::as_i64).unwrap_or(0);
                let offset = args.kwarg("offset").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!({ "sum": x + offset }))
            },
            [json!(1), json!(2)],
            kwargs,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(manager.pending_count(), 0);
    let results = manager.get_results(&submission.job_id).unwrap().unwrap();
    let mut sums: Vec<i64> = results
        .values()
        .filter_map(|r| r.get("sum").and_then(Value::as_i64))
        .collect();
    sums.sort();
    assert_eq!(sums, vec![11, 12]);
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_are_captured_as_results() {
    for flavor in [ExecutorFlavor::Blocking, ExecutorFlavor::Inline] {
        init_tracing();
        let manager = PoolJobManager::new(
            JobManagerConfig::new()
                .with_max_workers(1)
                .with_flavor(flavor),
        )
        .unwrap();

        let submission = manager
            .async_map(
                |_| Err(SimError::ValueError.into()),
                [json!(null)],
                Map::new(),
            )
            .unwrap();
        let work_id = &submission.work_ids[0];

        manager
            .wait(Some(&submission.job_id), Some(work_id), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(
            manager.get_status(&submission.job_id, work_id).unwrap(),
            WorkStatus::Failed
        );

        let result = manager
            .get_work_result(&submission.job_id, work_id)
            .unwrap()
            .unwrap();
        assert_eq!(
            result.get(RESULT_KEY),
            Some(&json!("ITEM FAILED WITH EXCEPTION: 'ValueError: boom'."))
        );
        manager.shutdown(true).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panics_and_non_mappings_fail_the_item() {
    let manager = manager(2);

    let submission = manager
        .submit(
            |_| {
                vec![
                    WorkDescriptor::new(|_| panic!("worker exploded"), WorkArgs::new()),
                    WorkDescriptor::new(|_| Ok(json!(42)), WorkArgs::new()),
                ]
            },
            WorkArgs::new(),
        )
        .unwrap();

    manager.wait(None, None, Some(Duration::from_secs(5))).await.unwrap();
    let results = manager.get_results(&submission.job_id).unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|r| r.status() == WorkStatus::Failed));
    assert!(results
        .values()
        .any(|r| r.failure_message().unwrap().contains("worker exploded")));
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_runs_jobs_in_submission_order() {
    let manager = manager(1);
    let base = Instant::now();

    let timed = move |_: WorkArgs| -> WorkOutcome {
        let started = base.elapsed().as_millis() as u64;
        std::thread::sleep(Duration::from_millis(100));
        let finished = base.elapsed().as_millis() as u64;
        Ok(json!({ "started": started, "finished": finished }))
    };

    let first = manager
        .async_map(timed, [json!(1), json!(2)], Map::new())
        .unwrap();
    let second = manager
        .async_map(timed, [json!(1), json!(2)], Map::new())
        .unwrap();

    manager.wait(None, None, Some(Duration::from_secs(10))).await.unwrap();

    let first = manager.get_results(&first.job_id).unwrap().unwrap();
    let second = manager.get_results(&second.job_id).unwrap().unwrap();

    let first_done = first
        .values()
        .filter_map(|r| r.get("finished").and_then(Value::as_u64))
        .max()
        .unwrap();
    let second_start = second
        .values()
        .filter_map(|r| r.get("started").and_then(Value::as_u64))
        .min()
        .unwrap();
    assert!(first_done <= second_start);
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_cancels_work_that_has_not_started() {
    let manager = manager(1);

    let submission = manager
        .async_map(sleep_scaled, [json!(3), json!(3), json!(3)], Map::new())
        .unwrap();
    manager.shutdown(true).await;

    assert!(manager.is_shutting_down());
    assert_eq!(manager.pending_count(), 0);

    let job_id = &submission.job_id;
    for work_id in &submission.work_ids[1..] {
        assert_eq!(
            manager.get_status(job_id, work_id).unwrap(),
            WorkStatus::Cancelled
        );
    }
    let first = manager.get_status(job_id, &submission.work_ids[0]).unwrap();
    assert!(matches!(
        first,
        WorkStatus::Cancelled | WorkStatus::RanSuccessfully
    ));

    let results = manager.get_results(job_id).unwrap().unwrap();
    assert_eq!(
        results[&submission.work_ids[2]].get(RESULT_KEY),
        Some(&json!(RESULT_CANCELLED_ITEM))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_after_shutdown_is_a_no_op() {
    let manager = manager(1);
    manager.shutdown(true).await;

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let submission = manager.async_map(
        move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(json!({}))
        },
        [json!(1)],
        Map::new(),
    );

    assert!(submission.is_none());
    assert!(manager.submit_job(Job::new(|_| Vec::new())).is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(manager.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_workers_means_available_parallelism() {
    let manager = manager(0);
    assert!(manager.max_workers() >= 1);

    let submission = manager
        .async_map(|_| Ok(json!({})), [json!(1)], Map::new())
        .unwrap();
    manager.wait(None, None, Some(Duration::from_secs(5))).await.unwrap();
    assert_eq!(
        manager
            .get_status(&submission.job_id, &submission.work_ids[0])
            .unwrap(),
        WorkStatus::RanSuccessfully
    );
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn status_never_goes_backwards() {
    let manager = manager(1);
    let submission = manager
        .async_map(sleep_scaled, [json!(1), json!(1)], Map::new())
        .unwrap();
    let job_id = &submission.job_id;
    let work_id = &submission.work_ids[1];

    let rank = |status: WorkStatus| match status {
        WorkStatus::Submitted => 0,
        WorkStatus::Running => 1,
        _ => 2,
    };

    let mut seen = Vec::new();
    loop {
        let status = manager.get_status(job_id, work_id).unwrap();
        seen.push(status);
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(seen.windows(2).all(|w| rank(w[0]) <= rank(w[1])));
    assert_eq!(seen.first(), Some(&WorkStatus::Submitted));
    assert_eq!(seen.last(), Some(&WorkStatus::RanSuccessfully));
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn results_are_withheld_while_pending() {
    let manager = manager(1);
    let submission = manager
        .async_map(sleep_scaled, [json!(0), json!(3)], Map::new())
        .unwrap();
    let job_id = &submission.job_id;

    manager
        .wait(Some(job_id), Some(&submission.work_ids[0]), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert!(manager.get_results(job_id).unwrap().is_none());
    assert!(manager
        .get_work_result(job_id, &submission.work_ids[1])
        .unwrap()
        .is_none());

    let first = manager
        .get_work_result(job_id, &submission.work_ids[0])
        .unwrap()
        .unwrap();
    assert_eq!(first.status(), WorkStatus::RanSuccessfully);
    assert!(matches!(
        manager.get_work_result(job_id, &submission.work_ids[0]),
        Err(JobManagerError::UnknownWorkItem { .. })
    ));
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_reports_timeouts_and_bad_targets() {
    let manager = manager(1);
    let submission = manager
        .async_map(sleep_scaled, [json!(10)], Map::new())
        .unwrap();

    let err = manager
        .wait(Some(&submission.job_id), None, Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, JobManagerError::Timeout { .. }));

    let err = manager
        .wait(None, Some(&submission.work_ids[0]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, JobManagerError::MissingJobId));

    // Nothing scheduled under these ids.
    assert!(manager.wait(Some(&JobId::new()), None, None).await.is_ok());
    assert!(matches!(
        manager.get_status(&submission.job_id, &WorkId::new()),
        Err(JobManagerError::UnknownWorkItem { .. })
    ));
    assert!(matches!(
        manager.get_results(&JobId::new()),
        Err(JobManagerError::UnknownJob(_))
    ));
    manager.shutdown(false).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unrepresentable_timeout_waits_without_deadline() {
    let manager = manager(1);
    let submission = manager
        .async_map(|_| Ok(json!({})), [json!(1)], Map::new())
        .unwrap();

    manager
        .wait(Some(&submission.job_id), None, Some(Duration::MAX))
        .await
        .unwrap();
    manager
        .wait(None, None, Some(Duration::MAX))
        .await
        .unwrap();
    assert_eq!(
        manager
            .get_status(&submission.job_id, &submission.work_ids[0])
            .unwrap(),
        WorkStatus::RanSuccessfully
    );
    manager.shutdown(true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn completion_events_are_published() {
    let manager = manager(2);
    let mut events = manager.subscribe();

    let job = Job::new(|args: WorkArgs| {
        let count = args.arg(0).and_then(Value::as_u64).unwrap_or(0);
        (0..count).map(|i| WorkDescriptor::new(|_| Ok(json!({})), WorkArgs::new().with_arg(i)))
    })
    .with_args(WorkArgs::new().with_arg(3))
    .with_name("events");

    let submission = manager.submit_job(job).unwrap();
    manager.wait(None, None, Some(Duration::from_secs(5))).await.unwrap();

    let mut completed = Vec::new();
    for _ in 0..3 {
        let event = events.recv().await.unwrap();
        assert_eq!(event.job_id, submission.job_id);
        assert_eq!(event.status, WorkStatus::RanSuccessfully);
        completed.push(event.work_id);
    }
    completed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut expected = submission.work_ids.clone();
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(completed, expected);
    manager.shutdown(true).await;
}
