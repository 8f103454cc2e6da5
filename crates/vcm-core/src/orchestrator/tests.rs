//! Lifecycle state-machine tests over store + broker.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::control::JobControl;
use crate::queue::{QueueBroker, QueueName};
use crate::store::{Db, JobStatus, JobType, NewJob};

use super::{Orchestrator, OrchestratorError, StartOutcome};

async fn orchestrator() -> Orchestrator {
    let db = Db::open_memory().await.unwrap();
    let broker = Arc::new(QueueBroker::new(Duration::from_secs(300)));
    let control = Arc::new(JobControl::new());
    Orchestrator::new(db, broker, control, 1000)
}

fn geocode_job() -> NewJob {
    NewJob {
        job_type: JobType::Geocoding,
        created_by: "tester".into(),
        payload: json!({}),
        total_items: Some(5),
    }
}

#[tokio::test]
async fn create_and_enqueue_places_unit_on_type_queue() {
    let orch = orchestrator().await;
    let job = orch.create_and_enqueue(geocode_job()).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(orch.broker().job_counts(QueueName::Geocode).waiting, 1);

    let claimed = orch
        .broker()
        .claim(QueueName::Geocode, "w", Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(claimed.job_key, job.id);
}

#[tokio::test]
async fn start_twice_yields_one_transition() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();

    assert_eq!(orch.start(job.id).await.unwrap(), StartOutcome::Started);
    assert_eq!(
        orch.start(job.id).await.unwrap(),
        StartOutcome::AlreadyProcessing
    );

    let job = orch.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[tokio::test]
async fn start_refused_from_paused() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();
    orch.pause(job.id, None).await.unwrap();

    let err = orch.start(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IllegalTransition {
            action: "start",
            from: JobStatus::Paused,
            ..
        }
    ));
}

#[tokio::test]
async fn cancel_pending_evicts_broker_unit() {
    let orch = orchestrator().await;
    let job = orch.create_and_enqueue(geocode_job()).await.unwrap();

    let status = orch.cancel(job.id, Some("operator request")).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);
    assert_eq!(orch.broker().job_counts(QueueName::Geocode).waiting, 0);

    let job = orch.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());
    assert!(job.error_log[0].message.contains("operator request"));
}

#[tokio::test]
async fn cancel_terminal_is_idempotent_noop() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();
    orch.start(job.id).await.unwrap();
    orch.complete(job.id, None).await.unwrap();

    let status = orch.cancel(job.id, None).await.unwrap();
    assert_eq!(status, JobStatus::Completed);
}

#[tokio::test]
async fn cancel_processing_flags_abort_and_terminalises() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();
    orch.start(job.id).await.unwrap();
    let flag = orch.control().register(job.id);

    let status = orch.cancel(job.id, None).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);
    assert!(flag.load(std::sync::atomic::Ordering::Relaxed));
    assert_eq!(orch.status(job.id).await.unwrap(), JobStatus::Cancelled);
}

#[tokio::test]
async fn pause_then_resume_reenqueues() {
    let orch = orchestrator().await;
    let job = orch.create_and_enqueue(geocode_job()).await.unwrap();

    orch.pause(job.id, None).await.unwrap();
    assert_eq!(orch.status(job.id).await.unwrap(), JobStatus::Paused);
    assert_eq!(orch.broker().job_counts(QueueName::Geocode).waiting, 0);

    orch.resume(job.id).await.unwrap();
    let job = orch.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.completed_at.is_none());
    assert_eq!(orch.broker().job_counts(QueueName::Geocode).waiting, 1);
}

#[tokio::test]
async fn resume_refused_unless_paused() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();

    let err = orch.resume(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IllegalTransition {
            action: "resume",
            from: JobStatus::Pending,
            ..
        }
    ));
}

#[tokio::test]
async fn pause_refused_on_terminal_job() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();
    orch.start(job.id).await.unwrap();
    orch.complete(job.id, Some(json!({"n": 0}))).await.unwrap();

    let err = orch.pause(job.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IllegalTransition {
            action: "pause",
            from: JobStatus::Completed,
            ..
        }
    ));
    // Unchanged job.
    let job = orch.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.output_stats, Some(json!({"n": 0})));
}

#[tokio::test]
async fn complete_requires_processing() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();

    let err = orch.complete(job.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IllegalTransition {
            action: "complete",
            from: JobStatus::Pending,
            ..
        }
    ));
}

#[tokio::test]
async fn fail_after_cancel_does_not_override_terminal() {
    let orch = orchestrator().await;
    let job = orch.create(geocode_job()).await.unwrap();
    orch.start(job.id).await.unwrap();
    orch.cancel(job.id, None).await.unwrap();

    // Worker loses the race and reports failure afterwards.
    orch.fail(job.id, "handler blew up").await.unwrap();
    let job = orch.get(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    // The message still lands in the bounded log.
    assert!(job
        .error_log
        .iter()
        .any(|e| e.message.contains("handler blew up")));
}

#[tokio::test]
async fn not_found_surfaces_as_typed_error() {
    let orch = orchestrator().await;
    let err = orch.get(999).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(999)));
    assert!(err.is_input_error());
}
