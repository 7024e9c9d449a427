mod common;

use common::fixtures::{LOGO, ledger_data, quote_data};
use common::{TestResult, TestServiceBuilder, start_service, wait_until};
use quire::{FailureKind, JobError, JobId, JobState, OutputFormat, RetentionPolicy};
use quire_broker::testing::{ScriptedFactory, Step};
use quire_traits::{ResourceError, ResourceProvider, SharedResourceData};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn failure_kind(err: JobError) -> FailureKind {
    match err {
        JobError::Failed { reason, .. } => reason.kind,
        other => panic!("expected a failed job, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_ids_and_templates() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let unknown = JobId::new();
    assert_eq!(manager.status(unknown), Err(JobError::NotFound(unknown)));
    assert_eq!(manager.fetch(unknown).unwrap_err(), JobError::NotFound(unknown));

    let id = manager.submit("invoice", json!({}), OutputFormat::Native)?;
    let status = manager.wait(id).await?;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failure.as_ref().map(|f| f.kind), Some(FailureKind::Template));
    assert!(status.finished_at.is_some());
    assert_eq!(failure_kind(manager.fetch(id).unwrap_err()), FailureKind::Template);

    let missing_field = manager.submit("quote", json!({ "lines": [] }), OutputFormat::Native)?;
    manager.wait(missing_field).await?;
    let err = manager.fetch(missing_field).unwrap_err();
    assert!(err.to_string().contains("project"), "{}", err);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_rejects_without_creating_a_job() -> TestResult {
    let engines = ScriptedFactory::new().with_steps([Step::Delay(Duration::from_millis(500))]);
    let service = TestServiceBuilder::new()
        .configure(|c| {
            c.workers.count = 1;
            c.workers.queue_capacity = 2;
        })
        .engines(engines)
        .start()
        .await;
    let manager = &service.manager;

    // Occupy the only worker in a slow conversion.
    let busy = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Office)?;
    assert!(wait_until(Duration::from_secs(5), || manager.status(busy).map(|s| s.state) == Ok(JobState::Converting)).await);

    let queued: Vec<JobId> = (0..2)
        .map(|_| manager.submit("ledger", ledger_data(&["B"]), OutputFormat::Native))
        .collect::<Result<_, _>>()?;
    assert_eq!(manager.queue_len(), 2);

    let rejected = manager.submit("ledger", ledger_data(&["C"]), OutputFormat::Native);
    assert_eq!(rejected, Err(JobError::ResourceExhausted { capacity: 2 }));
    assert_eq!(manager.job_count(), 3);
    assert!(manager.queue_len() <= 2);

    for id in std::iter::once(busy).chain(queued) {
        assert_eq!(manager.wait(id).await?.state, JobState::Ready);
    }
    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acknowledge_drops_artifact_under_acknowledge_policy() -> TestResult {
    let service = TestServiceBuilder::new()
        .configure(|c| c.storage.retention = RetentionPolicy::Acknowledge)
        .start()
        .await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Native)?;
    manager.wait(id).await?;
    let held = manager.fetch(id)?;
    manager.acknowledge(id)?;

    assert_eq!(manager.fetch(id).unwrap_err(), JobError::Expired(id));
    assert_eq!(manager.status(id)?.state, JobState::Expired);
    // Bytes already handed out stay valid.
    assert!(held.bytes.starts_with(b"%PDF"));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acknowledge_is_a_no_op_under_ttl_policy() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Native)?;
    manager.wait(id).await?;
    manager.acknowledge(id)?;
    assert!(manager.fetch(id).is_ok());
    assert_eq!(manager.status(id)?.state, JobState::Ready);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_artifacts_expire_after_their_ttl() -> TestResult {
    let service = TestServiceBuilder::new().configure(|c| c.storage.artifact_ttl_secs = 1).start().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Native)?;
    manager.wait(id).await?;
    assert!(manager.fetch(id).is_ok());

    assert!(wait_until(Duration::from_secs(3), || manager.status(id).map(|s| s.state) == Ok(JobState::Expired)).await);
    assert_eq!(manager.fetch(id).unwrap_err(), JobError::Expired(id));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_settled_records_are_evicted_after_retention() -> TestResult {
    let service = TestServiceBuilder::new().configure(|c| c.jobs.retention_secs = 0).start().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Native)?;
    assert!(wait_until(Duration::from_secs(3), || manager.status(id) == Err(JobError::NotFound(id))).await);
    assert_eq!(manager.job_count(), 0);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_passed_while_queued_fails_with_timeout() -> TestResult {
    let engines = ScriptedFactory::new().with_steps([Step::Delay(Duration::from_secs(2))]);
    let service = TestServiceBuilder::new()
        .configure(|c| {
            c.workers.count = 1;
            c.jobs.deadline_ms = 300;
        })
        .engines(engines)
        .start()
        .await;
    let manager = &service.manager;

    let slow = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Office)?;
    let starved = manager.submit("ledger", ledger_data(&["B"]), OutputFormat::Native)?;

    assert_eq!(manager.wait(slow).await?.state, JobState::Failed);
    let status = manager.wait(starved).await?;
    let reason = status.failure.expect("failed job has a reason");
    assert_eq!(reason.kind, FailureKind::Timeout);
    assert!(reason.message.contains("queued"), "{}", reason.message);
    assert!(status.started_at.is_none());

    manager.shutdown().await;
    Ok(())
}

/// Panics on one key; every other key is simply missing.
#[derive(Debug)]
struct ExplodingProvider;

impl ResourceProvider for ExplodingProvider {
    fn load(&self, key: &str) -> Result<SharedResourceData, ResourceError> {
        if key == "explode.png" {
            panic!("decoder blew up on {}", key);
        }
        Err(ResourceError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> bool {
        key == "explode.png"
    }

    fn name(&self) -> &'static str {
        "ExplodingProvider"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rendering_panic_fails_only_that_job() -> TestResult {
    let service = TestServiceBuilder::new()
        .configure(|c| c.workers.count = 1)
        .resources(Arc::new(ExplodingProvider))
        .template(LOGO)
        .start()
        .await;
    let manager = &service.manager;

    let doomed = manager.submit("logo", json!({ "src": "explode.png" }), OutputFormat::Native)?;
    let status = manager.wait(doomed).await?;
    let reason = status.failure.expect("failed job has a reason");
    assert_eq!(reason.kind, FailureKind::Internal);
    assert!(reason.message.contains("panicked"), "{}", reason.message);

    // Same single worker, still alive; a missing image only draws a placeholder.
    let fine = manager.submit("logo", json!({ "src": "missing.png" }), OutputFormat::Native)?;
    assert_eq!(manager.wait(fine).await?.state, JobState::Ready);
    let next = manager.submit("quote", quote_data(), OutputFormat::Native)?;
    assert_eq!(manager.wait(next).await?.state, JobState::Ready);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_drains_queue_then_rejects() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let ids: Vec<JobId> = (0..4)
        .map(|i| manager.submit("ledger", ledger_data(&[&format!("Row {}", i)]), OutputFormat::Native))
        .collect::<Result<_, _>>()?;
    manager.shutdown().await;

    for id in ids {
        assert_eq!(manager.status(id)?.state, JobState::Ready);
    }
    assert_eq!(
        manager.submit("ledger", ledger_data(&["late"]), OutputFormat::Native),
        Err(JobError::ShuttingDown)
    );
    // Idempotent.
    manager.shutdown().await;
    Ok(())
}
