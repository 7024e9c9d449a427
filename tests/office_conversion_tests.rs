mod common;

use common::fixtures::{ledger_data, quote_data};
use common::{TestResult, TestServiceBuilder, start_service, wait_until};
use quire::{FailureKind, JobId, JobState, OutputFormat};
use quire_broker::SlotState;
use quire_broker::testing::{SCRIPTED_PDF, ScriptedFactory, Step};
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_office_job_goes_through_the_broker() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let id = manager.submit("quote", quote_data(), OutputFormat::Office)?;
    let status = manager.wait(id).await?;
    assert_eq!(status.state, JobState::Ready);

    let artifact = manager.fetch(id)?;
    assert_eq!(artifact.bytes, SCRIPTED_PDF);
    assert_eq!(artifact.file_name, "quote-backyard.pdf");
    assert_eq!(manager.broker_stats().conversions, 1);
    assert_eq!(service.engines.probe().calls(), 1);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_crash_is_recovered_and_retried() -> TestResult {
    let engines = ScriptedFactory::new().with_steps([Step::Crash, Step::Succeed]);
    let service = TestServiceBuilder::new().engines(engines).start().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A", "B"]), OutputFormat::Office)?;
    assert_eq!(manager.wait(id).await?.state, JobState::Ready);
    assert_eq!(manager.fetch(id)?.bytes, SCRIPTED_PDF);

    let stats = manager.broker_stats();
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.conversions, 1);
    assert_eq!(stats.exhausted, 0);

    let probe = service.engines.probe();
    assert_eq!(probe.calls(), 2);
    assert_eq!(probe.starts(), 2);
    assert_eq!(probe.terminations(), 1);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retries_run_out_into_a_conversion_failure() -> TestResult {
    let engines = ScriptedFactory::new().with_steps([Step::Reject, Step::Reject, Step::Reject]);
    let service = TestServiceBuilder::new().engines(engines).start().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Office)?;
    let status = manager.wait(id).await?;
    let reason = status.failure.expect("failed job has a reason");
    assert_eq!(reason.kind, FailureKind::Conversion);
    assert!(reason.message.contains("3 attempt"), "{}", reason.message);

    let stats = manager.broker_stats();
    assert_eq!((stats.failed_attempts, stats.exhausted, stats.restarts), (3, 1, 0));

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_bounds_conversion_and_frees_the_slot() -> TestResult {
    let deadline = Duration::from_millis(400);
    let engines = ScriptedFactory::new().with_steps([Step::Hang]);
    let service = TestServiceBuilder::new()
        .configure(|c| {
            c.jobs.deadline_ms = deadline.as_millis() as u64;
            c.broker.attempt_timeout_ms = 10_000;
        })
        .engines(engines)
        .start()
        .await;
    let manager = &service.manager;
    // Keep the hung slot in recovery so the second job cannot get it.
    service.engines.fail_next_starts(u32::MAX);

    let started = Instant::now();
    let first = manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Office)?;
    let second = manager.submit("ledger", ledger_data(&["B"]), OutputFormat::Office)?;

    let mut kinds = Vec::new();
    for id in [first, second] {
        let status = manager.wait(id).await?;
        assert_eq!(status.state, JobState::Failed);
        kinds.push(status.failure.expect("failed job has a reason").kind);
    }
    let margin = Duration::from_secs(1);
    assert!(started.elapsed() < deadline + margin, "took {:?}", started.elapsed());

    // One job held the hung slot; the other never got one.
    kinds.sort_by_key(|k| k.to_string());
    assert_eq!(kinds, vec![FailureKind::Conversion, FailureKind::Timeout]);
    assert_eq!(manager.broker_stats().queue_timeouts, 1);

    let broker = manager.broker().clone();
    assert!(broker.slot_states().iter().all(|(_, state)| !matches!(state, SlotState::Busy(_))));

    service.engines.fail_next_starts(0);
    assert!(
        wait_until(margin, || broker.slot_states().iter().all(|(_, state)| *state == SlotState::Idle)).await,
        "slot not recovered: {:?}",
        broker.slot_states()
    );

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slots_never_run_two_conversions_at_once() -> TestResult {
    let engines = ScriptedFactory::new().with_steps(vec![Step::Delay(Duration::from_millis(30)); 8]);
    let service = TestServiceBuilder::new()
        .configure(|c| {
            c.workers.count = 4;
            c.broker.slots = 2;
        })
        .engines(engines)
        .start()
        .await;
    let manager = &service.manager;

    let ids: Vec<JobId> = (0..8)
        .map(|_| manager.submit("ledger", ledger_data(&["A"]), OutputFormat::Office))
        .collect::<Result<_, _>>()?;
    for id in ids {
        assert_eq!(manager.wait(id).await?.state, JobState::Ready);
    }

    let probe = service.engines.probe();
    assert_eq!(probe.calls(), 8);
    assert_eq!(probe.max_per_slot(), 1);
    assert!(probe.max_global_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    assert_eq!(manager.broker_stats().conversions, 8);

    manager.shutdown().await;
    Ok(())
}
