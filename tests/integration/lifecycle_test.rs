//! Lifecycle Coordinator Integration Tests
//!
//! Host events go through the coordinator with fake collaborators; the
//! fake tool writes coverage output so complete cycles reach the report.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use fine_coverage::AppOptions;
use fine_coverage_core::{ReloadCoverageRequest, TestOperation, TestOperationState};

use crate::support::{FakeOperation, FakeTool, Harness};

fn options() -> AppOptions {
    AppOptions::default()
}

// ============================================================================
// Policy scenarios
// ============================================================================

#[tokio::test]
async fn test_parallel_run_covers_after_finish() {
    let mut opts = options();
    opts.run_in_parallel = true;
    opts.run_when_tests_exceed = 10;
    let harness = Harness::new(opts).await;
    let project = harness.project("Alpha");
    let operation = FakeOperation {
        total: Some(50),
        failed: Some(0),
        projects: vec![project.clone()],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    let starting = coordinator
        .handle_event(TestOperationState::Starting, &operation)
        .await;
    assert_eq!(starting, Some(ReloadCoverageRequest::Cancel));

    let finished = coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;
    assert_eq!(finished, Some(ReloadCoverageRequest::Cover(vec![project.clone()])));

    harness.context.engine().wait_idle().await;
    assert_eq!(harness.tool.coverage_runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.report.last_files(),
        Some(vec![project.cover_tool_output_file()])
    );
    assert!(harness.context.engine().last_report().unwrap().success);
}

#[tokio::test]
async fn test_failed_tests_skip_coverage() {
    let mut opts = options();
    opts.run_when_tests_fail = false;
    let harness = Harness::new(opts).await;
    let operation = FakeOperation {
        total: Some(1000),
        failed: Some(3),
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    let finished = coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;

    assert_eq!(finished, Some(ReloadCoverageRequest::Cancel));
    harness.context.engine().wait_idle().await;
    assert_eq!(harness.tool.coverage_runs.load(Ordering::SeqCst), 0);
    assert_eq!(harness.report.report_count(), 0);
}

#[tokio::test]
async fn test_too_few_tests_skip_coverage() {
    let mut opts = options();
    opts.run_when_tests_exceed = 10;
    let harness = Harness::new(opts).await;
    let operation = FakeOperation {
        total: Some(10),
        failed: Some(0),
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    let finished = coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;

    assert_eq!(finished, Some(ReloadCoverageRequest::Cancel));
    assert_eq!(harness.report.report_count(), 0);
}

#[tokio::test]
async fn test_serial_run_covers_inline() {
    let harness = Harness::new(options()).await;
    let alpha = harness.project("Alpha");
    let mut beta = harness.project("Beta");
    beta.settings.enabled = false;
    let operation = FakeOperation {
        total: Some(20),
        failed: Some(0),
        projects: vec![alpha.clone(), beta],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    let starting = coordinator
        .handle_event(TestOperationState::Starting, &operation)
        .await;
    assert!(starting.unwrap().is_cover());

    coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;
    harness.context.engine().wait_idle().await;

    // disabled projects are not run
    assert_eq!(harness.tool.coverage_runs.load(Ordering::SeqCst), 1);
    assert_eq!(harness.report.last_files(), Some(vec![alpha.cover_tool_output_file()]));
}

#[tokio::test]
async fn test_disabled_coverage_cancels() {
    let mut opts = options();
    opts.project_defaults.enabled = false;
    let harness = Harness::new(opts).await;
    let operation = FakeOperation {
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    assert_eq!(
        coordinator
            .handle_event(TestOperationState::Finished, &operation)
            .await,
        Some(ReloadCoverageRequest::Cancel)
    );
}

// ============================================================================
// Event queue and cancellation
// ============================================================================

#[tokio::test]
async fn test_canceling_interrupts_running_cycle() {
    let harness = Harness::with_tool(
        options(),
        FakeTool {
            hang: true,
            ..Default::default()
        },
    )
    .await;
    let operation: Arc<dyn TestOperation> = Arc::new(FakeOperation {
        total: Some(20),
        failed: Some(0),
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    });

    let shutdown = CancellationToken::new();
    let (sink, coordinator) = harness.context.coordinator().start(shutdown.clone());

    sink.notify(TestOperationState::Finished, operation.clone());
    let tool = harness.tool.clone();
    assert!(
        harness
            .eventually(|| tool.coverage_runs.load(Ordering::SeqCst) == 1)
            .await
    );

    sink.notify(TestOperationState::Canceling, operation);
    harness.context.engine().wait_idle().await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(harness.report.report_count(), 0);
    assert!(harness.context.engine().last_report().is_none());

    shutdown.cancel();
    coordinator.await.unwrap();
}

#[tokio::test]
async fn test_later_decision_wins() {
    let harness = Harness::new(options()).await;
    let first = FakeOperation {
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };
    let second_project = harness.project("Beta");
    let second = FakeOperation {
        projects: vec![second_project.clone()],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    coordinator
        .handle_event(TestOperationState::Finished, &first)
        .await;
    coordinator
        .handle_event(TestOperationState::Finished, &second)
        .await;
    harness.context.engine().wait_idle().await;

    assert_eq!(
        harness.report.last_files(),
        Some(vec![second_project.cover_tool_output_file()])
    );
}

#[tokio::test]
async fn test_canceled_ms_run_does_not_fall_back_to_inline() {
    let opts = AppOptions {
        ms_code_coverage: true,
        ..options()
    };
    let harness = Harness::new(opts).await;
    let operation = FakeOperation {
        total: Some(20),
        failed: Some(0),
        solution: Some(harness.root().to_path_buf()),
        projects: vec![harness.project("Alpha")],
        ..Default::default()
    };

    let mut coordinator = harness.context.coordinator();
    let starting = coordinator
        .handle_event(TestOperationState::Starting, &operation)
        .await;
    assert!(starting.unwrap().is_cover());

    coordinator
        .handle_event(TestOperationState::Canceling, &operation)
        .await;
    let finished = coordinator
        .handle_event(TestOperationState::Finished, &operation)
        .await;
    harness.context.engine().wait_idle().await;

    assert_eq!(finished, Some(ReloadCoverageRequest::Cancel));
    assert_eq!(harness.tool.coverage_runs.load(Ordering::SeqCst), 0);
    assert_eq!(harness.report.report_count(), 0);
}
