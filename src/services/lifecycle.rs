//! Lifecycle Coordinator
//!
//! Reacts to host test-operation events. The host-facing `EventSink` only
//! classifies an event and queues it; a single consumer task applies the
//! coverage policy and drives the engine, so events are handled strictly in
//! order and at most one coverage cycle is in flight.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fine_coverage_core::{
    assign_output_folders, CoreResult, ReloadCoverageRequest, TestOperation, TestOperationState,
};
use fine_coverage_tools::ToolInstaller;

use super::engine::{CoverageEngine, Cycle};
use super::ms_coverage::{CollectionStatus, MsCodeCoverageService};
use crate::models::settings::AppOptions;
use crate::storage::config::OptionsProvider;

// ============================================================================
// Policy
// ============================================================================

/// Policy verdict before projects are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Cover,
    Cancel(String),
}

/// Apply the coverage policy to one host event.
pub fn policy(
    options: &AppOptions,
    state: TestOperationState,
    total_tests: Option<u64>,
    failed_tests: Option<u64>,
) -> PolicyDecision {
    if !options.enabled() {
        return PolicyDecision::Cancel("Coverage not enabled".to_string());
    }

    match state {
        TestOperationState::Starting if options.run_in_parallel => {
            PolicyDecision::Cancel("Coverage runs after the test run when running in parallel".to_string())
        }
        TestOperationState::Starting => PolicyDecision::Cover,
        TestOperationState::Finished if options.run_in_parallel => PolicyDecision::Cover,
        TestOperationState::Finished => {
            if !options.run_when_tests_fail && failed_tests.unwrap_or(0) > 0 {
                return PolicyDecision::Cancel(
                    "Skipping coverage due to failed tests. Option runWhenTestsFail is false".to_string(),
                );
            }
            match total_tests {
                Some(total) if total > 0 && total <= options.run_when_tests_exceed => PolicyDecision::Cancel(format!(
                    "Skipping coverage as total tests ({}) <= runWhenTestsExceed ({})",
                    total, options.run_when_tests_exceed
                )),
                _ => PolicyDecision::Cover,
            }
        }
        TestOperationState::Canceling => PolicyDecision::Cancel("Test run canceling".to_string()),
    }
}

/// Apply the policy and, for Cover, fetch the operation's projects.
pub async fn decide(
    options: &AppOptions,
    state: TestOperationState,
    operation: &dyn TestOperation,
) -> CoreResult<ReloadCoverageRequest> {
    match policy(options, state, operation.total_tests(), operation.failed_tests()) {
        PolicyDecision::Cover => Ok(ReloadCoverageRequest::Cover(operation.get_coverage_projects().await?)),
        PolicyDecision::Cancel(reason) => {
            info!("[Lifecycle] {}", reason);
            Ok(ReloadCoverageRequest::Cancel)
        }
    }
}

// ============================================================================
// Event queue
// ============================================================================

/// One queued host event.
pub struct LifecycleEvent {
    pub state: TestOperationState,
    pub operation: Arc<dyn TestOperation>,
}

/// Host-facing side of the coordinator queue.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
    engine: Arc<CoverageEngine>,
}

impl EventSink {
    /// Queue a host event. Canceling also stops the active cycle right away.
    pub fn notify(&self, state: TestOperationState, operation: Arc<dyn TestOperation>) {
        if state == TestOperationState::Canceling {
            self.engine.stop_coverage();
        }
        if self.tx.send(LifecycleEvent { state, operation }).is_err() {
            warn!("[Lifecycle] Coordinator stopped, dropping {:?} event", state);
        }
    }
}

/// Host environment discovery and event subscription.
pub trait TestEventSource: Send + Sync {
    /// Inspect host state before events are subscribed to.
    fn discover(&self) -> CoreResult<()>;

    /// Start delivering lifecycle events to `sink`.
    fn subscribe(&self, sink: EventSink);
}

// ============================================================================
// Coordinator
// ============================================================================

struct StartedRun {
    cycle: Cycle,
    status: Option<CollectionStatus>,
}

/// Single consumer of lifecycle events.
pub struct LifecycleCoordinator {
    options: Arc<dyn OptionsProvider>,
    engine: Arc<CoverageEngine>,
    ms_coverage: Arc<MsCodeCoverageService>,
    started: Option<StartedRun>,
}

impl LifecycleCoordinator {
    pub fn new(
        options: Arc<dyn OptionsProvider>,
        engine: Arc<CoverageEngine>,
        ms_coverage: Arc<MsCodeCoverageService>,
    ) -> Self {
        Self {
            options,
            engine,
            ms_coverage,
            started: None,
        }
    }

    /// Spawn the consumer loop. It runs until `shutdown` is cancelled or
    /// every sink is dropped.
    pub fn start(mut self, shutdown: CancellationToken) -> (EventSink, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<LifecycleEvent>();
        let sink = EventSink {
            tx,
            engine: self.engine.clone(),
        };

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => {
                            self.handle_event(event.state, event.operation.as_ref()).await;
                        }
                        None => break,
                    },
                    _ = shutdown.cancelled() => {
                        self.engine.stop_coverage();
                        break;
                    }
                }
            }
            debug!("[Lifecycle] Coordinator stopped");
        });

        (sink, handle)
    }

    /// Handle one event. Returns the decision made, if any.
    pub async fn handle_event(
        &mut self,
        state: TestOperationState,
        operation: &dyn TestOperation,
    ) -> Option<ReloadCoverageRequest> {
        match state {
            TestOperationState::Canceling => {
                self.ms_coverage.stop_coverage();
                None
            }
            TestOperationState::Starting => Some(self.on_starting(operation).await),
            TestOperationState::Finished => Some(self.on_finished(operation).await),
        }
    }

    async fn decide_in(
        &self,
        cycle: &Cycle,
        options: &AppOptions,
        state: TestOperationState,
        operation: &dyn TestOperation,
    ) -> ReloadCoverageRequest {
        tokio::select! {
            decision = decide(options, state, operation) => match decision {
                Ok(request) => request,
                Err(e) => {
                    error!("[Lifecycle] Error processing unit test events: {}", e);
                    ReloadCoverageRequest::Cancel
                }
            },
            _ = cycle.token().cancelled() => {
                info!("[Lifecycle] Decision cancelled");
                ReloadCoverageRequest::Cancel
            }
        }
    }

    async fn on_starting(&mut self, operation: &dyn TestOperation) -> ReloadCoverageRequest {
        let options = self.options.get();
        let cycle = self.engine.begin_cycle().await;
        let request = self
            .decide_in(&cycle, &options, TestOperationState::Starting, operation)
            .await;

        let status = match &request {
            ReloadCoverageRequest::Cover(projects) => Some(
                self.ms_coverage
                    .is_collecting(operation, projects.clone(), options.ms_code_coverage)
                    .await,
            ),
            ReloadCoverageRequest::Cancel => None,
        };
        debug!("[Lifecycle] Starting decision {:?}, collection status {:?}", request.is_cover(), status);

        self.started = Some(StartedRun { cycle, status });
        request
    }

    async fn on_finished(&mut self, operation: &dyn TestOperation) -> ReloadCoverageRequest {
        let options = self.options.get();
        let (cycle, status) = match self.started.take() {
            Some(run) if !run.cycle.token().is_cancelled() => (run.cycle, run.status),
            // The run was set up for the alternate collector; never switch to the inline tool.
            Some(StartedRun {
                status: Some(status @ (CollectionStatus::Collecting | CollectionStatus::Error)),
                ..
            }) => {
                info!("[Lifecycle] Skipping coverage, the test run was canceled ({:?})", status);
                self.engine.begin_cycle().await;
                return ReloadCoverageRequest::Cancel;
            }
            _ => (self.engine.begin_cycle().await, None),
        };

        let request = self
            .decide_in(&cycle, &options, TestOperationState::Finished, operation)
            .await;

        match (&request, status) {
            (ReloadCoverageRequest::Cover(_), Some(CollectionStatus::Collecting)) => {
                self.ms_coverage.collect(operation, &cycle);
            }
            (ReloadCoverageRequest::Cover(_), Some(CollectionStatus::Error)) => {
                warn!("[Lifecycle] Skipping coverage, ms code coverage setup failed");
            }
            (ReloadCoverageRequest::Cover(projects), _) => {
                let mut projects = projects.clone();
                assign_output_folders(&mut projects, operation.solution_directory().as_deref());
                self.engine.run_inline(&cycle, projects);
            }
            (ReloadCoverageRequest::Cancel, _) => {
                debug!("[Lifecycle] No coverage for this test run");
            }
        }
        request
    }
}

/// Initialise on a dedicated thread: discover host state, make sure the
/// coverage tool is ready and the collector package unzipped before subscribing, so no early event is missed
/// while the environment is still unknown.
pub fn initialize(
    source: Arc<dyn TestEventSource>,
    installer: Arc<ToolInstaller>,
    ms_coverage: Arc<MsCodeCoverageService>,
    sink: EventSink,
    runtime: tokio::runtime::Handle,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("fcc-initialize".to_string())
        .spawn(move || {
            if let Err(e) = source.discover() {
                error!("[Lifecycle] Host discovery failed: {}", e);
            }
            match runtime.block_on(installer.ensure_ready()) {
                Ok(state) => info!("[Lifecycle] Coverage tool ready: {:?}", state.current_version),
                Err(e) => error!("[Lifecycle] {}", e),
            }
            ms_coverage.ensure_package();
            source.subscribe(sink);
            info!("[Lifecycle] Initialized");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> AppOptions {
        AppOptions::default()
    }

    #[test]
    fn test_starting_parallel_cancels() {
        let mut opts = options();
        opts.run_in_parallel = true;
        assert!(matches!(
            policy(&opts, TestOperationState::Starting, None, None),
            PolicyDecision::Cancel(_)
        ));
        assert_eq!(
            policy(&opts, TestOperationState::Finished, Some(50), Some(0)),
            PolicyDecision::Cover
        );
    }

    #[test]
    fn test_starting_serial_covers() {
        assert_eq!(
            policy(&options(), TestOperationState::Starting, None, None),
            PolicyDecision::Cover
        );
    }

    #[test]
    fn test_failed_tests_cancel() {
        let mut opts = options();
        opts.run_when_tests_fail = false;
        assert!(matches!(
            policy(&opts, TestOperationState::Finished, Some(1000), Some(3)),
            PolicyDecision::Cancel(_)
        ));
        opts.run_when_tests_fail = true;
        assert_eq!(
            policy(&opts, TestOperationState::Finished, Some(1000), Some(3)),
            PolicyDecision::Cover
        );
    }

    #[test]
    fn test_threshold() {
        let mut opts = options();
        opts.run_when_tests_exceed = 10;
        assert!(matches!(
            policy(&opts, TestOperationState::Finished, Some(10), Some(0)),
            PolicyDecision::Cancel(_)
        ));
        assert_eq!(
            policy(&opts, TestOperationState::Finished, Some(11), Some(0)),
            PolicyDecision::Cover
        );
        // unknown or zero totals carry no information
        assert_eq!(
            policy(&opts, TestOperationState::Finished, Some(0), None),
            PolicyDecision::Cover
        );
        assert_eq!(
            policy(&opts, TestOperationState::Finished, None, None),
            PolicyDecision::Cover
        );
    }

    #[test]
    fn test_disabled_and_canceling() {
        let mut opts = options();
        opts.project_defaults.enabled = false;
        assert!(matches!(
            policy(&opts, TestOperationState::Finished, Some(50), Some(0)),
            PolicyDecision::Cancel(_)
        ));
        assert!(matches!(
            policy(&options(), TestOperationState::Canceling, None, None),
            PolicyDecision::Cancel(_)
        ));
    }
}
