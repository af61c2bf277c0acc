//! Services
//!
//! Coverage orchestration services. The lifecycle coordinator receives host
//! events and drives the engine and the alternate collector strategy.

pub mod engine;
pub mod handoff;
pub mod lifecycle;
pub mod ms_coverage;
pub mod shim;

pub use engine::{completion, CompletionCallback, CoverageEngine, Cycle};
pub use handoff::{collect_coverage_files, coverage_files_from_uris};
pub use lifecycle::{
    decide, initialize, policy, EventSink, LifecycleCoordinator, LifecycleEvent, PolicyDecision, TestEventSource,
};
pub use ms_coverage::{CollectionStatus, MsCodeCoverageService, MS_CODE_COVERAGE_ZIP_PREFIX};
pub use shim::ShimCopier;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
