//! Fine Coverage - Coverage Orchestration Engine
//!
//! Decides per test run whether and how to collect code coverage around a
//! host IDE's test execution. It includes:
//! - Lifecycle coordination of host test events
//! - Coverage engine driving the external coverage tool
//! - Alternate collector strategy with generated runsettings
//! - Options storage, data models and utilities

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub use models::settings::{AppOptions, OptionsUpdate};
pub use services::{
    CollectionStatus, CoverageEngine, EventSink, LifecycleCoordinator, MsCodeCoverageService, TestEventSource,
    MS_CODE_COVERAGE_ZIP_PREFIX,
};
pub use state::CoverageContext;
pub use storage::{ConfigService, OptionsProvider};
pub use utils::error::{AppError, AppResult};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install a fmt subscriber honouring `RUST_LOG`, defaulting to `info`.
/// Calling this more than once is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();

    let _ = TRACING_INIT.set(());
}
