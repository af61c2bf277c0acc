//! Integration Tests Module
//!
//! Drives the coverage engine end to end with fake host collaborators:
//! lifecycle policy scenarios, the alternate collector flow, and runsettings
//! generation on disk.

// Fake test operation, report generator and tool runner
mod support;

// Lifecycle coordinator scenarios
mod lifecycle_test;

// Alternate collector collection tests
mod ms_coverage_test;

// RunSettings generation and analysis tests
mod runsettings_test;
