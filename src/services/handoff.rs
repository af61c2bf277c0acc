//! Coverage Result Handoff
//!
//! Turns the host's result attachments into the list of cobertura files the
//! report generator consumes.

use std::path::PathBuf;

use tracing::{debug, info};
use url::Url;

use fine_coverage_core::ReportGenerator;

/// Extension of coverage files produced by the alternate collector.
pub const COBERTURA_EXTENSION: &str = ".cobertura.xml";

/// Log line used when a run produced no coverage files.
pub const NO_COBERTURA_FILES: &str = "No cobertura files for ms code coverage.";

/// Resolve result URIs (file URIs or plain paths) to cobertura files.
pub fn coverage_files_from_uris(uris: &[String]) -> Vec<PathBuf> {
    uris.iter()
        .filter_map(|uri| match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Ok(url) if url.scheme().len() > 1 => {
                debug!("[Handoff] Ignoring non-file result {}", url);
                None
            }
            // Plain paths, including drive-letter paths that parse as a
            // one-letter scheme.
            _ => Some(PathBuf::from(uri)),
        })
        .filter(|path| {
            path.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(COBERTURA_EXTENSION)
        })
        .collect()
}

/// Resolve the files and log when there are none. The report still runs.
pub fn collect_coverage_files(uris: &[String], report: &dyn ReportGenerator) -> Vec<PathBuf> {
    let files = coverage_files_from_uris(uris);
    if files.is_empty() {
        info!("[Handoff] {}", NO_COBERTURA_FILES);
        report.log_coverage_process(NO_COBERTURA_FILES);
    } else {
        info!("[Handoff] {} cobertura file(s) to report", files.len());
    }
    files
}
