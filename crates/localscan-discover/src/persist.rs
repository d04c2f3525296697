//! Baseline persistence for diff mode.
//!
//! Neither loading nor saving can fail a scan: problems are logged and the
//! scan carries on with an empty baseline or an unsaved one.

use localscan_core::DetectionResult;
use localscan_history::{HistoryStore, StoreError};

/// Load the previous scan, or an empty set when there is none or it is unreadable.
pub fn load_baseline<S: HistoryStore + ?Sized>(store: &S) -> Vec<DetectionResult> {
    match store.load() {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            tracing::info!("No previous scan found, every host will be reported as new");
            Vec::new()
        }
        Err(e @ StoreError::Malformed { .. }) => {
            tracing::warn!(error = %e, "Ignoring unreadable history");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read history");
            Vec::new()
        }
    }
}

/// Replace the baseline with the live (non-GONE) part of `results`.
///
/// Returns whether the write succeeded.
pub fn persist_baseline<S: HistoryStore + ?Sized>(store: &S, results: &[DetectionResult]) -> bool {
    let live = results.iter().filter(|r| !r.is_gone()).count();
    match store.save(results) {
        Ok(()) => {
            tracing::info!(hosts = live, "Baseline saved");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to save history");
            false
        }
    }
}
