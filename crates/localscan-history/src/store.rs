//! History storage: trait + JSON file implementation.
//!
//! The baseline lives at a single well-known path and is overwritten by every
//! save. A missing file means "no previous scan", not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use localscan_core::DetectionResult;

use crate::HistoryRecord;

/// Errors that can occur while reading or writing the baseline.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("History file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for baseline persistence backends.
pub trait HistoryStore {
    /// Load the previous scan. `Ok(None)` when no baseline exists yet.
    fn load(&self) -> Result<Option<Vec<DetectionResult>>, StoreError>;

    /// Replace the baseline. GONE entries are never written.
    fn save(&self, results: &[DetectionResult]) -> Result<(), StoreError>;
}

/// `~/.localscan/last.json`, falling back to the working directory when no
/// home directory is known.
pub fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".localscan")
        .join("last.json")
}

/// File-system backed store holding one pretty-printed JSON array.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> Result<Option<Vec<DetectionResult>>, StoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<HistoryRecord> =
            serde_json::from_str(&json).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "History loaded"
        );

        Ok(Some(records.into_iter().map(DetectionResult::from).collect()))
    }

    fn save(&self, results: &[DetectionResult]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records: Vec<HistoryRecord> = results
            .iter()
            .filter(|r| !r.is_gone())
            .map(HistoryRecord::from)
            .collect();

        let json = serde_json::to_string_pretty(&records)?;

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "Could not remove temporary history file");
            }
            return Err(e.into());
        }

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "History saved"
        );

        Ok(())
    }
}
