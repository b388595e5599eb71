use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::annex::ImportOutcome;
use crate::metadata::Metadata;

/// One input file's state as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    /// Absolute or caller-supplied path of the original file.
    pub source_path: PathBuf,
    /// Canonical metadata; missing fields resolve to "unknown".
    pub metadata: Metadata,
    /// Resolved capture timestamp (metadata, else mtime).
    pub timestamp: NaiveDateTime,
    /// Destination filename, computed once from timestamp and source path.
    pub derived_name: String,
    /// Set once the staged copy exists and verified.
    pub staged_path: Option<PathBuf>,
    /// Set by the batch importer.
    pub outcome: Option<ImportOutcome>,
}

impl MediaRecord {
    pub fn new(
        source_path: PathBuf,
        metadata: Metadata,
        timestamp: NaiveDateTime,
        derived_name: String,
    ) -> Self {
        Self {
            source_path,
            metadata,
            timestamp,
            derived_name,
            staged_path: None,
            outcome: None,
        }
    }

    /// Whether the archive holds this file (freshly imported or already there).
    /// Only such records receive tags.
    pub fn in_archive(&self) -> bool {
        matches!(
            self.outcome,
            Some(ImportOutcome::Imported) | Some(ImportOutcome::SkippedExisting)
        )
    }
}
