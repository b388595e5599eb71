use std::path::Path;

use chrono::NaiveDateTime;

/// Derive the destination filename for a source file.
///
/// Pure function of the resolved timestamp and source path:
/// `YYYY-MM-DD_HH-MM-SS_<stem>.<EXT>`, zero-padded so names sort
/// chronologically, with the original stem kept to tell apart burst shots
/// sharing a timestamp. The extension is uppercased to a single case.
/// Exact collisions (same timestamp and stem) are left to the staging
/// manager's refuse-to-overwrite policy and the archive tool's
/// already-exists signal.
pub fn derive_filename(timestamp: &NaiveDateTime, source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");

    let mut name = format!("{}_{}", timestamp.format("%Y-%m-%d_%H-%M-%S"), stem);
    if let Some(ext) = source_path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(&ext.to_uppercase());
    }
    name
}
