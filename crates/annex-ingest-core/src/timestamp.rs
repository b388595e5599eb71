use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDateTime};

use crate::metadata::Metadata;

/// Capture dates are written as `YYYY:MM:DD HH:MM:SS`, local time as-is.
const CAPTURE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Parse a capture-date field value against the fixed format.
/// Sub-second and timezone suffixes (`2019:05:09 15:47:33.123+02:00`) are
/// ignored; anything not matching the 19-character prefix is rejected.
pub fn parse_capture_datetime(value: &str) -> Option<NaiveDateTime> {
    let prefix = value.get(..19)?;
    NaiveDateTime::parse_from_str(prefix, CAPTURE_FORMAT).ok()
}

/// Resolve the authoritative capture timestamp for one file.
///
/// Fallback chain: `CreateDate` metadata, then the file's mtime. A failing
/// stat is an error for this file alone; the caller reports it and drops
/// the file from the batch.
pub fn resolve(metadata: &Metadata, source_path: &Path) -> anyhow::Result<NaiveDateTime> {
    if let Some(dt) = parse_capture_datetime(metadata.get("CreateDate")) {
        return Ok(dt);
    }

    let modified = std::fs::metadata(source_path)
        .and_then(|m| m.modified())
        .with_context(|| {
            format!(
                "no capture date and no readable mtime for {}",
                source_path.display()
            )
        })?;

    Ok(DateTime::<Local>::from(modified).naive_local())
}
