use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use serde_json::Value;

use crate::metadata::{self, Metadata};

/// The external metadata-extraction collaborator: one call per batch,
/// returning canonical metadata per input file in input order.
pub trait MetadataExtractor {
    fn extract(&self, sources: &[PathBuf]) -> anyhow::Result<Vec<Metadata>>;
}

/// Real extraction backend: `exiftool -j`, one invocation for the whole
/// batch (argument vector, no shell).
pub struct ExifTool;

impl ExifTool {
    /// Preflight: confirm exiftool is on PATH and return its version.
    pub fn check_available() -> anyhow::Result<String> {
        let output = Command::new("exiftool")
            .arg("-ver")
            .output()
            .context(
                "exiftool is not installed or not on PATH \
                 (Debian/Ubuntu: apt install libimage-exiftool-perl, \
                 macOS: brew install exiftool)",
            )?;
        if !output.status.success() {
            bail!("exiftool -ver failed");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MetadataExtractor for ExifTool {
    fn extract(&self, sources: &[PathBuf]) -> anyhow::Result<Vec<Metadata>> {
        let output = Command::new("exiftool")
            .arg("-j")
            .args(sources)
            .output()
            .context("failed to run exiftool")?;

        // exiftool exits non-zero when any single file is unreadable but
        // still emits records for the rest; only an unparseable stdout is
        // treated as an extraction failure.
        match parse_output(sources, &output.stdout) {
            Ok(records) => Ok(records),
            Err(e) if !output.status.success() => Err(e.context(format!(
                "exiftool exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) => Err(e),
        }
    }
}

/// Parse `exiftool -j` output and match records back to the input paths by
/// their `SourceFile` field. Files exiftool said nothing about get empty
/// metadata: every lookup resolves to "unknown" and the timestamp falls
/// back to mtime.
pub fn parse_output(sources: &[PathBuf], stdout: &[u8]) -> anyhow::Result<Vec<Metadata>> {
    let raw: Vec<serde_json::Map<String, Value>> = if stdout.iter().all(u8::is_ascii_whitespace) {
        Vec::new()
    } else {
        serde_json::from_slice(stdout).context("unparseable extraction output")?
    };

    let mut by_source: HashMap<String, Metadata> = HashMap::new();
    for record in &raw {
        let meta = metadata::normalize(record);
        if let Some(source) = meta.lookup("SourceFile") {
            by_source.insert(source.to_string(), meta);
        }
    }

    Ok(sources
        .iter()
        .map(|path| {
            by_source
                .remove(&path.to_string_lossy().into_owned())
                .or_else(|| by_source.remove(&*file_name(path)))
                .unwrap_or_default()
        })
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_matched_by_source_file() {
        let sources = vec![PathBuf::from("/in/a.jpg"), PathBuf::from("/in/b.jpg")];
        let stdout = br#"[
            {"SourceFile": "/in/b.jpg", "Model": "iPhone 4"},
            {"SourceFile": "/in/a.jpg", "CreateDate": "2019:05:09 15:47:33"}
        ]"#;

        let records = parse_output(&sources, stdout).unwrap();
        assert_eq!(records[0].get("CreateDate"), "2019:05:09 15:47:33");
        assert_eq!(records[1].get("Model"), "iPhone 4");
    }

    #[test]
    fn test_unlisted_file_gets_empty_metadata() {
        let sources = vec![PathBuf::from("/in/a.jpg"), PathBuf::from("/in/broken.jpg")];
        let stdout = br#"[{"SourceFile": "/in/a.jpg", "Model": "X100"}]"#;

        let records = parse_output(&sources, stdout).unwrap();
        assert_eq!(records[1].get("Model"), "unknown");
        assert!(records[1].is_empty());
    }

    #[test]
    fn test_empty_output_yields_empty_records() {
        let sources = vec![PathBuf::from("/in/a.jpg")];
        let records = parse_output(&sources, b"  \n").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_empty());
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        let sources = vec![PathBuf::from("/in/a.jpg")];
        assert!(parse_output(&sources, b"File not found\n").is_err());
    }
}
