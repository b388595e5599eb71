use std::path::Path;

use chrono::Datelike;

use crate::annex::ArchiveTool;
use crate::geocode::{self, Geocoder, Place};
use crate::media::MediaRecord;
use crate::runlog::RunLog;

/// The only extracted fields ever written to the archive. Everything else
/// stays in memory for naming/tagging logic and never escapes.
pub const ALLOWED_KEYS: &[&str] = &[
    "CreateDate",
    "GPSLongitude",
    "GPSLongitudeRef",
    "GPSLatitude",
    "GPSLatitudeRef",
    "ImageDescription",
    "Model",
    "SourceFile",
    "GPSImgDirection",
    "GPSImgDirectionRef",
    "GPSAltitude",
    "GPSAltitudeRef",
];

/// Ordered key/value set for one record. Keys appear in allow-list order,
/// then the derived temporal keys, then place keys.
pub type TagSet = Vec<(String, String)>;

/// Build the filtered tag set for a record: allow-listed fields actually
/// present in its metadata, derived Year/Month/Day, and (when place lookup
/// ran) the place fields.
pub fn build_tag_set(record: &MediaRecord, place: Option<&Place>) -> TagSet {
    let mut tags = TagSet::new();

    for key in ALLOWED_KEYS {
        if let Some(value) = record.metadata.lookup(key) {
            tags.push((key.to_string(), sanitize_value(value)));
        }
    }

    let ts = &record.timestamp;
    tags.push(("Year".to_string(), ts.year().to_string()));
    tags.push(("Month".to_string(), ts.month().to_string()));
    tags.push(("Day".to_string(), ts.day().to_string()));

    if let Some(place) = place {
        tags.push(("PlaceCounty".to_string(), sanitize_value(&place.county)));
        tags.push(("PlaceState".to_string(), sanitize_value(&place.state)));
        tags.push(("PlaceCountry".to_string(), sanitize_value(&place.country)));
        tags.push(("PlaceLocality".to_string(), sanitize_value(&place.locality)));
    }

    tags
}

/// Tag values travel as single argv elements, so shell metacharacters are
/// inert; control characters are still replaced to keep the tool's own
/// parsing and the log file sane.
pub fn sanitize_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Counts from the tagging stage.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Records that went through tagging.
    pub tagged: u64,
    /// Individual key writes that failed (logged and skipped).
    pub failed_keys: u64,
}

/// Attach tags to one record the archive holds. Records the importer did
/// not land in the archive are left alone.
///
/// Each key is written independently; a failing key is logged and skipped
/// so it never blocks the remaining keys or files. Tags are enrichment,
/// not a correctness-critical write.
pub fn tag_record(
    record: &MediaRecord,
    tool: &dyn ArchiveTool,
    geocoder: Option<&dyn Geocoder>,
    log: &RunLog,
) -> TagStats {
    let mut stats = TagStats::default();
    if !record.in_archive() {
        return stats;
    }

    let place = geocoder.map(|g| geocode::resolve_place(&record.metadata, g, log));
    let tags = build_tag_set(record, place.as_ref());

    // The imported file sits under its derived name in the archive root.
    let target = Path::new(&record.derived_name);
    for (key, value) in &tags {
        log.debug(format!("setting {}={} on {}", key, value, target.display()));
        if let Err(e) = tool.set_metadata(target, key, value) {
            // Fine-grained only: a failed tag write never surfaces as an
            // overall failure, the summary just counts it.
            log.debug(format!(
                "tag write {} on {} failed: {}",
                key,
                target.display(),
                e
            ));
            stats.failed_keys += 1;
        }
    }
    stats.tagged = 1;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annex::ImportOutcome;
    use crate::metadata::{Metadata, UNKNOWN};
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::path::PathBuf;

    fn record_with(keys: &[(&str, &str)]) -> MediaRecord {
        let mut meta = Metadata::default();
        for (k, v) in keys {
            meta.insert(k, v);
        }
        let ts = NaiveDate::from_ymd_opt(2019, 5, 9)
            .unwrap()
            .and_hms_opt(15, 47, 33)
            .unwrap();
        let mut rec = MediaRecord::new(
            PathBuf::from("/in/IMG_1234.JPG"),
            meta,
            ts,
            "2019-05-09_15-47-33_IMG_1234.JPG".to_string(),
        );
        rec.staged_path = Some(PathBuf::from("/stage/2019-05-09_15-47-33_IMG_1234.JPG"));
        rec.outcome = Some(ImportOutcome::Imported);
        rec
    }

    #[test]
    fn test_only_allow_listed_keys_plus_derived() {
        let rec = record_with(&[
            ("CreateDate", "2019:05:09 15:47:33"),
            ("Model", "iPhone 4"),
            ("ExifToolVersion", "12.0"),
            ("FilePermissions", "rw-r--r--"),
        ]);
        let tags = build_tag_set(&rec, None);
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(keys, vec!["CreateDate", "Model", "Year", "Month", "Day"]);
        assert!(tags.contains(&("Year".to_string(), "2019".to_string())));
        assert!(tags.contains(&("Month".to_string(), "5".to_string())));
        assert!(tags.contains(&("Day".to_string(), "9".to_string())));
    }

    #[test]
    fn test_place_fields_appended_when_resolved() {
        let rec = record_with(&[]);
        let place = Place {
            county: "Anglesey".into(),
            state: "Wales".into(),
            country: "United Kingdom".into(),
            locality: UNKNOWN.into(),
        };
        let tags = build_tag_set(&rec, Some(&place));
        assert!(tags.contains(&("PlaceCounty".to_string(), "Anglesey".to_string())));
        assert!(tags.contains(&("PlaceLocality".to_string(), UNKNOWN.to_string())));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_value("line\nbreak\ttab"), "line break tab");
        assert_eq!(sanitize_value("  padded  "), "padded");
        // Shell metacharacters are data, not syntax.
        assert_eq!(sanitize_value("a;rm -rf $(x)`y`"), "a;rm -rf $(x)`y`");
    }

    /// Tool that rejects one key and records every attempted write.
    struct OneBadKey {
        bad: &'static str,
        written: RefCell<Vec<String>>,
    }

    impl ArchiveTool for OneBadKey {
        fn import(&self, _staged: &std::path::Path) -> ImportOutcome {
            ImportOutcome::Imported
        }

        fn set_metadata(
            &self,
            _file: &std::path::Path,
            key: &str,
            _value: &str,
        ) -> anyhow::Result<()> {
            self.written.borrow_mut().push(key.to_string());
            if key == self.bad {
                anyhow::bail!("tool rejected {}", key);
            }
            Ok(())
        }
    }

    #[test]
    fn test_one_bad_key_does_not_block_the_rest() {
        let rec = record_with(&[
            ("CreateDate", "2019:05:09 15:47:33"),
            ("Model", "iPhone 4"),
        ]);
        let tool = OneBadKey {
            bad: "CreateDate",
            written: RefCell::new(Vec::new()),
        };

        let stats = tag_record(&rec, &tool, None, &RunLog::disabled());

        assert_eq!(stats.tagged, 1);
        assert_eq!(stats.failed_keys, 1);
        // All remaining keys were still attempted after the failure.
        let written = tool.written.borrow();
        assert_eq!(
            written.as_slice(),
            ["CreateDate", "Model", "Year", "Month", "Day"]
        );
    }

    #[test]
    fn test_only_archived_records_are_tagged() {
        let tool = OneBadKey {
            bad: "",
            written: RefCell::new(Vec::new()),
        };

        let mut failed = record_with(&[]);
        failed.outcome = Some(ImportOutcome::Failed("boom".into()));
        assert_eq!(tag_record(&failed, &tool, None, &RunLog::disabled()).tagged, 0);

        let mut pending = record_with(&[]);
        pending.outcome = None;
        assert_eq!(tag_record(&pending, &tool, None, &RunLog::disabled()).tagged, 0);
        assert!(tool.written.borrow().is_empty());

        // Re-runs re-tag files already in the archive.
        let mut skipped = record_with(&[]);
        skipped.outcome = Some(ImportOutcome::SkippedExisting);
        assert_eq!(tag_record(&skipped, &tool, None, &RunLog::disabled()).tagged, 1);
    }
}
