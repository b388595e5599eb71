pub mod annex;
pub mod exiftool;
pub mod geocode;
pub mod import;
pub mod media;
pub mod metadata;
pub mod naming;
pub mod runlog;
pub mod staging;
pub mod tags;
pub mod timestamp;

use std::path::PathBuf;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};

use annex::ArchiveTool;
use exiftool::MetadataExtractor;
use geocode::Geocoder;
use media::MediaRecord;
use runlog::RunLog;
use staging::StagingArea;

pub use annex::{GitAnnex, ImportOutcome};
pub use exiftool::ExifTool;
pub use geocode::Nominatim;

/// Configuration for one pipeline run. Built by the caller (the CLI, a
/// test); nothing in the core reads ambient state.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Destination archive repository root.
    pub archive_root: PathBuf,
    /// Source media files, in import order.
    pub sources: Vec<PathBuf>,
    /// Stage renamed copies before import. When off, originals are moved
    /// into the archive root instead.
    pub use_staging: bool,
    /// Use this directory for staging instead of a fresh temporary one.
    pub staging_dir: Option<PathBuf>,
    /// Keep the staging directory after a successful run.
    pub keep_staging: bool,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub total: u64,
    /// Files dropped for per-file recoverable errors (unresolvable
    /// timestamp, staging failure).
    pub dropped: u64,
    pub imported: u64,
    pub skipped_existing: u64,
    /// Records that went through tagging.
    pub tagged: u64,
    /// Individual tag key writes that failed.
    pub failed_keys: u64,
}

/// Run the full pipeline: extract, resolve timestamps, derive names,
/// stage, import, tag.
///
/// Per-file errors before import drop that file and continue. An
/// unclassified import failure aborts the batch, keeps the staging
/// directory for inspection, and surfaces as the returned error. Place
/// lookup runs iff a geocoder is supplied.
pub fn process(
    options: &ProcessOptions,
    extractor: &dyn MetadataExtractor,
    tool: &dyn ArchiveTool,
    geocoder: Option<&dyn Geocoder>,
    log: &RunLog,
) -> anyhow::Result<ProcessResult> {
    if options.sources.is_empty() {
        bail!("no input files given");
    }
    if !options.archive_root.is_dir() {
        bail!(
            "archive path {} is not a directory",
            options.archive_root.display()
        );
    }

    for source in &options.sources {
        if !looks_like_media(source) {
            log.warn(format!(
                "{} does not look like a media file; processing anyway",
                source.display()
            ));
        }
    }

    let mut result = ProcessResult {
        total: options.sources.len() as u64,
        ..Default::default()
    };

    // Stage 1: one extraction call for the whole batch.
    log.info(format!(
        "extracting metadata for {} file(s)",
        options.sources.len()
    ));
    let extracted = extractor
        .extract(&options.sources)
        .context("metadata extraction failed")?;

    // Stage 2: resolve timestamps and derive destination names.
    let mut records: Vec<MediaRecord> = Vec::with_capacity(options.sources.len());
    for (source, meta) in options.sources.iter().zip(extracted) {
        match timestamp::resolve(&meta, source) {
            Ok(ts) => {
                let name = naming::derive_filename(&ts, source);
                records.push(MediaRecord::new(source.clone(), meta, ts, name));
            }
            Err(e) => {
                log.error(format!("skipping {}: {}", source.display(), e));
                result.dropped += 1;
            }
        }
    }
    if records.is_empty() {
        bail!("no importable files in batch");
    }

    // Stage 3: stage the whole batch up front.
    let mut staging = StagingArea::new(
        options.use_staging,
        options.staging_dir.as_deref(),
        &options.archive_root,
    )?;
    log.info(format!("staging into {}", staging.path().display()));

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} staging")
            .unwrap(),
    );
    for record in &mut records {
        if let Err(e) = staging.stage(record, log) {
            log.error(format!(
                "skipping {}: {}",
                record.source_path.display(),
                e
            ));
            result.dropped += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    // Stage 4: sequential import with per-file tagging. Each file is in
    // the archive and tagged before the next file's import is attempted;
    // unclassified failures abort the batch.
    let mut stats = tags::TagStats::default();
    let import_result = import::import_batch(&mut records, tool, log, |record| {
        let s = tags::tag_record(record, tool, geocoder, log);
        stats.tagged += s.tagged;
        stats.failed_keys += s.failed_keys;
    });
    count_outcomes(&records, &mut result);
    result.tagged = stats.tagged;
    result.failed_keys = stats.failed_keys;

    if let Err(e) = import_result {
        if staging.is_fresh() {
            let kept = staging.keep();
            log.error(format!(
                "aborting batch; staging directory kept at {}",
                kept.display()
            ));
        }
        return Err(e);
    }

    if options.keep_staging && staging.is_fresh() {
        let kept = staging.keep();
        log.info(format!("keeping staging directory {}", kept.display()));
    }

    log.info(format!(
        "done: {} imported, {} already present, {} dropped, {} tag write(s) failed",
        result.imported, result.skipped_existing, result.dropped, result.failed_keys
    ));
    Ok(result)
}

fn count_outcomes(records: &[MediaRecord], result: &mut ProcessResult) {
    for record in records {
        match record.outcome {
            Some(ImportOutcome::Imported) => result.imported += 1,
            Some(ImportOutcome::SkippedExisting) => result.skipped_existing += 1,
            _ => {}
        }
    }
}

fn looks_like_media(path: &std::path::Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| {
            mime.type_() == mime_guess::mime::IMAGE || mime.type_() == mime_guess::mime::VIDEO
        })
}
