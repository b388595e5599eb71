use anyhow::bail;
use indicatif::{ProgressBar, ProgressStyle};

use crate::annex::{ArchiveTool, ImportOutcome};
use crate::media::MediaRecord;
use crate::runlog::RunLog;

/// Hand each staged file to the archive tool, one invocation per file, in
/// input order. `on_archived` fires as soon as a file is in the archive
/// (imported or already present), before the next file's import is
/// attempted; the pipeline hangs tagging off it.
///
/// `SkippedExisting` is warned about and the batch continues; re-runs rely
/// on this to converge. An unclassified failure aborts immediately: nothing
/// after the failing file reaches the tool, and the error propagates so the
/// run is reported as failed. Per-file invocation (rather than one bulk
/// call) is what makes this attribution possible.
pub fn import_batch(
    records: &mut [MediaRecord],
    tool: &dyn ArchiveTool,
    log: &RunLog,
    mut on_archived: impl FnMut(&MediaRecord),
) -> anyhow::Result<()> {
    let total = records.iter().filter(|r| r.staged_path.is_some()).count();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} importing")
            .unwrap(),
    );

    for record in records.iter_mut() {
        let Some(staged) = record.staged_path.clone() else {
            continue;
        };

        log.info(format!("importing {}", staged.display()));
        let outcome = tool.import(&staged);
        pb.inc(1);

        match &outcome {
            ImportOutcome::Imported => log.info("- success"),
            ImportOutcome::SkippedExisting => {
                log.warn(format!("skipping existing file {}", record.derived_name));
            }
            ImportOutcome::Failed(reason) => {
                log.error(format!("error importing {}: {}", staged.display(), reason));
                log.info("stopping import");
                let reason = reason.clone();
                record.outcome = Some(outcome);
                pb.finish_and_clear();
                bail!("import failed for {}: {}", staged.display(), reason);
            }
        }
        record.outcome = Some(outcome);
        on_archived(record);
    }

    pb.finish_and_clear();
    Ok(())
}
