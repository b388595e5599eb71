use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tempfile::TempDir;

use crate::media::MediaRecord;
use crate::runlog::RunLog;

enum StagingDir {
    /// Freshly created temp dir; removed on drop unless kept.
    Fresh(TempDir),
    /// Caller-supplied directory (or the archive root when staging is
    /// disabled); never removed by us.
    External(PathBuf),
}

/// Working directory holding renamed copies of the sources prior to import.
///
/// Staged files are complete and byte-identical to their source, or absent:
/// a failed copy is removed before the error is reported. Existing
/// destination paths are never overwritten.
pub struct StagingArea {
    dir: StagingDir,
    move_originals: bool,
}

impl StagingArea {
    /// Set up staging per configuration. With `use_staging` off, originals
    /// are moved straight into the archive root under their derived names
    /// and no isolation directory is created.
    pub fn new(
        use_staging: bool,
        staging_dir: Option<&Path>,
        archive_root: &Path,
    ) -> anyhow::Result<Self> {
        if !use_staging {
            return Ok(Self {
                dir: StagingDir::External(archive_root.to_path_buf()),
                move_originals: true,
            });
        }

        let dir = match staging_dir {
            Some(path) => {
                fs::create_dir_all(path)
                    .with_context(|| format!("cannot create staging dir {}", path.display()))?;
                StagingDir::External(path.to_path_buf())
            }
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("annex-ingest-")
                    .tempdir()
                    .context("cannot create staging directory")?;
                StagingDir::Fresh(tmp)
            }
        };

        Ok(Self {
            dir,
            move_originals: false,
        })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            StagingDir::Fresh(tmp) => tmp.path(),
            StagingDir::External(path) => path,
        }
    }

    /// Place the record's source at `<staging>/<derived_name>` and record
    /// the staged path. Fails without side effects beyond removing its own
    /// partial copy.
    pub fn stage(&self, record: &mut MediaRecord, log: &RunLog) -> anyhow::Result<()> {
        let dest = self.path().join(&record.derived_name);
        if dest.exists() {
            bail!(
                "refusing to overwrite existing staged file {}",
                dest.display()
            );
        }

        if self.move_originals {
            log.info(format!(
                "moving {} to {}",
                record.source_path.display(),
                dest.display()
            ));
            move_file(&record.source_path, &dest)?;
        } else {
            log.info(format!(
                "copying {} to {}",
                record.source_path.display(),
                dest.display()
            ));
            copy_verified(&record.source_path, &dest)?;
        }

        record.staged_path = Some(dest);
        Ok(())
    }

    /// Whether dropping this area would remove its directory.
    pub fn is_fresh(&self) -> bool {
        matches!(self.dir, StagingDir::Fresh(_))
    }

    /// Release a fresh directory from cleanup (kept for inspection or
    /// debugging). Returns the surviving path.
    pub fn keep(&mut self) -> PathBuf {
        let current = std::mem::replace(&mut self.dir, StagingDir::External(PathBuf::new()));
        let path = match current {
            StagingDir::Fresh(tmp) => tmp.into_path(),
            StagingDir::External(path) => path,
        };
        self.dir = StagingDir::External(path.clone());
        path
    }
}

/// Copy with size verification, preserving the source mtime. On any failure
/// the destination is removed so no partial file survives.
fn copy_verified(source: &Path, dest: &Path) -> anyhow::Result<()> {
    let result = (|| -> anyhow::Result<()> {
        let mut reader = fs::File::open(source)
            .with_context(|| format!("cannot open {}", source.display()))?;
        let mut writer = fs::File::create(dest)?;
        io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;

        let expected = fs::metadata(source)?.len();
        let written = fs::metadata(dest)?.len();
        if expected != written {
            bail!(
                "size mismatch staging {}: {} vs {} bytes",
                source.display(),
                expected,
                written
            );
        }

        if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified));
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

/// Rename, falling back to verified copy + delete across filesystems.
fn move_file(source: &Path, dest: &Path) -> anyhow::Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    copy_verified(source, dest)?;
    fs::remove_file(source)
        .with_context(|| format!("copied but could not remove {}", source.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use chrono::NaiveDate;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn record(source: &Path) -> MediaRecord {
        let ts = NaiveDate::from_ymd_opt(2019, 5, 9)
            .unwrap()
            .and_hms_opt(15, 47, 33)
            .unwrap();
        let name = crate::naming::derive_filename(&ts, source);
        MediaRecord::new(source.to_path_buf(), Metadata::default(), ts, name)
    }

    #[test]
    fn test_stage_copies_bytes_and_keeps_original() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_0001.jpg");
        File::create(&source).unwrap().write_all(b"jpeg bytes").unwrap();

        let staging = StagingArea::new(true, None, dir.path()).unwrap();
        let mut rec = record(&source);
        staging.stage(&mut rec, &RunLog::disabled()).unwrap();

        let staged = rec.staged_path.as_ref().unwrap();
        assert_eq!(fs::read(staged).unwrap(), b"jpeg bytes");
        assert!(source.exists());
    }

    #[test]
    fn test_stage_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("IMG_0001.jpg");
        File::create(&source).unwrap().write_all(b"x").unwrap();

        let staging = StagingArea::new(true, None, dir.path()).unwrap();
        let mut rec = record(&source);
        staging.stage(&mut rec, &RunLog::disabled()).unwrap();

        let mut again = record(&source);
        let err = staging.stage(&mut again, &RunLog::disabled()).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert!(again.staged_path.is_none());
        // The occupied file is untouched.
        assert_eq!(fs::read(rec.staged_path.unwrap()).unwrap(), b"x");
    }

    #[test]
    fn test_fresh_dir_removed_on_drop() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(true, None, dir.path()).unwrap();
        let staged_at = staging.path().to_path_buf();
        assert!(staged_at.exists());
        drop(staging);
        assert!(!staged_at.exists());
    }

    #[test]
    fn test_keep_survives_drop() {
        let dir = tempdir().unwrap();
        let mut staging = StagingArea::new(true, None, dir.path()).unwrap();
        let kept = staging.keep();
        drop(staging);
        assert!(kept.exists());
        fs::remove_dir_all(kept).unwrap();
    }

    #[test]
    fn test_external_dir_never_removed() {
        let dir = tempdir().unwrap();
        let external = dir.path().join("stage");
        let staging = StagingArea::new(true, Some(&external), dir.path()).unwrap();
        assert!(!staging.is_fresh());
        drop(staging);
        assert!(external.exists());
    }

    #[test]
    fn test_no_staging_moves_into_archive_root() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("annex");
        fs::create_dir(&archive).unwrap();
        let source = dir.path().join("IMG_0001.jpg");
        File::create(&source).unwrap().write_all(b"x").unwrap();

        let staging = StagingArea::new(false, None, &archive).unwrap();
        let mut rec = record(&source);
        staging.stage(&mut rec, &RunLog::disabled()).unwrap();

        assert!(!source.exists());
        assert_eq!(rec.staged_path.unwrap().parent().unwrap(), archive);
    }
}
