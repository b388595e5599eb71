use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::bail;

/// git-annex prints this when an import target already exists in the
/// archive; it exits 1 but the batch should keep going.
const NOT_OVERWRITING: &str = "not overwriting existing";

/// Per-file import classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    SkippedExisting,
    Failed(String),
}

/// The external archive tool, as a typed collaborator.
///
/// `import` never panics or errors out-of-band: every failure mode is folded
/// into the returned classification at this boundary. `set_metadata` is
/// fallible per call; the tag writer decides what a failure means.
pub trait ArchiveTool {
    fn import(&self, staged: &Path) -> ImportOutcome;
    fn set_metadata(&self, file: &Path, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Real archive tool: `git-annex`, invoked with argument vectors (never a
/// shell string) from the archive root.
pub struct GitAnnex {
    archive_root: PathBuf,
}

impl GitAnnex {
    pub fn new(archive_root: PathBuf) -> Self {
        Self { archive_root }
    }
}

impl ArchiveTool for GitAnnex {
    fn import(&self, staged: &Path) -> ImportOutcome {
        let output = Command::new("git-annex")
            .arg("import")
            .arg(staged)
            .current_dir(&self.archive_root)
            .output();

        match output {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                classify_import(output.status.code(), &combined)
            }
            Err(e) => ImportOutcome::Failed(format!("failed to run git-annex: {}", e)),
        }
    }

    fn set_metadata(&self, file: &Path, key: &str, value: &str) -> anyhow::Result<()> {
        let output = Command::new("git")
            .args(["-c", "annex.alwayscommit=false", "annex", "metadata"])
            .arg(file)
            .arg("-s")
            .arg(format!("{}={}", key, value))
            .arg("--quiet")
            .current_dir(&self.archive_root)
            .output()?;

        if !output.status.success() {
            bail!(
                "git annex metadata exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Map a finished import invocation onto an outcome.
pub fn classify_import(exit_code: Option<i32>, output: &str) -> ImportOutcome {
    match exit_code {
        Some(0) => ImportOutcome::Imported,
        Some(1) if output.contains(NOT_OVERWRITING) => ImportOutcome::SkippedExisting,
        code => ImportOutcome::Failed(format!(
            "import exited with {:?}: {}",
            code,
            output.trim()
        )),
    }
}
