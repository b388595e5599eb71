use std::path::PathBuf;

use clap::Parser;

use annex_ingest_core::geocode::Geocoder;
use annex_ingest_core::runlog::RunLog;
use annex_ingest_core::{ExifTool, GitAnnex, Nominatim, ProcessOptions};

#[derive(Parser)]
#[command(
    name = "annex-ingest",
    version,
    about = "Import photos and videos into a git-annex archive under capture-time names"
)]
struct Cli {
    /// Destination git-annex repository
    archive: PathBuf,

    /// Source media files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Stage into this directory instead of a fresh temporary one
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Move originals into the archive instead of staging copies
    #[arg(long)]
    no_staging: bool,

    /// Resolve GPS coordinates to place tags via reverse geocoding
    #[arg(long)]
    places: bool,

    /// Keep the staging directory after the run
    #[arg(long)]
    keep_staging: bool,

    /// Append run events to this file
    #[arg(long, default_value = "annex-ingest.log")]
    log_file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let version = ExifTool::check_available()?;
    eprintln!("Found exiftool {}", version);

    let log = RunLog::to_file(&cli.log_file)?;
    let options = ProcessOptions {
        archive_root: cli.archive.clone(),
        sources: cli.files,
        use_staging: !cli.no_staging,
        staging_dir: cli.staging_dir,
        keep_staging: cli.keep_staging,
    };

    let tool = GitAnnex::new(cli.archive);
    let geocoder = cli.places.then(Nominatim::new);

    let result = annex_ingest_core::process(
        &options,
        &ExifTool,
        &tool,
        geocoder.as_ref().map(|g| g as &dyn Geocoder),
        &log,
    )?;

    eprintln!(
        "Done! {} imported, {} already present, {} dropped, {} tag write(s) failed ({:.2}s)",
        result.imported,
        result.skipped_existing,
        result.dropped,
        result.failed_keys,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
