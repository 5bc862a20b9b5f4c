//! `--status` and `--reset` handling, plus the end-of-run summary.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use media_rescue_core::{DownloadStats, IndexFile, IndexSummary};
use tracing::info;

/// Renders the per-status breakdown of a saved index.
pub(crate) fn format_status_report(summary: &IndexSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status for fetching");
    let _ = writeln!(out, "-----------------------------");
    let _ = writeln!(out, "Succeeded: {}", summary.done);
    let _ = writeln!(out, "Failed:    {}", summary.failed);
    let _ = writeln!(out, "Fetching:  {}", summary.in_progress);
    let _ = writeln!(out, "Waiting:   {}", summary.pending);
    let _ = writeln!(out, "Total:     {}", summary.total());
    out
}

/// Renders the tally printed after a run.
pub(crate) fn format_run_summary(stats: &DownloadStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Done trying to fetch all pictures and videos.");
    let _ = writeln!(out, "Result:");
    let _ = writeln!(out, "\tSuccess: {}", stats.success());
    let _ = writeln!(out, "\tFailed:  {}", stats.fails());
    out
}

/// Loads the saved index and prints its status report.
pub(crate) async fn print_status(index: &IndexFile) -> Result<()> {
    let records = index.load().await.context("Cannot report status")?;
    print!("{}", format_status_report(&IndexSummary::from_records(&records)));
    Ok(())
}

/// What `--reset` removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResetOutcome {
    pub(crate) index_removed: bool,
    pub(crate) media_removed: bool,
}

/// Deletes the index checkpoint and the media directory.
pub(crate) async fn reset(index: &IndexFile, media_dir: &Path) -> Result<ResetOutcome> {
    let index_removed = index.remove().await.context("Failed to remove index")?;

    let media_removed = match tokio::fs::remove_dir_all(media_dir).await {
        Ok(()) => true,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
        Err(error) => {
            return Err(error).with_context(|| {
                format!("Failed to remove media directory '{}'", media_dir.display())
            });
        }
    };

    info!(index_removed, media_removed, "reset complete");
    Ok(ResetOutcome {
        index_removed,
        media_removed,
    })
}
