//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use media_rescue_core::download::{
    DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CONCURRENCY, DEFAULT_MEDIA_DIR,
};
use media_rescue_core::index::DEFAULT_INDEX_PATH;
use media_rescue_core::session::DEFAULT_BASE_URL;

/// Rescue a media library from a web service before it shuts down.
///
/// Logs in, enumerates every photo and video in the account, and downloads
/// the originals to a local directory. Progress is checkpointed, so the tool
/// can be interrupted and re-run; finished items are never fetched twice.
#[derive(Parser, Debug)]
#[command(name = "media-rescue")]
#[command(author, version, about)]
pub struct Cli {
    /// Retry items that failed in an earlier run
    #[arg(long)]
    pub retry: bool,

    /// Print the status of the saved index and exit (no login)
    #[arg(long, conflicts_with_all = ["reset", "retry"])]
    pub status: bool,

    /// Delete the saved index and media directory, then exit
    #[arg(long, conflicts_with = "retry")]
    pub reset: bool,

    /// Directory that receives downloaded media
    #[arg(long, value_name = "DIR", default_value = DEFAULT_MEDIA_DIR)]
    pub media_dir: PathBuf,

    /// Path of the JSON index checkpoint
    #[arg(long, value_name = "FILE", default_value = DEFAULT_INDEX_PATH)]
    pub index_path: PathBuf,

    /// Maximum concurrent downloads (1-100)
    #[arg(
        short = 'c',
        long,
        default_value_t = DEFAULT_CONCURRENCY as u8,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub concurrency: u8,

    /// Downloads started between index checkpoints (1-10000)
    #[arg(
        long,
        default_value_t = DEFAULT_CHECKPOINT_INTERVAL as u32,
        value_parser = clap::value_parser!(u32).range(1..=10_000)
    )]
    pub checkpoint_interval: u32,

    /// Root URL of the media service
    #[arg(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Account email (otherwise MEDIA_RESCUE_EMAIL or a prompt)
    #[arg(long)]
    pub email: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
