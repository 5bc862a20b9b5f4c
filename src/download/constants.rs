//! Constants for the download module (timeouts, thresholds, cadence).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout (5 minutes between body chunks).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Smallest body accepted as a real media file.
///
/// Anything shorter is treated as a truncated transfer or an error page.
pub const MIN_MEDIA_BYTES: u64 = 1000;

/// Default number of simultaneous download workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default number of admitted records between mid-run checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

/// Default directory that receives downloaded media.
pub const DEFAULT_MEDIA_DIR: &str = "media";
