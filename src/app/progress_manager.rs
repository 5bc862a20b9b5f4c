//! Progress bars for index enumeration and downloads.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta} remaining)";

/// Creates a counter bar with ETA, or a hidden bar when progress is disabled.
///
/// The length is set later by the caller once the total is known.
pub(crate) fn create_progress_bar(enabled: bool, message: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}
