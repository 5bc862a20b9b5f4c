//! Application runtime composition modules.

pub(crate) mod config_runtime;
pub(crate) mod credentials;
pub(crate) mod progress_manager;
pub(crate) mod runtime;
pub(crate) mod status_report;
pub(crate) mod terminal;
