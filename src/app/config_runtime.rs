use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use media_rescue_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use media_rescue_core::session::{
    DEFAULT_LOGIN_MAX_ATTEMPTS, DEFAULT_LOGIN_RETRY_DELAY, RetryPolicy,
};

use crate::app_config::{FileConfig, VerbositySetting};
use crate::cli::Cli;

/// Which flags were given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) media_dir: bool,
    pub(crate) index_path: bool,
    pub(crate) concurrency: bool,
    pub(crate) checkpoint_interval: bool,
    pub(crate) base_url: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

/// What the invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Run { retry_failed: bool },
    Status,
    Reset,
}

/// Effective settings after layering defaults, config file and CLI flags.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) mode: Mode,
    pub(crate) media_dir: PathBuf,
    pub(crate) index_path: PathBuf,
    pub(crate) concurrency: usize,
    pub(crate) checkpoint_interval: usize,
    pub(crate) base_url: String,
    pub(crate) email: Option<String>,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
    pub(crate) login_retry: RetryPolicy,
    pub(crate) verbose: u8,
    pub(crate) quiet: bool,
}

impl Settings {
    /// Tracing filter used when `RUST_LOG` is not set.
    pub(crate) fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let command = Cli::command();
    let matches = command.get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = sources_from_matches(&matches);
    (cli, sources)
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        media_dir: is_commandline_value(matches, "media_dir"),
        index_path: is_commandline_value(matches, "index_path"),
        concurrency: is_commandline_value(matches, "concurrency"),
        checkpoint_interval: is_commandline_value(matches, "checkpoint_interval"),
        base_url: is_commandline_value(matches, "base_url"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Layers the config file under explicitly given CLI flags.
pub(crate) fn resolve_settings(
    cli: Cli,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<Settings> {
    let mode = if cli.status {
        Mode::Status
    } else if cli.reset {
        Mode::Reset
    } else {
        Mode::Run {
            retry_failed: cli.retry,
        }
    };

    let mut settings = Settings {
        mode,
        media_dir: cli.media_dir,
        index_path: cli.index_path,
        concurrency: usize::from(cli.concurrency),
        checkpoint_interval: cli.checkpoint_interval as usize,
        base_url: cli.base_url,
        email: cli.email,
        connect_timeout_secs: CONNECT_TIMEOUT_SECS,
        read_timeout_secs: READ_TIMEOUT_SECS,
        login_retry: RetryPolicy::new(DEFAULT_LOGIN_MAX_ATTEMPTS, DEFAULT_LOGIN_RETRY_DELAY),
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Some(file_config) = file_config {
        apply_file_config(&mut settings, cli_sources, file_config);
    }

    if !(1..=100).contains(&settings.concurrency) {
        bail!(
            "Invalid effective concurrency value: {}. Expected range: 1..=100",
            settings.concurrency
        );
    }
    if !(1..=10_000).contains(&settings.checkpoint_interval) {
        bail!(
            "Invalid effective checkpoint_interval value: {}. Expected range: 1..=10000",
            settings.checkpoint_interval
        );
    }

    Ok(settings)
}

fn apply_file_config(
    settings: &mut Settings,
    cli_sources: &CliValueSources,
    file_config: &FileConfig,
) {
    if !cli_sources.media_dir
        && let Some(media_dir) = &file_config.media_dir
    {
        settings.media_dir = media_dir.clone();
    }

    if !cli_sources.index_path
        && let Some(index_path) = &file_config.index_path
    {
        settings.index_path = index_path.clone();
    }

    if !cli_sources.concurrency
        && let Some(concurrency) = file_config.concurrency
    {
        settings.concurrency = usize::from(concurrency);
    }

    if !cli_sources.checkpoint_interval
        && let Some(interval) = file_config.checkpoint_interval
    {
        settings.checkpoint_interval = interval as usize;
    }

    if !cli_sources.base_url
        && let Some(base_url) = &file_config.base_url
    {
        settings.base_url = base_url.clone();
    }

    if !cli_sources.verbose
        && !cli_sources.quiet
        && let Some(verbosity) = file_config.verbosity
    {
        apply_config_verbosity(settings, verbosity);
    }

    if let Some(secs) = file_config.connect_timeout_secs {
        settings.connect_timeout_secs = secs;
    }
    if let Some(secs) = file_config.read_timeout_secs {
        settings.read_timeout_secs = secs;
    }

    let attempts = file_config
        .login_max_attempts
        .unwrap_or(settings.login_retry.max_attempts());
    let delay = file_config
        .login_retry_delay_secs
        .map_or(settings.login_retry.delay(), Duration::from_secs);
    settings.login_retry = RetryPolicy::new(attempts, delay);
}

fn apply_config_verbosity(settings: &mut Settings, verbosity: VerbositySetting) {
    match verbosity {
        VerbositySetting::Default => {
            settings.quiet = false;
            settings.verbose = 0;
        }
        VerbositySetting::Verbose | VerbositySetting::Debug => {
            settings.quiet = false;
            settings.verbose = 1;
        }
        VerbositySetting::Quiet => {
            settings.quiet = true;
            settings.verbose = 0;
        }
    }
}
