use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use media_rescue_core::download::{DownloadEngine, Fetcher, RunOptions};
use media_rescue_core::index::{IndexFile, RecordStore};
use media_rescue_core::session::{
    Credentials, ServiceEndpoints, Session, SessionConfig, enumerate_media,
};
use tracing::{debug, info};

use super::config_runtime::{Mode, Settings, parse_cli_with_sources, resolve_settings};
use super::credentials::resolve_credentials;
use super::progress_manager::create_progress_bar;
use super::status_report::{format_run_summary, print_status, reset};
use super::terminal::{init_tracing, is_dumb_terminal, no_color_env_requested, should_show_progress};
use crate::app_config::load_default_file_config;

pub(crate) async fn run() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let (cli, cli_sources) = parse_cli_with_sources();
    let file_config = load_default_file_config()?;
    let settings = resolve_settings(cli, &cli_sources, file_config.as_ref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config > default (info)
    init_tracing(settings.default_log_level(), no_color_env_requested());
    debug!(?settings, config_loaded = file_config.is_some(), "settings resolved");

    let index = IndexFile::new(&settings.index_path);

    match settings.mode {
        Mode::Status => print_status(&index).await,
        Mode::Reset => {
            println!("Resetting...");
            reset(&index, &settings.media_dir).await?;
            println!("Done!");
            Ok(())
        }
        Mode::Run { retry_failed } => {
            let credentials = resolve_credentials(settings.email.clone())?;
            run_rescue(&settings, &index, &credentials, retry_failed).await
        }
    }
}

async fn run_rescue(
    settings: &Settings,
    index: &IndexFile,
    credentials: &Credentials,
    retry_failed: bool,
) -> Result<()> {
    // Validate engine settings before any network traffic
    let engine = DownloadEngine::new(settings.concurrency, settings.checkpoint_interval)?;
    let show_progress = should_show_progress(
        std::io::stderr().is_terminal(),
        settings.quiet,
        is_dumb_terminal(),
    );

    let endpoints = ServiceEndpoints::new(&settings.base_url)
        .with_context(|| format!("Invalid base URL '{}'", settings.base_url))?;
    let session_config = SessionConfig {
        connect_timeout_secs: settings.connect_timeout_secs,
        read_timeout_secs: settings.read_timeout_secs,
        retry: settings.login_retry.clone(),
        ..SessionConfig::new(endpoints)
    };

    info!("Signing in");
    let session = Session::login(&session_config, credentials)
        .await
        .context("Login failed")?;

    if index.exists() {
        info!(path = %index.path().display(), "Using saved media index");
    } else {
        info!("Fetching index of all media");
        let bar = create_progress_bar(show_progress, "Index");
        let records = enumerate_media(&session, &bar)
            .await
            .context("Failed to fetch the media index")?;
        bar.finish_and_clear();
        index
            .save(&records)
            .await
            .context("Failed to write the media index")?;
        info!(records = records.len(), path = %index.path().display(), "Media index saved");
    }

    let records = index
        .load()
        .await
        .context("Failed to read the media index")?;
    let store = RecordStore::new(records);
    let fetcher: Arc<dyn Fetcher> = Arc::new(session.fetcher()?);
    let options = RunOptions::new(&settings.media_dir, retry_failed);

    info!("Fetching pictures and videos");
    let bar = create_progress_bar(show_progress, "Media");
    let stats = engine
        .process_index(&store, index, fetcher, &options, &bar)
        .await
        .context("Download run aborted")?;
    bar.finish();

    print!("{}", format_run_summary(&stats));
    Ok(())
}
