//! CLI entry point for media-rescue.

use anyhow::Result;

mod app;
mod app_config;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    app::runtime::run().await
}
