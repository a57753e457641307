use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod error;
mod helpers;
mod listing_structs;
mod metadata;
mod reso;
mod run;
mod substitution;

use crate::client::HttpResoClient;
use crate::config::Settings;
use crate::run::Replicator;

/// Replicates RESO Web API listings into local JSON snapshots.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Settings file (TOML), overridden by RESO__* environment variables
    #[arg(short, long, default_value = "config/replicator.toml")]
    config: String,

    /// Records per request (1-1000); prompted for when not set anywhere
    #[arg(short, long)]
    page_size: Option<u32>,

    /// Directory holding listings.json, last_updated.txt and update files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Run an initial replication even if listings.json exists
    #[arg(long)]
    force_initial: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut settings = Settings::new(&args.config)
        .with_context(|| format!("loading settings from {}", args.config))?;
    if let Some(data_dir) = args.data_dir {
        settings.replication.data_dir = data_dir;
    }

    let page_size = match args.page_size.or(settings.replication.page_size) {
        Some(size) => helpers::validate_page_size(size)?,
        None => helpers::prompt_page_size(io::stdin().lock(), io::stdout())?,
    };

    let client = HttpResoClient::new(&settings.api).context("building API client")?;

    let report = Replicator::new(&client, &settings.replication, page_size)
        .force_initial(args.force_initial)
        .run()
        .await
        .context("replication run failed")?;

    info!(
        mode = %report.mode,
        records = report.records,
        watermark = %report.watermark,
        "Wrote {}",
        report.output.display()
    );

    Ok(())
}
