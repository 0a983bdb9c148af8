//! Content sources upload CLI entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Upload files to content sources, resuming whatever the server already has.
#[derive(Debug, Parser)]
#[command(name = "content-sources-upload", version, about)]
pub struct Args {
    /// Files to upload.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Configuration file (defaults to the per-user location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Content sources API root.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Repository to attach the uploads to once all of them are stored.
    #[arg(long)]
    pub repository: Option<String>,

    /// Small files uploaded together, and chunks per wave.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Retries per chunk before a file is marked failed.
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl Args {
    /// Applies command line overrides on top of the file configuration.
    fn apply(&self, mut config: config::Config) -> config::Config {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.max_retries {
            config.max_retry_count = n;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    let config = args.apply(config);
    tracing::info!(base_url = %config.base_url, files = args.files.len(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(args, config))
}
