mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tubesync::{ChannelId, SyncOptions, Synchronizer};
use tubesync_store::CatalogStore;
use tubesync_youtube::{YouTubeSource, YouTubeSourceConfig};

use crate::config::{API_KEY_ENV, AppConfig};

#[derive(Parser)]
#[command(name = "tubesync")]
#[command(about = "Mirror a YouTube channel's catalog into a local SQLite database")]
struct Cli {
    /// Log page-level progress (same as RUST_LOG=tubesync=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a channel's uploads from YouTube and store them locally
    Sync {
        /// Channel id (defaults to `channel_id` from the config file)
        #[arg(long)]
        channel: Option<String>,
        /// Also sync the channel's other playlists
        #[arg(long)]
        playlists: bool,
    },
    /// Show a stored channel
    Channel {
        /// Channel id, or handle starting with `@`
        id: String,
    },
    /// List the stored playlists of a channel
    Playlists {
        /// Channel id
        channel_id: String,
    },
    /// List the stored videos of a playlist, in playlist order
    Videos {
        /// Playlist id
        playlist_id: String,
        /// Show at most this many videos
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show row counts of the local database
    Stats,
}

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("tubesync=debug,tubesync_youtube=debug,tubesync_store=debug")
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("tubesync=info"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(base.join("tubesync"))
}

fn db_path(config: &AppConfig) -> Result<PathBuf> {
    let path = match &config.database_path {
        Some(path) => path.clone(),
        None => cache_dir()?.join("catalog.db"),
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(path)
}

fn build_store(config: &AppConfig) -> Result<CatalogStore> {
    let path = db_path(config)?;
    CatalogStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

fn build_source(config: &AppConfig) -> Result<YouTubeSource> {
    let api_key = config.api_key().with_context(|| {
        format!("no API key: set {API_KEY_ENV} or `api_key` in the config file")
    })?;

    Ok(YouTubeSource::new(YouTubeSourceConfig {
        api_key,
        api_base_url: config.api_base_url.clone(),
        page_size: config.page_size(),
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app_config = config::load_config();
    let store = Arc::new(build_store(&app_config)?);

    match cli.command {
        Command::Sync { channel, playlists } => {
            let channel_id = channel
                .or_else(|| app_config.channel_id.clone())
                .map(ChannelId::new)
                .context("no channel given: pass --channel or set `channel_id` in the config file")?;

            let options = SyncOptions {
                include_playlists: playlists || app_config.include_playlists,
                ..SyncOptions::default()
            };
            let sync = Synchronizer::new(build_source(&app_config)?, Arc::clone(&store))
                .with_options(options)
                .with_walker(app_config.walker());

            commands::sync::run(&sync, &channel_id).await?;
            Ok(())
        }
        Command::Channel { id } => commands::channel::run(&*store, &id).await,
        Command::Playlists { channel_id } => {
            commands::playlists::run(&*store, &channel_id).await
        }
        Command::Videos { playlist_id, limit } => {
            commands::videos::run(&*store, &playlist_id, limit).await
        }
        Command::Stats => commands::stats::run(&store),
    }
}
