//! trackcache CLI
//!
//! Operator tool for inspecting and maintaining the local library cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          trackcache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Config    │───▶│ LibraryCache │───▶│ CacheService │       │
//! │  │ (YAML + CLI) │    │  (commands)  │    │   (tiers)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trackcache::{Artist, CacheConfig, LibraryCache, Track};

// =============================================================================
// CLI Arguments
// =============================================================================

/// trackcache - Multi-tier local cache for music library data
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    after_help = "Without --data-dir (or a data_dir in the config file) the cache is memory only and nothing survives the process."
)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "TRACKCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the durable tiers [default: none, memory only]
    #[arg(long, env = "TRACKCACHE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Disable durable tiers (memory only)
    #[arg(long, env = "TRACKCACHE_NO_DURABLE", conflicts_with = "data_dir")]
    no_durable: bool,

    /// Track collection TTL in seconds
    #[arg(long, env = "TRACKCACHE_TRACK_TTL_SECS")]
    track_ttl_secs: Option<u64>,

    /// Artist metadata TTL in seconds
    #[arg(long, env = "TRACKCACHE_ARTIST_TTL_SECS")]
    artist_ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show active tier, entry counts and counters
    Stats {
        #[arg(long, value_enum, default_value_t = StatsFormat::Text)]
        format: StatsFormat,
    },
    /// Per-user track collections
    Tracks {
        #[command(subcommand)]
        action: TracksAction,
    },
    /// Shared artist metadata
    Artists {
        #[command(subcommand)]
        action: ArtistsAction,
    },
    /// Drop cached track collections (or everything with --all)
    Clear {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TracksAction {
    /// Print a user's cached tracks (null on miss)
    Get { user_id: String },
    /// Cache tracks from a JSON array file
    Put { user_id: String, file: PathBuf },
    /// Drop a user's cached tracks
    Invalidate { user_id: String },
}

#[derive(Subcommand, Debug)]
enum ArtistsAction {
    /// Look up artists and report which ids still need fetching
    Get {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Cache artists from a JSON array file
    Put { file: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StatsFormat {
    Text,
    Json,
    Prometheus,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;
    debug!(?config, "Loaded configuration");

    let cache = LibraryCache::from_config(&config);
    cache.init().await;
    info!(
        tier = cache.service().active_storage_name(),
        "Cache ready"
    );

    match args.command {
        Command::Stats { format } => print_stats(&cache, format).await?,
        Command::Tracks { action } => run_tracks(&cache, action).await?,
        Command::Artists { action } => run_artists(&cache, action).await?,
        Command::Clear { all } => {
            let cleared = if all {
                cache.wipe().await
            } else {
                cache.clear_all_caches().await
            };
            print_json(&serde_json::json!({ "cleared": cleared, "all": all }))?;
        }
    }

    cache.service().flush().await;
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CacheConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if args.no_durable {
        config.storage.data_dir = None;
    }
    if let Some(secs) = args.track_ttl_secs {
        config.ttl.tracks = Duration::from_secs(secs);
    }
    if let Some(secs) = args.artist_ttl_secs {
        config.ttl.artists = Duration::from_secs(secs);
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

// =============================================================================
// Commands
// =============================================================================

async fn print_stats(cache: &LibraryCache, format: StatsFormat) -> Result<()> {
    let stats = cache.stats().await;
    let service = cache.service();

    match format {
        StatsFormat::Text => {
            println!("storage:        {}", stats.storage_type);
            println!("track entries:  {}", stats.track_cache_count);
            println!("artist entries: {}", stats.artist_cache_count);
            println!("track ttl:      {}s", stats.track_ttl.as_secs());
            println!("artist ttl:     {}s", stats.artist_ttl.as_secs());
            for (tier, adapter) in service.adapter_stats() {
                println!(
                    "tier {:<10} reads={} writes={} deletes={} purged={} transactions={}",
                    tier,
                    adapter.reads,
                    adapter.writes,
                    adapter.deletes,
                    adapter.purged,
                    adapter.transactions
                );
            }
        }
        StatsFormat::Json => {
            let mut adapters = serde_json::Map::new();
            for (tier, adapter) in service.adapter_stats() {
                adapters.insert(tier.to_string(), serde_json::to_value(adapter)?);
            }
            print_json(&serde_json::json!({
                "cache": stats,
                "metrics": service.metrics(),
                "adapters": adapters,
            }))?;
        }
        StatsFormat::Prometheus => {
            let text = service
                .metrics()
                .to_prometheus(service.active_storage_name())?;
            print!("{}", text);
        }
    }
    Ok(())
}

async fn run_tracks(cache: &LibraryCache, action: TracksAction) -> Result<()> {
    match action {
        TracksAction::Get { user_id } => {
            print_json(&cache.get_cached_tracks(&user_id).await)?;
        }
        TracksAction::Put { user_id, file } => {
            let tracks: Vec<Track> = read_json(&file)?;
            let stored = cache.cache_tracks(&user_id, &tracks).await;
            print_json(&serde_json::json!({ "stored": stored, "count": tracks.len() }))?;
        }
        TracksAction::Invalidate { user_id } => {
            let removed = cache.invalidate_track_cache(&user_id).await;
            print_json(&serde_json::json!({ "invalidated": removed }))?;
        }
    }
    Ok(())
}

async fn run_artists(cache: &LibraryCache, action: ArtistsAction) -> Result<()> {
    match action {
        ArtistsAction::Get { ids } => {
            print_json(&cache.get_cached_artists(&ids).await)?;
        }
        ArtistsAction::Put { file } => {
            let artists: Vec<Artist> = read_json(&file)?;
            let stored = cache.cache_artists(&artists).await;
            print_json(&serde_json::json!({ "stored": stored, "count": artists.len() }))?;
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "sled=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
