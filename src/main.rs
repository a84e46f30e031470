use anyhow::{Context, Result};
use clap::Parser;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use std::{fmt::Debug, path::PathBuf};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use schedule_bookmarks::config::{AppConfig, CliConfig, FileConfig};
use schedule_bookmarks::{run_server, BookmarkContext, ChannelHub, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the bookmark databases. Bookmarks are kept in memory
    /// only if not set.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Name of the bookmark store, one database per store.
    #[clap(long, default_value = "fosdem2025")]
    pub store_id: String,

    /// Name of the channel contexts synchronize on.
    #[clap(long, default_value = "bookmarks")]
    pub channel_name: String,

    /// Year given to bare event numbers on import.
    #[clap(long, default_value_t = 2025)]
    pub default_year: u16,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Sync messages buffered per channel before slow receivers lag.
    #[clap(long, default_value_t = 256)]
    pub channel_capacity: usize,

    /// Number of days to retain sync events before pruning. Set to 0 to disable pruning.
    #[clap(long, default_value_t = 30)]
    pub event_retention_days: u64,

    /// Interval in hours between pruning runs. Only used if event_retention_days > 0.
    #[clap(long, default_value_t = 24)]
    pub prune_interval_hours: u64,
}

impl From<CliArgs> for CliConfig {
    fn from(args: CliArgs) -> Self {
        CliConfig {
            db_dir: args.db_dir,
            store_id: args.store_id,
            channel_name: args.channel_name,
            default_year: args.default_year,
            port: args.port,
            logging_level: args.logging_level,
            frontend_dir_path: args.frontend_dir_path,
            channel_capacity: args.channel_capacity,
            event_retention_days: args.event_retention_days,
            prune_interval_hours: args.prune_interval_hours,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&CliConfig::from(cli_args), file_config)?;

    let hub = ChannelHub::new(config.server.channel_capacity);
    let context = BookmarkContext::open(&config.store, &hub).await?;
    if let Some(banner) = context.degraded() {
        error!("{}", banner);
    }

    // Spawn background task for event pruning if enabled
    if config.event_retention_days > 0 {
        let retention_days = config.event_retention_days;
        let interval_hours = config.prune_interval_hours;
        let pruning_model = context.model().clone();

        info!(
            "Event pruning enabled: retaining {} days, pruning every {} hours",
            retention_days, interval_hours
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                let cutoff = now - (retention_days as i64 * 24 * 60 * 60);

                match pruning_model.prune_events_older_than(cutoff) {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} old sync events", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to prune sync events: {}", e);
                    }
                }
            }
        });
    }

    info!(
        "Serving store {} on channel {}",
        config.store.store_id, config.store.channel_name
    );
    let result = run_server(config.server, &context).await;
    context.shutdown();
    result
}
