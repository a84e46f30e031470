mod file_config;

pub use file_config::FileConfig;

use crate::bookmarks::StoreSettings;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub store_id: String,
    pub channel_name: String,
    pub default_year: u16,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub channel_capacity: usize,
    pub event_retention_days: u64,
    pub prune_interval_hours: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        let store = StoreSettings::default();
        let server = ServerConfig::default();
        Self {
            db_dir: None,
            store_id: store.store_id,
            channel_name: store.channel_name,
            default_year: store.default_year,
            port: server.port,
            logging_level: server.requests_logging_level,
            frontend_dir_path: None,
            channel_capacity: server.channel_capacity,
            event_retention_days: 30,
            prune_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreSettings,
    pub server: ServerConfig,
    pub event_retention_days: u64,
    pub prune_interval_hours: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // No db_dir at all means an in-memory store
        let db_dir = file.db_dir.map(PathBuf::from).or_else(|| cli.db_dir.clone());
        if let Some(db_dir) = &db_dir {
            if !db_dir.exists() {
                bail!("Database directory does not exist: {:?}", db_dir);
            }
            if !db_dir.is_dir() {
                bail!("db_dir is not a directory: {:?}", db_dir);
            }
        }

        let store_id = file.store_id.unwrap_or_else(|| cli.store_id.clone());
        if store_id.is_empty()
            || !store_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("Invalid store_id {:?}: use letters, digits, '-' and '_'", store_id);
        }

        let channel_name = file
            .channel_name
            .unwrap_or_else(|| cli.channel_name.clone());
        let default_year = file.default_year.unwrap_or(cli.default_year);
        if !(1000..=9999).contains(&default_year) {
            bail!("default_year must have four digits, got {}", default_year);
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());
        let channel_capacity = file.channel_capacity.unwrap_or(cli.channel_capacity);
        if channel_capacity == 0 {
            bail!("channel_capacity must be greater than 0");
        }

        let event_retention_days = file
            .event_retention_days
            .unwrap_or(cli.event_retention_days);
        let prune_interval_hours = file
            .prune_interval_hours
            .unwrap_or(cli.prune_interval_hours);
        if event_retention_days > 0 && prune_interval_hours == 0 {
            bail!("prune_interval_hours must be greater than 0 when pruning is enabled");
        }

        Ok(Self {
            store: StoreSettings {
                db_dir,
                store_id,
                channel_name,
                default_year,
            },
            server: ServerConfig {
                requests_logging_level: logging_level,
                port,
                frontend_dir_path,
                channel_capacity,
            },
            event_retention_days,
            prune_interval_hours,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
