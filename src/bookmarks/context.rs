//! Startup wiring of a bookmark context: store, synchronizer and model.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::in_memory_store::InMemoryStatusStore;
use super::model::{BookmarkModel, DEFAULT_YEAR};
use super::sqlite_status_store::SqliteStatusStore;
use super::status_store::FullStatusStore;
use crate::sync::{ChannelHub, Synchronizer};

pub const DEFAULT_STORE_ID: &str = "fosdem2025";
pub const DEFAULT_CHANNEL_NAME: &str = "bookmarks";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Directory holding the store database. None keeps everything in memory.
    pub db_dir: Option<PathBuf>,
    pub store_id: String,
    pub channel_name: String,
    pub default_year: u16,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_dir: None,
            store_id: DEFAULT_STORE_ID.to_string(),
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            default_year: DEFAULT_YEAR,
        }
    }
}

impl StoreSettings {
    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.db", self.store_id)))
    }
}

/// A running bookmark context.
///
/// Owns the model and the task applying changes from the other contexts on
/// the same channel.
pub struct BookmarkContext {
    model: Arc<BookmarkModel>,
    degraded: Option<String>,
    sync_listener: JoinHandle<()>,
}

impl BookmarkContext {
    /// Opens the configured store and joins the sync channel.
    ///
    /// If the durable store cannot be opened the context still comes up, on a
    /// non-persisted store, and reports why through [`degraded`](Self::degraded).
    pub async fn open(settings: &StoreSettings, hub: &ChannelHub) -> Result<Self> {
        let synchronizer: Arc<dyn Synchronizer> = Arc::new(hub.channel(&settings.channel_name));

        let (store, degraded): (Arc<dyn FullStatusStore>, Option<String>) =
            match settings.db_path() {
                None => {
                    info!("No db dir configured, bookmarks will not be persisted");
                    (Arc::new(InMemoryStatusStore::new()), None)
                }
                Some(db_path) => {
                    info!("Opening bookmark store at {:?}...", db_path);
                    let opened = tokio::task::spawn_blocking(move || {
                        SqliteStatusStore::new(&db_path)
                    })
                    .await
                    .context("Bookmark store initialization panicked")?;
                    match opened {
                        Ok(store) => (Arc::new(store), None),
                        Err(err) => {
                            error!(
                                "Failed to open bookmark store, falling back to memory: {:#}",
                                err
                            );
                            (
                                Arc::new(InMemoryStatusStore::new()),
                                Some(format!(
                                    "Bookmarks are not being saved on this device: {:#}",
                                    err
                                )),
                            )
                        }
                    }
                }
            };

        let model = Arc::new(BookmarkModel::new(
            store,
            synchronizer,
            settings.default_year,
        )?);
        Ok(Self::with_model(model, degraded))
    }

    /// Wraps an already built model and starts its sync listener.
    pub fn with_model(model: Arc<BookmarkModel>, degraded: Option<String>) -> Self {
        let sync_listener = model.spawn_sync_listener();
        Self {
            model,
            degraded,
            sync_listener,
        }
    }

    pub fn model(&self) -> &Arc<BookmarkModel> {
        &self.model
    }

    /// Human readable reason the context runs without persistence, if it does.
    pub fn degraded(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    pub fn shutdown(self) {}
}

impl Drop for BookmarkContext {
    fn drop(&mut self) {
        self.sync_listener.abort();
    }
}
