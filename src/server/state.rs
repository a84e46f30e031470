use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use crate::bookmarks::BookmarkModel;

use super::ServerConfig;

pub type GuardedBookmarkModel = Arc<BookmarkModel>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub bookmark_model: GuardedBookmarkModel,
    /// Set when the bookmark store runs without persistence.
    pub degraded: Option<String>,
    pub version: String,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        bookmark_model: GuardedBookmarkModel,
        degraded: Option<String>,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            bookmark_model,
            degraded,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl FromRef<ServerState> for GuardedBookmarkModel {
    fn from_ref(input: &ServerState) -> Self {
        input.bookmark_model.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
