use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use super::state::{GuardedBookmarkModel, ServerState};
use super::websocket::ws_handler;
use super::{log_requests, ServerConfig};
use crate::bookmarks::BookmarkContext;

#[derive(Serialize, Deserialize, Debug)]
pub struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub replica_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct BookmarkStatusResponse {
    pub event_id: String,
    pub bookmarked: bool,
}

#[derive(Deserialize, Debug)]
struct SetBookmarkBody {
    pub bookmarked: bool,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: state.version.clone(),
        replica_id: state.bookmark_model.replica_id().to_string(),
        degraded: state.degraded.clone(),
    };
    Json(stats)
}

async fn export_bookmarks(State(model): State<GuardedBookmarkModel>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        model.export_bookmarked_ids(),
    )
        .into_response()
}

async fn import_bookmarks(State(model): State<GuardedBookmarkModel>, body: String) -> Response {
    Json(model.import_from_text(&body)).into_response()
}

async fn get_bookmark(
    State(model): State<GuardedBookmarkModel>,
    Path(event_id): Path<String>,
) -> Response {
    let bookmarked = model.get_status(&event_id);
    Json(BookmarkStatusResponse {
        event_id,
        bookmarked,
    })
    .into_response()
}

async fn put_bookmark(
    State(model): State<GuardedBookmarkModel>,
    Path(event_id): Path<String>,
    Json(body): Json<SetBookmarkBody>,
) -> Response {
    if event_id.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    debug!("Setting bookmark {} to {}", event_id, body.bookmarked);
    model.set_status(&event_id, body.bookmarked);
    Json(BookmarkStatusResponse {
        bookmarked: model.get_status(&event_id),
        event_id,
    })
    .into_response()
}

pub fn make_app(config: ServerConfig, context: &BookmarkContext) -> Result<Router> {
    let state = ServerState::new(
        config.clone(),
        context.model().clone(),
        context.degraded().map(str::to_string),
    );

    let bookmark_routes: Router = Router::new()
        .route("/export", get(export_bookmarks))
        .route("/import", axum::routing::post(import_bookmarks))
        .route("/{event_id}", get(get_bookmark).put(put_bookmark))
        .with_state(state.clone());

    let ws_routes: Router = Router::new()
        .route("/v1/ws", get(ws_handler))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new()
                .route("/v1/status", get(home))
                .with_state(state.clone())
                .fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .route("/v1/status", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router
        .nest("/v1/bookmarks", bookmark_routes)
        .merge(ws_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(config: ServerConfig, context: &BookmarkContext) -> Result<()> {
    let port = config.port;
    let app = make_app(config, context)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
