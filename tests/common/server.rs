//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own bookmark database and
//! sync channel hub.

use super::{SERVER_READY_POLL_INTERVAL_MS, SERVER_READY_TIMEOUT_MS};
use schedule_bookmarks::server::{make_app, RequestsLoggingLevel, ServerConfig};
use schedule_bookmarks::{BookmarkContext, ChannelHub, StoreSettings};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated store.
///
/// When dropped, the server gracefully shuts down and the database is removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Hub the server's context synchronizes on, for joining in-process contexts
    pub hub: ChannelHub,

    /// The server's own bookmark context
    pub context: BookmarkContext,

    /// Settings the server's context was opened with
    pub settings: StoreSettings,

    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be opened, the port cannot be bound or the
    /// server doesn't become ready within the timeout.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let settings = StoreSettings {
            db_dir: Some(temp_db_dir.path().to_path_buf()),
            ..Default::default()
        };

        let hub = ChannelHub::default();
        let context = BookmarkContext::open(&settings, &hub)
            .await
            .expect("Failed to open bookmark context");
        assert!(context.degraded().is_none(), "Test store should persist");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, &context).expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            hub,
            context,
            settings,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// The server's replica id, which connections may not claim.
    pub fn replica_id(&self) -> &str {
        self.context.model().replica_id()
    }

    /// Polls `/v1/status` until the server answers.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client
                .get(format!("{}/v1/status", self.base_url))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
