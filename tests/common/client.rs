//! HTTP and WebSocket clients for end-to-end tests
//!
//! When API routes or message formats change, update only this file.

use super::{REQUEST_TIMEOUT_SECS, WS_MESSAGE_TIMEOUT_MS};
use futures::{SinkExt, StreamExt};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    pub async fn get_status(&self) -> Response {
        self.client
            .get(format!("{}/v1/status", self.base_url))
            .send()
            .await
            .expect("Status request failed")
    }

    pub async fn get_bookmark(&self, event_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/bookmarks/{}", self.base_url, event_id))
            .send()
            .await
            .expect("Get bookmark request failed")
    }

    /// Reads the flag, panicking on anything but a well formed answer.
    pub async fn is_bookmarked(&self, event_id: &str) -> bool {
        let response = self.get_bookmark(event_id).await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Invalid bookmark JSON");
        body["bookmarked"].as_bool().expect("Missing bookmarked flag")
    }

    pub async fn put_bookmark(&self, event_id: &str, bookmarked: bool) -> Response {
        self.client
            .put(format!("{}/v1/bookmarks/{}", self.base_url, event_id))
            .json(&json!({ "bookmarked": bookmarked }))
            .send()
            .await
            .expect("Put bookmark request failed")
    }

    pub async fn import(&self, text: &str) -> Response {
        self.client
            .post(format!("{}/v1/bookmarks/import", self.base_url))
            .body(text.to_string())
            .send()
            .await
            .expect("Import request failed")
    }

    pub async fn export(&self) -> Response {
        self.client
            .get(format!("{}/v1/bookmarks/export", self.base_url))
            .send()
            .await
            .expect("Export request failed")
    }
}

/// A WebSocket connection acting as one remote bookmark context.
pub struct WsClient {
    pub context_id: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connects and waits for the `connected` greeting.
    pub async fn connect(base_url: &str, context_id: &str, since: Option<i64>) -> Self {
        let mut url = format!(
            "{}/v1/ws?context_id={}",
            base_url.replace("http://", "ws://"),
            context_id
        );
        if let Some(since) = since {
            url.push_str(&format!("&since={}", since));
        }
        let (stream, _) = connect_async(url)
            .await
            .expect("Failed to connect to WebSocket");

        let mut client = Self {
            context_id: context_id.to_string(),
            stream,
        };
        let connected = client
            .wait_for_message("connected")
            .await
            .expect("No connected message");
        assert_eq!(connected["payload"]["context_id"], context_id);
        client
    }

    /// Sends a `status_changed` sync message stamped by this context.
    pub async fn send_status(&mut self, event_id: &str, bookmarked: bool, clock: u64) {
        let msg = json!({
            "type": "sync",
            "payload": {
                "origin": self.context_id,
                "event": {
                    "type": "status_changed",
                    "payload": {
                        "record": {
                            "event_id": event_id,
                            "bookmarked": bookmarked,
                            "stamp": { "clock": clock, "replica_id": self.context_id },
                        }
                    }
                }
            }
        });
        self.send_raw(&msg.to_string()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send WebSocket message");
    }

    /// Waits for a message of the given type, skipping any other.
    pub async fn wait_for_message(&mut self, expected_type: &str) -> Option<Value> {
        self.wait_for_message_within(expected_type, Duration::from_millis(WS_MESSAGE_TIMEOUT_MS))
            .await
    }

    pub async fn wait_for_message_within(
        &mut self,
        expected_type: &str,
        timeout_duration: Duration,
    ) -> Option<Value> {
        let stream = &mut self.stream;
        let result = timeout(timeout_duration, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if let Ok(json) = serde_json::from_str::<Value>(&text) {
                        if json.get("type").and_then(|t| t.as_str()) == Some(expected_type) {
                            return Some(json);
                        }
                    }
                }
            }
            None
        })
        .await;

        result.ok().flatten()
    }
}
