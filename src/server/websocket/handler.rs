//! WebSocket route handler.
//!
//! Each connection acts as one more bookmark context on the server's
//! channel: changes it sends are merged into the server model and relayed
//! to everybody else, and it receives every change made elsewhere.

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, broadcast::error::RecvError, mpsc};
use tracing::{debug, error, warn};

use super::messages::{error_codes, msg_types, system, ClientMessage, ServerMessage};
use crate::bookmarks::{BookmarkEvent, CatchUp, SyncEnvelope};
use crate::server::state::GuardedBookmarkModel;

const OUTGOING_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Id the connecting context tags its changes with. Generated if absent.
    pub context_id: Option<String>,
    /// Last event log sequence number the context has seen.
    pub since: Option<i64>,
}

/// WebSocket upgrade handler for `GET /v1/ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(model): State<GuardedBookmarkModel>,
) -> Response {
    let context_id = params
        .context_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if context_id.trim().is_empty() || context_id == model.replica_id() {
        warn!("Rejecting WebSocket connection with context id {:?}", context_id);
        return (StatusCode::BAD_REQUEST, "Invalid context_id").into_response();
    }

    debug!("WebSocket upgrade for context {}", context_id);
    ws.on_upgrade(move |socket| handle_socket(socket, context_id, params.since, model))
}

async fn handle_socket(
    socket: WebSocket,
    context_id: String,
    since: Option<i64>,
    model: GuardedBookmarkModel,
) {
    debug!("WebSocket connected: context {}", context_id);

    // Subscribe before reading the log so nothing falls between the two
    let live = model.subscribe_sync();

    let (ws_sink, ws_stream) = socket.split();
    let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);

    let connected_msg = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            context_id: context_id.clone(),
            replica_id: model.replica_id().to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, connected_msg));

    let caught_up_seq = match catch_up_messages(&model, since) {
        Ok((messages, seq)) => {
            for msg in messages {
                if outgoing_tx.send(msg).await.is_err() {
                    outgoing_handle.abort();
                    return;
                }
            }
            seq
        }
        Err(err) => {
            error!("Failed to build catch-up for context {}: {:#}", context_id, err);
            None
        }
    };

    let live_handle = tokio::spawn(forward_live(
        live,
        context_id.clone(),
        caught_up_seq,
        model.clone(),
        outgoing_tx.clone(),
    ));

    process_incoming(ws_stream, &context_id, &model, &outgoing_tx).await;

    debug!("WebSocket disconnected: context {}", context_id);
    live_handle.abort();
    outgoing_handle.abort();
}

/// Messages bringing a context that has seen the log up to `since` to the
/// current state, and the log position they reach.
///
/// A context without `since` gets the full state.
fn catch_up_messages(
    model: &GuardedBookmarkModel,
    since: Option<i64>,
) -> Result<(Vec<ServerMessage>, Option<i64>)> {
    let catch_up = match since {
        Some(since) => model.catch_up(since)?,
        None => model.catch_up(-1)?,
    };

    match catch_up {
        CatchUp::Events(events) => {
            let last_seq = events.last().map(|e| e.seq).or(since);
            let messages = events
                .into_iter()
                .map(|stored| {
                    let origin = stored
                        .event
                        .records()
                        .first()
                        .map(|r| r.stamp.replica_id.clone())
                        .unwrap_or_else(|| model.replica_id().to_string());
                    envelope_message(
                        &SyncEnvelope::new(origin, stored.event)
                            .with_log_seq(model.replica_id(), Some(stored.seq)),
                    )
                })
                .collect();
            Ok((messages, last_seq))
        }
        CatchUp::Snapshot { records, seq } => {
            let envelope = SyncEnvelope::new(
                model.replica_id(),
                BookmarkEvent::Snapshot { records },
            )
            .with_log_seq(model.replica_id(), Some(seq));
            Ok((vec![envelope_message(&envelope)], Some(seq)))
        }
    }
}

fn envelope_message(envelope: &SyncEnvelope) -> ServerMessage {
    let msg_type = match envelope.event {
        BookmarkEvent::StatusChanged { .. } => msg_types::SYNC,
        BookmarkEvent::Snapshot { .. } => msg_types::SNAPSHOT,
    };
    ServerMessage::new(msg_type, envelope)
}

/// Forwards changes made by other contexts to this connection.
async fn forward_live(
    mut live: broadcast::Receiver<SyncEnvelope>,
    context_id: String,
    caught_up_seq: Option<i64>,
    model: GuardedBookmarkModel,
    outgoing_tx: mpsc::Sender<ServerMessage>,
) {
    loop {
        let msg = match live.recv().await {
            Ok(envelope) => {
                if envelope.origin == context_id {
                    continue;
                }
                // Already delivered by the catch-up
                let own_seq = envelope.seq_in_log(model.replica_id());
                if let (Some(seq), Some(caught_up)) = (own_seq, caught_up_seq) {
                    if seq <= caught_up {
                        continue;
                    }
                }
                envelope_message(&envelope)
            }
            Err(RecvError::Lagged(n)) => {
                warn!(
                    "Context {} lagged by {} messages, sending snapshot",
                    context_id, n
                );
                envelope_message(&SyncEnvelope::new(
                    model.replica_id(),
                    BookmarkEvent::Snapshot {
                        records: model.snapshot(),
                    },
                ))
            }
            Err(RecvError::Closed) => break,
        };
        if outgoing_tx.send(msg).await.is_err() {
            break;
        }
    }
}

async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<ServerMessage>,
    initial_msg: ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
            }
        }
    }
}

async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    context_id: &str,
    model: &GuardedBookmarkModel,
    outgoing_tx: &mpsc::Sender<ServerMessage>,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_client_message(context_id, msg, model),
                    Err(e) => {
                        debug!("Failed to parse client message: {}", e);
                        Some(error_message(
                            error_codes::PARSE_ERROR,
                            format!("Invalid message format: {}", e),
                        ))
                    }
                };
                if let Some(reply) = reply {
                    if outgoing_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }
}

/// Handles a parsed client message, returning the reply to send, if any.
fn handle_client_message(
    context_id: &str,
    msg: ClientMessage,
    model: &GuardedBookmarkModel,
) -> Option<ServerMessage> {
    match msg.msg_type.as_str() {
        msg_types::PING => Some(ServerMessage::empty(msg_types::PONG)),
        msg_types::SYNC => match serde_json::from_value::<SyncEnvelope>(msg.payload) {
            Ok(envelope) => {
                let records = envelope.event.records();
                if let Some(record) = records.iter().find(|r| !r.stamp.is_valid()) {
                    warn!(
                        "Context {} sent clock {} for {}",
                        context_id, record.stamp.clock, record.event_id
                    );
                    return Some(error_message(
                        error_codes::INVALID_PAYLOAD,
                        format!("Clock out of range for {}", record.event_id),
                    ));
                }
                // Connections only speak for themselves
                let envelope = SyncEnvelope {
                    origin: context_id.to_string(),
                    ..envelope
                }
                .with_log_seq(context_id, None);
                if !model.relay_remote(&envelope) {
                    debug!("Nothing new from context {}", context_id);
                }
                None
            }
            Err(e) => Some(error_message(
                error_codes::INVALID_PAYLOAD,
                format!("Invalid sync payload: {}", e),
            )),
        },
        other => {
            debug!("Unknown message type: {}", other);
            Some(error_message(
                error_codes::UNKNOWN_TYPE,
                format!("Unknown message type: {}", other),
            ))
        }
    }
}

fn error_message(code: &str, message: String) -> ServerMessage {
    ServerMessage::new(msg_types::ERROR, system::Error::new(code, message))
}
