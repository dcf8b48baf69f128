use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use gridexec_proto::{parse_envelope, ErrorCode, Reply};
use tokio::sync::mpsc;

use crate::state::AppState;

/// HTTP handler that upgrades `/control` to a WebSocket connection.
pub async fn control_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single control connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the registry.
///   2. Spawns a sender task that forwards frames from the channel.
///   3. Pumps inbound envelopes through the engine, one reply per frame.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Control connection established");

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.registry.add(conn_id.clone(), tx.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel frames to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Control sink closed");
                break;
            }
        }
    });

    // Receiver loop: one engine round-trip per text frame.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => {
                let reply = match parse_envelope(&text) {
                    Ok(envelope) => state.engine.request(envelope).await,
                    Err(e) => {
                        tracing::debug!(conn_id = %conn_id, error = %e, "Unparseable frame");
                        Reply::Error {
                            code: ErrorCode::Malformed,
                            message: format!("Unparseable frame: {e}"),
                        }
                    }
                };
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if tx.send(Message::Text(json.into())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(conn_id = %conn_id, error = %e, "Reply serialization failed");
                    }
                }
            }
            Ok(_) => {
                // Binary and Ping frames carry nothing in this protocol.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Control receive error");
                break;
            }
        }
    }

    state.registry.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Control connection closed");
}
