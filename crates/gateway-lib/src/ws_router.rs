// ============================
// crates/gateway-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::gateway::ChatGateway;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use ticketchat_common::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe
async fn live() -> &'static str {
    "ok"
}

fn text(s: String) -> Message {
    Message::Text(Utf8Bytes::from(s))
}

/// Handler for WebSocket connections
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    counter!(crate::metrics::WS_CONNECTION).increment(1);
    gauge!(crate::metrics::WS_ACTIVE).increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Every event for this connection (direct replies and room
    // broadcasts alike) funnels through one channel, so the client sees
    // them in the order the gateway produced them
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let gateway = ChatGateway::register(state, event_tx.clone());
    let connection_id = gateway.connection_id();
    tracing::debug!(%connection_id, "websocket connected");

    // Forward outbound events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound event");
                    continue;
                },
            };
            if sink.send(text(json)).await.is_err() {
                break;
            }
        }
    });

    // Process incoming frames
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(frame) => {
                match serde_json::from_str::<ClientEvent>(&frame) {
                    Ok(event) => {
                        if let Some(reply) = gateway.handle_event(event).await {
                            if event_tx.send(reply).is_err() {
                                break;
                            }
                        }
                    },
                    Err(e) => {
                        let err = ServerEvent::ProtocolError {
                            message: format!("Invalid event format: {e}"),
                        };
                        if event_tx.send(err).is_err() {
                            break;
                        }
                    },
                }
            },
            Message::Close(_) => break,
            // Ping/pong is handled by the transport layer
            _ => {},
        }
    }

    // Cleanup: leave rooms, expire typing, drop registry state
    gateway.on_disconnect().await;
    tracing::debug!(%connection_id, "websocket disconnected");

    counter!(crate::metrics::WS_DISCONNECTION).increment(1);
    gauge!(crate::metrics::WS_ACTIVE).decrement(1.0);

    send_task.abort();
}
