//! WebSocket streaming endpoint. On upgrade the connection becomes a hub
//! subscriber in the requested group; the hub pushes stats envelopes, and a
//! literal `"ping"` text frame gets an immediate heartbeat reply.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::{BroadcastHub, DEFAULT_GROUP};
use crate::snapshot::Envelope;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let group = params
        .get("group")
        .filter(|g| !g.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, Arc::clone(&state.hub), group))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>, group: String) {
    let (mut sender, mut receiver) = socket.split();

    // The forward task is the only writer to the socket; the hub reaches it
    // through this channel.
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let id = hub.register(tx, &group).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize envelope"),
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                // The only client-to-server word in the protocol.
                Message::Text(text) if text == "ping" => {
                    let _ = hub_for_recv.send_to(id, Envelope::heartbeat()).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(id).await;
}
