use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::utils::scope_guard::ScopeGuard;
use crate::websocket::protocol;
use crate::ws::connctx::{ConnCtx, WireFormat};
use crate::ws::relay::Relay;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub document_id: Option<String>,
    pub user_id: Option<String>,
    pub encoding: Option<WireFormat>,
}

impl ConnectParams {
    /// Resolve missing or empty values to the configured defaults.
    pub fn into_ctx(self, relay: &Relay) -> ConnCtx {
        let config = relay.config();
        let document_id = self
            .document_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| config.default_document_id.clone());
        let user_id = self
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| config.default_user_id.clone());
        ConnCtx::new(document_id, user_id, self.encoding.unwrap_or_default())
    }
}

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(relay): State<Arc<Relay>>,
) -> Response {
    let ctx = params.into_ctx(&relay);
    info!(document_id = %ctx.document_id, user_id = %ctx.user_id, "New WebSocket connection attempt");
    ws.max_message_size(relay.config().max_message_bytes)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {e}"))
        .on_upgrade(move |socket| handle_socket(socket, relay, ctx))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, relay: Arc<Relay>, ctx: ConnCtx) {
    let (mut sink, mut stream) = socket.split();

    // Everything bound for this client goes through one queue, drained here.
    // The room holds the only strong sender: once it evicts this connection
    // the writer drains what is left and exits.
    let (tx, mut rx) = mpsc::channel::<Message>(relay.config().peer_queue_capacity());
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                debug!("sink send error; writer task exiting");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let ping_tx = tx.downgrade();
    protocol::open_session(&relay, &ctx, tx);
    let close_guard = ScopeGuard::new({
        let relay = relay.clone();
        let ctx = ctx.clone();
        move || protocol::close_session(&relay, &ctx)
    });

    let client_timeout = relay.config().client_timeout();
    let mut heartbeat = tokio::time::interval(relay.config().heartbeat_interval());
    heartbeat.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "Transport error: {e}");
                        break;
                    }
                    None => break,
                };
                last_seen = Instant::now();
                match msg {
                    Message::Text(text) => protocol::handle_text(&relay, &ctx, &text),
                    Message::Binary(bytes) => protocol::handle_binary(&relay, &ctx, &bytes),
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > client_timeout {
                    warn!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "Client timed out");
                    break;
                }
                // A full queue is left to the next broadcast to evict.
                match ping_tx.upgrade().map(|tx| tx.try_send(Message::Ping(Vec::new()))) {
                    None | Some(Err(TrySendError::Closed(_))) => break,
                    Some(_) => {}
                }
            }
            _ = &mut send_task => break,
        }
    }

    drop(close_guard);
    drop(ping_tx);
    if !send_task.is_finished() {
        send_task.abort();
    }
    info!(document_id = %ctx.document_id, conn_id = %ctx.conn_id, "WebSocket connection terminated");
}
