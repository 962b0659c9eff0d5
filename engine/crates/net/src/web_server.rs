use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use session::{ConnectionRole, SessionId};
use tower_http::services::{ServeDir, ServeFile};

use crate::channels::{ConnectionChannels, NetToRelay, RegisterSession, SessionWriteRx};
use crate::protocol::{ClientEvent, FeatureCollection, PlayerProperties, ServerEvent};

/// Shared state for the axum WebSocket handler.
#[derive(Clone)]
struct RelayState {
    next_session_id: Arc<AtomicU64>,
    channels: ConnectionChannels,
    producer_token: Arc<str>,
}

/// Handshake query pairs; a malformed query string is kept as a rejection
/// so the upgrade still goes ahead.
type HandshakeQuery = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Router exposing the relay socket on `/ws`.
///
/// The credential is read from the `token` query parameter, falling back to
/// an `Authorization: Bearer` header.
pub fn relay_routes(channels: ConnectionChannels, producer_token: impl Into<Arc<str>>) -> Router {
    let state = RelayState {
        next_session_id: Arc::new(AtomicU64::new(1)),
        channels,
        producer_token: producer_token.into(),
    };

    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

/// Serve files from `dir`, falling back to `index.html` for client-side routes.
pub fn with_static_dir(app: Router, dir: PathBuf) -> Router {
    let index_path = dir.join("index.html");
    let serve_dir = ServeDir::new(&dir).not_found_service(ServeFile::new(index_path));
    tracing::info!(dir = %dir.display(), "Serving static files");
    app.fallback_service(serve_dir)
}

/// Serve `app` on an already bound listener until the shutdown flag flips.
pub async fn serve_with_shutdown(
    listener: tokio::net::TcpListener,
    app: Router,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    return;
                }
            }
            tracing::info!("Web server shutting down gracefully");
        })
        .await
}

/// Bind `addr` and serve `app`, with optional static file serving.
pub async fn run_web_server_with_shutdown(
    addr: String,
    app: Router,
    static_dir: Option<PathBuf>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = match static_dir {
        Some(dir) => with_static_dir(app, dir),
        None => app,
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Web server listening on {}", addr);

    serve_with_shutdown(listener, app, shutdown_rx).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// First `token` value in the query string; anything unparsable counts as none.
fn query_token(query: HandshakeQuery) -> Option<String> {
    let Query(pairs) = query.ok()?;
    pairs.into_iter().find(|(key, _)| key == "token").map(|(_, value)| value)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    query: HandshakeQuery,
    headers: HeaderMap,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    let token = query_token(query).or_else(|| bearer_token(&headers));
    let role = ConnectionRole::from_credential(token.as_deref(), &state.producer_token);
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, role))
}

async fn handle_ws_connection(socket: WebSocket, state: RelayState, role: ConnectionRole) {
    let session_id = SessionId(state.next_session_id.fetch_add(1, Ordering::Relaxed));
    tracing::info!(?session_id, ?role, "New relay connection");

    let (mut ws_writer, mut ws_reader) = socket.split();

    let (write_tx, mut write_rx): (_, SessionWriteRx) = tokio::sync::mpsc::unbounded_channel();

    // Queued before registration so no broadcast can overtake it.
    if role == ConnectionRole::Consumer {
        match ServerEvent::player_locations(&FeatureCollection::<PlayerProperties>::empty()) {
            Ok(frame) => {
                let _ = write_tx.send(frame);
            }
            Err(e) => tracing::error!(?session_id, "Failed to encode greeting: {}", e),
        }
    }

    let _ = state.channels.register_tx.send(RegisterSession {
        session_id,
        role,
        write_tx,
    });
    let _ = state
        .channels
        .relay_tx
        .send(NetToRelay::Connected { session_id, role });

    // Writer task: forward output_router frames as WS text frames
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = write_rx.recv().await {
            if ws_writer.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_reader.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Some(msg) = handle_ws_message(session_id, &text) {
                    let _ = state.channels.relay_tx.send(msg);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong handled by axum, binary ignored
            Err(e) => {
                tracing::debug!(?session_id, "WebSocket read error: {}", e);
                break;
            }
        }
    }

    let _ = state
        .channels
        .relay_tx
        .send(NetToRelay::Disconnected { session_id });
    let _ = state.channels.unregister_tx.send(session_id);

    writer_handle.abort();
    tracing::info!(?session_id, ?role, "Relay connection ended");
}

/// Decode a text frame into a relay message. Undecodable frames are dropped.
pub(crate) fn handle_ws_message(session_id: SessionId, text: &str) -> Option<NetToRelay> {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => Some(NetToRelay::Event { session_id, event }),
        Err(e) => {
            tracing::debug!(?session_id, "Invalid relay frame: {}", e);
            None
        }
    }
}
