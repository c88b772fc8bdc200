//! HTTP and WebSocket surface.
//!
//! - `GET /` renders the configured root component as a full document
//! - `GET /ws` upgrades to the duplex channel a page connects back on
//! - `GET /healthz` liveness probe

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use weft_protocol::ClientMessage;

use crate::component::Props;
use crate::{ProtocolViolation, Server, ServerError, Session};

/// Close frame reasons are capped at 123 bytes by the WebSocket protocol.
const MAX_CLOSE_REASON: usize = 120;

#[derive(Clone)]
pub struct AppState {
    pub server: Server,
    /// Component rendered at `/`.
    pub root_component: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/ws", get(connect))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn page(State(state): State<AppState>) -> Response {
    match state
        .server
        .render_page(&state.root_component, Props::new())
        .await
    {
        Ok(page) => Html(page.document(&state.root_component)).into_response(),
        Err(e) => {
            error!(error = %e, component = %state.root_component, "Page render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response()
        }
    }
}

async fn connect(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_session(socket, state.server))
}

/// Pumps one socket through a [`Session`] until either side goes away or the
/// session hits a fatal error.
async fn serve_session(socket: WebSocket, server: Server) {
    let (session, mut outbound) = server.open_session();
    let session_id = session.id();
    let (mut sender, mut receiver) = socket.split();
    let (close_tx, mut close_rx) = oneshot::channel::<Option<String>>();
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<ServerError>();

    let to_client = tokio::spawn(async move {
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, connection_id = %session_id, "Failed to encode update");
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        debug!(error = ?e, connection_id = %session_id, "Failed to send update to client");
                        break;
                    }
                }
                reason = &mut close_rx => {
                    if let Ok(Some(reason)) = reason {
                        let frame = CloseFrame {
                            code: close_code::POLICY,
                            reason: reason.into(),
                        };
                        let _ = sender.send(Message::Close(Some(frame))).await;
                    }
                    break;
                }
            }
        }
    });

    info!(connection_id = %session_id, "Client connected");
    let mut fatal: Option<ServerError> = None;
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message = match ClientMessage::decode(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => {
                            fatal = Some(ProtocolViolation::from(e).into());
                            break;
                        }
                    };
                    if let Err(e) = handle(&session, message, &fatal_tx).await {
                        fatal = Some(e);
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = ?e, connection_id = %session_id, "WebSocket error");
                    break;
                }
            },
            Some(e) = fatal_rx.recv() => {
                fatal = Some(e);
                break;
            }
        }
    }

    let reason = fatal.map(|e| {
        warn!(error = %e, connection_id = %session_id, "Closing connection on fatal error");
        close_reason(&e)
    });
    let _ = close_tx.send(reason);
    session.close().await;
    let _ = to_client.await;
}

/// Handles one decoded message. Events run on their own task so a slow
/// callback never stalls the socket; their fatal errors come back on
/// `fatal_tx`.
async fn handle(
    session: &Session,
    message: ClientMessage,
    fatal_tx: &mpsc::UnboundedSender<ServerError>,
) -> Result<(), ServerError> {
    if let ClientMessage::Event { .. } = message {
        let session = session.clone();
        let fatal_tx = fatal_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = session.handle(message).await {
                if e.is_fatal() {
                    let _ = fatal_tx.send(e);
                } else {
                    warn!(error = %e, connection_id = %session.id(), "Event dropped");
                }
            }
        });
        return Ok(());
    }

    match session.handle(message).await {
        Err(e) if !e.is_fatal() => {
            warn!(error = %e, connection_id = %session.id(), "Message dropped");
            Ok(())
        }
        other => other,
    }
}

fn close_reason(err: &ServerError) -> String {
    let mut reason = err.to_string();
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "weft-server",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}
