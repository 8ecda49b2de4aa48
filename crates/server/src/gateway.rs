//! HTTP and WebSocket entry points.
//!
//! `/ws` upgrades a peer and decides its role from the `totp` query
//! parameter, `/code` reports the current presenter code, and everything
//! else falls through to the static slide assets.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::{Json, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt, future};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use slidecast_hub::{ConnectionLimits, Frame, HubError, HubHandle, Role, mailbox, spawn_connection};
use slidecast_protocol::constants::{CODE_PATH, WS_PATH};
use slidecast_totp::{Totp, unix_now};

use crate::config::AssetSource;
use crate::error::GatewayError;

const PRESENTER_TAKEN_REASON: &str = "presenter already connected";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct GatewayState {
    hub: HubHandle,
    totp: Arc<Totp>,
    limits: ConnectionLimits,
}

impl GatewayState {
    pub fn new(hub: HubHandle, totp: Arc<Totp>, limits: ConnectionLimits) -> Self {
        Self { hub, totp, limits }
    }
}

/// Builds the application router.
pub fn router(state: GatewayState, assets: &AssetSource) -> Router {
    let router = Router::new()
        .route(WS_PATH, get(upgrade))
        .route(CODE_PATH, get(current_code));

    let router = match assets.dir() {
        Some(dir) => {
            info!(path = %dir.display(), "serving static assets");
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    totp: Option<String>,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<GatewayState>,
) -> Response {
    let role = match params.totp.as_deref() {
        Some(code) if state.totp.verify(code) => Role::Presenter,
        Some(_) => {
            debug!("presenter code rejected, joining as viewer");
            Role::Viewer
        }
        None => Role::Viewer,
    };

    let limit = state.limits.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| accept(socket, role, state))
}

/// Registers an upgraded socket with the hub and starts its cycles.
async fn accept(mut socket: WebSocket, role: Role, state: GatewayState) {
    let (mailbox_tx, mailbox_rx) = mailbox();
    let id = match state.hub.register(role, mailbox_tx).await {
        Ok(id) => id,
        Err(HubError::PresenterTaken) => {
            info!("second presenter refused");
            let close = CloseFrame {
                code: close_code::POLICY,
                reason: PRESENTER_TAKEN_REASON.into(),
            };
            let _ = socket.send(WsMessage::Close(Some(close))).await;
            return;
        }
        Err(e) => {
            warn!("registration failed: {e}");
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
    };

    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(into_ws(frame))));
    let stream = stream.map(|msg| msg.map(from_ws));

    let conn = spawn_connection(
        id,
        role,
        sink,
        stream,
        mailbox_rx,
        state.hub.clone(),
        state.limits,
    );
    let (client, role) = (conn.id(), conn.role());
    info!(client, ?role, "peer connected");

    conn.closed().await;
    info!(client, ?role, "peer disconnected");
}

fn into_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
        Frame::Ping(data) => WsMessage::Ping(data),
        Frame::Pong(data) => WsMessage::Pong(data),
        Frame::Close(reason) => WsMessage::Close(reason.map(|reason| CloseFrame {
            code: close_code::NORMAL,
            reason: reason.into(),
        })),
    }
}

fn from_ws(msg: WsMessage) -> Frame {
    match msg {
        WsMessage::Text(text) => Frame::Text(text),
        WsMessage::Binary(data) => Frame::Binary(data),
        WsMessage::Ping(data) => Frame::Ping(data),
        WsMessage::Pong(data) => Frame::Pong(data),
        WsMessage::Close(frame) => Frame::Close(frame.map(|f| f.reason.into_owned())),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeResponse {
    code: String,
    /// Seconds until the code rotates.
    valid_for: u64,
}

async fn current_code(
    State(state): State<GatewayState>,
) -> Result<Json<CodeResponse>, GatewayError> {
    let now = unix_now()?;
    let code = state.totp.generate_at(now)?;
    Ok(Json(CodeResponse {
        code,
        valid_for: state.totp.seconds_remaining_at(now),
    }))
}
