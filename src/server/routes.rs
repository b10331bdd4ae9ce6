//! HTTP routes: liveness, health, admin broadcast, realtime upgrade.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AccessConfig, AccessList};
use crate::hub::{BroadcastHub, Subscription};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub app_name: String,
}

#[derive(Serialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

pub fn create_router(hub: Arc<BroadcastHub>, access: &AccessConfig, app_name: &str) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/broadcast", post(broadcast))
        .layer(cors_layer(access))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState {
            hub,
            app_name: app_name.into(),
        })
}

/// Cross-origin policy from configuration. Values were validated at config
/// load, so unparsable entries are simply skipped here.
fn cors_layer(access: &AccessConfig) -> CorsLayer {
    let origin = match &access.allow_origin {
        AccessList::Any => AllowOrigin::any(),
        AccessList::List(values) => AllowOrigin::list(
            values
                .iter()
                .filter_map(|v| v.parse::<HeaderValue>().ok()),
        ),
    };
    let methods = match &access.allow_methods {
        AccessList::Any => AllowMethods::any(),
        AccessList::List(values) => {
            AllowMethods::list(values.iter().filter_map(|v| v.parse::<Method>().ok()))
        }
    };
    let headers = match &access.allow_headers {
        AccessList::Any => AllowHeaders::any(),
        AccessList::List(values) => {
            AllowHeaders::list(values.iter().filter_map(|v| v.parse::<HeaderName>().ok()))
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(access.allow_credentials)
}

async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({"message": "pong"}))
}

async fn health(State(s): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": s.app_name}))
}

/// Admin broadcast: the body is forwarded verbatim to every connected client.
async fn broadcast(State(s): State<AppState>, body: String) -> Json<BroadcastResponse> {
    let delivered = s.hub.broadcast(body).await;
    Json(BroadcastResponse { delivered })
}

async fn ws_upgrade(State(s): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_session(s.hub, socket))
}

/// One task per realtime client: forward hub messages to the socket, watch
/// the inbound side for closure, unregister on the way out.
async fn client_session(hub: Arc<BroadcastHub>, socket: WebSocket) {
    let Subscription { id, mut rx } = hub.register().await;
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(message) => {
                    if sink.send(Message::Text(message.to_string())).await.is_err() {
                        break;
                    }
                }
                // Sender side gone: the hub dropped this client.
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // This channel is broadcast-only; inbound frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
    hub.unregister(id).await;
    let _ = sink.close().await;
}
