use axum::{
    extract::{State, WebSocketUpgrade},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::protocol::RoomSnapshot;
use crate::relay::RelayState;
use crate::websocket::handle_socket;

const NO_STORE: [(header::HeaderName, &str); 1] = [(header::CACHE_CONTROL, "no-store")];

#[derive(Clone)]
pub struct AppState {
    pub relay: RelayState,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(relay: RelayState) -> Self {
        Self {
            relay,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PrometheusHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    ok: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(websocket_handler))
        .route("/room-state", get(room_state))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// `GET /` answers health checks and also accepts WebSocket upgrades.
async fn root(State(state): State<AppState>, ws: Option<WebSocketUpgrade>) -> Response {
    match ws {
        Some(ws) => upgrade(ws, state.relay),
        None => health_check().await.into_response(),
    }
}

async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    upgrade(ws, state.relay)
}

fn upgrade(ws: WebSocketUpgrade, relay: RelayState) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

pub async fn health_check() -> impl IntoResponse {
    (NO_STORE, Json(HealthStatus { ok: true }))
}

/// Polling fallback for clients that cannot keep a socket open.
async fn room_state(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot: RoomSnapshot = state.relay.room_snapshot();
    (NO_STORE, Json(snapshot))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
