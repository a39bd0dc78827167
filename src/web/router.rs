//! Route definitions for the web server.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::socket::WsChannel;
use crate::chat::{ConnectParams, Desk};

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<Desk>,
    pub inbound_buffer: usize,
}

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "ok\n"
}

/// Upgrade to a WebSocket and hand the connection to the desk.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let channel = Arc::new(WsChannel::new(socket, state.inbound_buffer));
        state.desk.accept(channel, params).await;
    })
}
