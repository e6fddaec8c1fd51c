// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly and the listening loop.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use courier_bus::FanoutHub;
use courier_config::model::ServerConfig;
use courier_core::{BotStore, CourierError, MessageStore, RouteRuleStore};
use courier_mtproto::DeviceSessionManager;
use courier_relay::{RouteEngine, WebhookIngestor};
use courier_telegram::BotRegistry;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api;
use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::ws;

/// Admin uploads carry base64 media.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Instant,
    /// Renders the Prometheus exposition text, when a recorder is installed.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            prometheus_render: None,
        }
    }
}

/// Shared state for every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<BotRegistry>,
    pub devices: Arc<DeviceSessionManager>,
    pub engine: Arc<RouteEngine>,
    pub ingestor: Arc<WebhookIngestor>,
    pub bots: Arc<dyn BotStore>,
    pub rules: Arc<dyn RouteRuleStore>,
    pub messages: Arc<dyn MessageStore>,
    pub hub: Arc<FanoutHub>,
    /// Expected value of the webhook secret header.
    pub webhook_secret: Option<Arc<str>>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Build the full application router.
///
/// - `GET /health`, `GET /metrics`: public
/// - `POST /webhook/{bot_id}`: secret header checked by the handler
/// - `/api/...`: bearer token
/// - `GET /ws`: token checked during the handshake
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/webhook/{bot_id}", post(handlers::webhook))
        .with_state(state.clone());

    let api_routes = api::routes()
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `server.host:server.port` and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), CourierError> {
    let bind_to = (config.host.as_str(), config.port);
    let listener = tokio::net::TcpListener::bind(bind_to).await.map_err(|e| {
        CourierError::Config(format!(
            "cannot listen on {}:{}: {e}",
            config.host, config.port
        ))
    })?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(%local, "gateway listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| CourierError::Internal(format!("http server failed: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
