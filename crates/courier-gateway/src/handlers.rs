// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public handlers: health, metrics, and bot webhook intake.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use courier_core::{BotId, CourierError};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorResponse};
use crate::server::GatewayState;

/// Header carrying the secret registered with the webhook.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub bots_running: usize,
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        bots_running: state.registry.running().len(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "metrics recorder not installed".to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /webhook/{bot_id}
///
/// Answers as soon as the secret checks out; ingestion runs on its own task.
pub async fn webhook(
    State(state): State<GatewayState>,
    Path(bot_id): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let expected = state
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CourierError::Config("telegram.webhook_secret is missing".into()))?;
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if presented != Some(expected) {
        warn!(bot_id, "webhook rejected: secret mismatch");
        return Err(ApiError::Unauthorized);
    }

    let bot_id = BotId(bot_id);
    let bots = state.bots.clone();
    let ingestor = state.ingestor.clone();
    tokio::spawn(async move {
        match bots.get_bot(bot_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(%bot_id, "webhook for unknown bot dropped");
                return;
            }
            Err(e) => {
                warn!(%bot_id, error = %e, "bot lookup failed, webhook dropped");
                return;
            }
        }
        let update = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
            debug!(%bot_id, error = %e, "webhook body is not JSON");
            Value::Null
        });
        ingestor.ingest(bot_id, update).await;
    });

    Ok(Json(json!({ "ok": true })))
}
