// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot accounts and their live connections.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use courier_core::types::{BatchOutcome, BotAccount, NewBotAccount, WebhookInfo};
use courier_core::{BotId, CourierError};
use serde::{Deserialize, Serialize};

use super::Ack;
use crate::error::ApiError;
use crate::server::GatewayState;

/// A bot account plus whether a client is live. The token never leaves.
#[derive(Debug, Serialize)]
pub struct BotView {
    #[serde(flatten)]
    pub bot: BotAccount,
    pub running: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct Stopped {
    pub stopped: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookRegistered {
    pub webhook_url: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub chat_ids: Vec<i64>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ForwardRequest {
    pub from_chat_id: i64,
    pub message_id: i32,
    pub to_chat_ids: Vec<i64>,
}

async fn load(state: &GatewayState, id: BotId) -> Result<BotAccount, ApiError> {
    state
        .bots
        .get_bot(id)
        .await?
        .ok_or_else(|| CourierError::not_found("bot", id).into())
}

fn view(state: &GatewayState, bot: BotAccount) -> BotView {
    let running = state.registry.is_running(bot.id);
    BotView { bot, running }
}

/// Start the client and point its webhook here. Failures are logged only.
async fn bring_up(state: &GatewayState, id: BotId) {
    if let Err(e) = state.registry.start(id).await {
        tracing::warn!(bot_id = %id, error = %e, "bot start failed");
        return;
    }
    if let Err(e) = state.registry.register_delivery(id).await {
        tracing::warn!(bot_id = %id, error = %e, "webhook registration failed");
    }
}

pub async fn list(State(state): State<GatewayState>) -> Result<Json<Vec<BotView>>, ApiError> {
    let bots = state.bots.list_bots().await?;
    Ok(Json(bots.into_iter().map(|bot| view(&state, bot)).collect()))
}

pub async fn get(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<BotView>, ApiError> {
    let bot = load(&state, BotId(id)).await?;
    Ok(Json(view(&state, bot)))
}

/// POST /api/bots
///
/// An active bot is started and registered straight away, best-effort.
pub async fn create(
    State(state): State<GatewayState>,
    Json(body): Json<NewBotAccount>,
) -> Result<(StatusCode, Json<BotView>), ApiError> {
    if body.name.trim().is_empty() || body.token.trim().is_empty() {
        return Err(ApiError::bad_request("name and token are required"));
    }
    let bot = state.bots.create_bot(body).await?;
    tracing::info!(bot_id = %bot.id, name = %bot.name, "bot account created");
    if bot.active {
        bring_up(&state, bot.id).await;
    }
    Ok((StatusCode::CREATED, Json(view(&state, bot))))
}

pub async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    let id = BotId(id);
    load(&state, id).await?;
    state.registry.stop(id).await;
    state.bots.delete_bot(id).await?;
    tracing::info!(bot_id = %id, "bot account deleted");
    Ok(Json(Ack::OK))
}

/// PUT /api/bots/{id}/active
pub async fn set_active(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<ActiveRequest>,
) -> Result<Json<BotView>, ApiError> {
    let id = BotId(id);
    load(&state, id).await?;
    state.bots.set_bot_active(id, body.active).await?;
    if body.active {
        bring_up(&state, id).await;
    } else {
        state.registry.stop(id).await;
    }
    let bot = load(&state, id).await?;
    Ok(Json(view(&state, bot)))
}

pub async fn start(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    state.registry.start(BotId(id)).await?;
    Ok(Json(Ack::OK))
}

pub async fn stop(State(state): State<GatewayState>, Path(id): Path<i64>) -> Json<Stopped> {
    Json(Stopped {
        stopped: state.registry.stop(BotId(id)).await,
    })
}

/// POST /api/bots/{id}/restart: restart and re-register the webhook.
pub async fn restart(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookRegistered>, ApiError> {
    let webhook_url = state.registry.restart_and_register(BotId(id)).await?;
    Ok(Json(WebhookRegistered { webhook_url }))
}

pub async fn register_webhook(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookRegistered>, ApiError> {
    let webhook_url = state.registry.register_delivery(BotId(id)).await?;
    Ok(Json(WebhookRegistered { webhook_url }))
}

pub async fn webhook_info(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<WebhookInfo>, ApiError> {
    Ok(Json(state.registry.webhook_info(BotId(id)).await?))
}

/// POST /api/bots/{id}/bulk
pub async fn send_bulk(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<Vec<BatchOutcome>>, ApiError> {
    if body.chat_ids.is_empty() || body.text.trim().is_empty() {
        return Err(ApiError::bad_request("chat_ids and text are required"));
    }
    Ok(Json(
        state
            .registry
            .send_bulk(BotId(id), &body.chat_ids, &body.text)
            .await?,
    ))
}

/// POST /api/bots/{id}/forward
pub async fn forward_batch(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<ForwardRequest>,
) -> Result<Json<Vec<BatchOutcome>>, ApiError> {
    if body.to_chat_ids.is_empty() {
        return Err(ApiError::bad_request("to_chat_ids is required"));
    }
    Ok(Json(
        state
            .registry
            .forward_batch(BotId(id), body.from_chat_id, body.message_id, &body.to_chat_ids)
            .await?,
    ))
}
