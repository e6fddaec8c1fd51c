// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route rule management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use courier_core::types::{NewRouteRule, RouteRule, RouteRulePatch, SentMessage};
use courier_core::{BotId, CourierError, DeviceId, RuleId};
use courier_relay::transform::RuleConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Body of `POST /api/rules`. Ids are optional here so a missing one gets a
/// readable 400 instead of a deserializer message.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRuleRequest {
    pub device_id: Option<DeviceId>,
    pub source_chat_id: Option<i64>,
    pub bot_id: Option<BotId>,
    pub dest_chat_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filters: Option<Value>,
    #[serde(default)]
    pub transforms: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl CreateRuleRequest {
    fn validate(self) -> Result<NewRouteRule, ApiError> {
        let (Some(device_id), Some(source_chat_id), Some(bot_id), Some(dest_chat_id)) = (
            self.device_id.filter(|id| id.0 != 0),
            self.source_chat_id.filter(|id| *id != 0),
            self.bot_id.filter(|id| id.0 != 0),
            self.dest_chat_id.filter(|id| *id != 0),
        ) else {
            return Err(ApiError::bad_request(
                "device_id, source_chat_id, bot_id and dest_chat_id are required",
            ));
        };
        check_config(self.filters.as_ref(), self.transforms.as_ref())?;
        Ok(NewRouteRule {
            device_id,
            source_chat_id,
            bot_id,
            dest_chat_id,
            title: self.title,
            filters: self.filters,
            transforms: self.transforms,
            enabled: self.enabled,
        })
    }
}

fn check_config(filters: Option<&Value>, transforms: Option<&Value>) -> Result<(), ApiError> {
    RuleConfig::from_values(filters, transforms)
        .map(|_| ())
        .map_err(|e| ApiError::bad_request(format!("invalid filters or transforms: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct TestRouteRequest {
    pub bot_id: BotId,
    pub dest_chat_id: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: RuleId,
}

/// POST /api/rules
pub async fn create(
    State(state): State<GatewayState>,
    Json(body): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<RouteRule>), ApiError> {
    let rule = body.validate()?;
    state.devices.status(rule.device_id).await?;
    if state.bots.get_bot(rule.bot_id).await?.is_none() {
        return Err(CourierError::not_found("bot", rule.bot_id).into());
    }
    let rule = state.rules.create_rule(rule).await?;
    tracing::info!(
        rule_id = %rule.id,
        device_id = %rule.device_id,
        source_chat_id = rule.source_chat_id,
        bot_id = %rule.bot_id,
        dest_chat_id = rule.dest_chat_id,
        "route rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/devices/{id}/rules
pub async fn list_by_device(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RouteRule>>, ApiError> {
    Ok(Json(state.rules.list_rules_by_device(DeviceId(id)).await?))
}

pub async fn get(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<RouteRule>, ApiError> {
    let id = RuleId(id);
    let rule = state
        .rules
        .get_rule(id)
        .await?
        .ok_or_else(|| CourierError::not_found("rule", id))?;
    Ok(Json(rule))
}

/// PATCH /api/rules/{id}
pub async fn update(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(patch): Json<RouteRulePatch>,
) -> Result<Json<RouteRule>, ApiError> {
    check_config(patch.filters.as_ref(), patch.transforms.as_ref())?;
    let id = RuleId(id);
    let rule = state
        .rules
        .update_rule(id, patch)
        .await?
        .ok_or_else(|| CourierError::not_found("rule", id))?;
    tracing::info!(rule_id = %id, enabled = rule.enabled, "route rule updated");
    Ok(Json(rule))
}

pub async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    let id = RuleId(id);
    if !state.rules.delete_rule(id).await? {
        return Err(CourierError::not_found("rule", id).into());
    }
    tracing::info!(rule_id = %id, "route rule deleted");
    Ok(Json(Deleted { deleted: id }))
}

/// POST /api/rules/test: one direct send, no rule matching.
pub async fn test(
    State(state): State<GatewayState>,
    Json(body): Json<TestRouteRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    let sent = state
        .engine
        .test_route(body.bot_id, body.dest_chat_id, body.text.as_deref())
        .await?;
    Ok(Json(sent))
}
