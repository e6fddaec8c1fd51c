// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device login and lifecycle.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use courier_core::DeviceId;
use courier_core::types::{Device, DialogPage};
use courier_mtproto::{LoginResult, SyncSummary};
use serde::{Deserialize, Serialize};

use super::{Ack, Paging};
use crate::error::ApiError;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct StartLoginRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct StartLoginResponse {
    pub device_id: DeviceId,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

/// POST /api/devices/login
pub async fn start_login(
    State(state): State<GatewayState>,
    Json(body): Json<StartLoginRequest>,
) -> Result<Json<StartLoginResponse>, ApiError> {
    let phone = body.phone.trim();
    if phone.is_empty() {
        return Err(ApiError::bad_request("phone is required"));
    }
    let device_id = state.devices.start_login(phone).await?;
    Ok(Json(StartLoginResponse {
        device_id,
        status: "code_sent",
    }))
}

/// POST /api/devices/{id}/code
pub async fn submit_code(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<CodeRequest>,
) -> Result<Json<LoginResult>, ApiError> {
    let code = body.code.trim();
    if code.is_empty() {
        return Err(ApiError::bad_request("code is required"));
    }
    Ok(Json(state.devices.submit_code(DeviceId(id), code).await?))
}

/// POST /api/devices/{id}/password
pub async fn submit_password(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Json(body): Json<PasswordRequest>,
) -> Result<Json<LoginResult>, ApiError> {
    if body.password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }
    Ok(Json(
        state
            .devices
            .submit_password(DeviceId(id), &body.password)
            .await?,
    ))
}

pub async fn list(State(state): State<GatewayState>) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(state.devices.list().await?))
}

pub async fn status(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(state.devices.status(DeviceId(id)).await?))
}

pub async fn deactivate(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    state.devices.deactivate(DeviceId(id)).await?;
    Ok(Json(Ack::OK))
}

pub async fn revoke(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    state.devices.revoke(DeviceId(id)).await?;
    Ok(Json(Ack::OK))
}

pub async fn reconnect(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    state.devices.reconnect(DeviceId(id)).await?;
    Ok(Json(Ack::OK))
}

pub async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<Ack>, ApiError> {
    state.devices.delete(DeviceId(id)).await?;
    Ok(Json(Ack::OK))
}

/// POST /api/devices/{id}/sync
pub async fn sync(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
) -> Result<Json<SyncSummary>, ApiError> {
    Ok(Json(state.devices.sync_dialogs(DeviceId(id)).await?))
}

/// GET /api/devices/{id}/dialogs, served from the dialog cache.
pub async fn dialogs(
    State(state): State<GatewayState>,
    Path(id): Path<i64>,
    Query(paging): Query<Paging>,
) -> Result<Json<DialogPage>, ApiError> {
    Ok(Json(
        state
            .devices
            .dialogs(DeviceId(id), paging.limit(), paging.offset())
            .await?,
    ))
}
