// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin JSON API under `/api`.

pub mod bots;
pub mod chats;
pub mod devices;
pub mod rules;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Ack = Ack { ok: true };
}

/// `?limit=&offset=` paging.
#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Paging {
    pub const DEFAULT_LIMIT: u32 = 100;
    pub const MAX_LIMIT: u32 = 500;

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

pub fn routes() -> Router<GatewayState> {
    Router::new()
        // devices
        .route("/api/devices", get(devices::list))
        .route("/api/devices/login", post(devices::start_login))
        .route(
            "/api/devices/{id}",
            get(devices::status).delete(devices::delete),
        )
        .route("/api/devices/{id}/code", post(devices::submit_code))
        .route("/api/devices/{id}/password", post(devices::submit_password))
        .route("/api/devices/{id}/deactivate", post(devices::deactivate))
        .route("/api/devices/{id}/revoke", post(devices::revoke))
        .route("/api/devices/{id}/reconnect", post(devices::reconnect))
        .route("/api/devices/{id}/sync", post(devices::sync))
        .route("/api/devices/{id}/dialogs", get(devices::dialogs))
        .route("/api/devices/{id}/rules", get(rules::list_by_device))
        // rules
        .route("/api/rules", post(rules::create))
        .route("/api/rules/test", post(rules::test))
        .route(
            "/api/rules/{id}",
            get(rules::get).patch(rules::update).delete(rules::delete),
        )
        // bots
        .route("/api/bots", get(bots::list).post(bots::create))
        .route("/api/bots/{id}", get(bots::get).delete(bots::delete))
        .route("/api/bots/{id}/active", put(bots::set_active))
        .route("/api/bots/{id}/start", post(bots::start))
        .route("/api/bots/{id}/stop", post(bots::stop))
        .route("/api/bots/{id}/restart", post(bots::restart))
        .route(
            "/api/bots/{id}/webhook",
            get(bots::webhook_info).post(bots::register_webhook),
        )
        .route("/api/bots/{id}/bulk", post(bots::send_bulk))
        .route("/api/bots/{id}/forward", post(bots::forward_batch))
        // chats of a bot
        .route("/api/bots/{id}/chats", get(chats::list))
        .route("/api/bots/{id}/chats/{chat}/members", get(chats::members))
        .route(
            "/api/bots/{id}/chats/{chat}/members/count",
            get(chats::member_count),
        )
        .route(
            "/api/bots/{id}/chats/{chat}/messages",
            get(chats::messages).post(chats::send_text),
        )
        .route(
            "/api/bots/{id}/chats/{chat}/messages/delete",
            post(chats::delete_batch),
        )
        .route(
            "/api/bots/{id}/chats/{chat}/messages/{message_id}",
            patch(chats::edit).delete(chats::delete_message),
        )
        .route(
            "/api/bots/{id}/chats/{chat}/messages/{message_id}/reaction",
            post(chats::react),
        )
        .route(
            "/api/bots/{id}/chats/{chat}/messages/{message_id}/pin",
            post(chats::pin),
        )
        .route("/api/bots/{id}/chats/{chat}/pin", delete(chats::unpin))
        .route("/api/bots/{id}/chats/{chat}/media", post(chats::send_media))
        .route("/api/bots/{id}/chats/{chat}/polls", post(chats::send_poll))
        .route(
            "/api/bots/{id}/chats/{chat}/buttons",
            post(chats::send_buttons),
        )
        .route("/api/bots/{id}/chats/{chat}/title", put(chats::set_title))
        .route("/api/bots/{id}/chats/{chat}/clear", post(chats::clear))
}
