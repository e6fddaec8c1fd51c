// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface for Courier.
//!
//! - `POST /webhook/{bot_id}`: inbound bot updates, guarded by the secret header
//! - `/api/...`: admin JSON API behind a bearer token
//! - `GET /ws`: websocket subscription to a fan-out room
//! - `GET /health`, `GET /metrics`: public probes

pub mod api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use handlers::SECRET_HEADER;
pub use server::{GatewayState, HealthState, router, start_server};
