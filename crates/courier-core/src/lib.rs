// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier relay.
//!
//! This crate provides the error taxonomy, domain types, and the trait
//! boundaries (bot protocol, account protocol, persistent stores) that the
//! registry, device, relay, and gateway crates are written against.

pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::CourierError;
pub use types::{BotId, DeviceId, RuleId};

pub use traits::{
    AccountClient, AccountConnector, BotApi, BotApiFactory, BotStore, DeviceSessionStore,
    DeviceStore, DialogStore, MessageStore, RouteRuleStore,
};
