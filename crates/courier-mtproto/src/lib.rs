// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Personal-account side of the Courier relay.
//!
//! [`DeviceSessionManager`] drives the phone, code, and password login flow,
//! keeps one live connection per active device, and turns the messages those
//! connections see into [`DeviceMessageEvent`](courier_core::types::DeviceMessageEvent)s
//! for the rule engine. [`GrammersConnector`] is the production
//! [`AccountConnector`](courier_core::AccountConnector).

pub mod grammers;
pub mod manager;
pub mod media;

pub use grammers::{GrammersClient, GrammersConnector};
pub use manager::{
    DeviceConnection, DeviceSessionManager, DeviceSettings, LoginResult, LoginStatus,
    SyncSummary,
};
