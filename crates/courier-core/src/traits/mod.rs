// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait boundaries for the chat platform protocols and the persistent stores.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod account;
pub mod bot;
pub mod store;

pub use account::{
    AccountClient, AccountConnector, AccountUpdate, IncomingMessage, PlatformHandle, RemoteMedia,
    SignInOutcome,
};
pub use bot::{BotApi, BotApiFactory};
pub use store::{BotStore, DeviceSessionStore, DeviceStore, DialogStore, MessageStore, RouteRuleStore};
