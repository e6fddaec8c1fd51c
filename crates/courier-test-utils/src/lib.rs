// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier.
//!
//! - [`MemoryStore`]: every store trait over in-process maps
//! - [`MockBotApi`] / [`MockBotFactory`]: recording bot clients with scripted failures
//! - [`MockAccountConnector`] / [`MockAccountClient`]: scripted personal-account sessions

pub mod memory_store;
pub mod mock_account;
pub mod mock_bot;

pub use memory_store::MemoryStore;
pub use mock_account::{DialogFault, dialog, MockAccountBehavior, MockAccountClient, MockAccountConnector};
pub use mock_bot::{BotCall, MockBotApi, MockBotFactory};
