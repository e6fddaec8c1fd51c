// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram bot side of the Courier relay.
//!
//! [`TeloxideBotApi`] implements the outbound bot protocol on teloxide and
//! [`BotRegistry`] keeps one live client per bot account, caching and fanning
//! out everything sent through it.

pub mod client;
pub mod media;
pub mod registry;

pub use client::{TeloxideBotApi, TeloxideFactory};
pub use registry::{BotConnection, BotRegistry, ClearSummary, PollOrigin, RegistryConfig};
