// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the registry, device, relay, and storage crates.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a bot account in the admin store.
    BotId
);
id_type!(
    /// Identifier of a logged-in personal account.
    DeviceId
);
id_type!(
    /// Identifier of a forwarding rule.
    RuleId
);

// --- Bots ---

/// An automated platform identity authenticated by a static token.
#[derive(Clone, Serialize)]
pub struct BotAccount {
    pub id: BotId,
    pub name: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub token: String,
    pub active: bool,
    pub created_at: String,
}

impl fmt::Debug for BotAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotAccount")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .field("active", &self.active)
            .finish()
    }
}

/// Fields needed to register a new bot account.
#[derive(Clone, Deserialize)]
pub struct NewBotAccount {
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    pub token: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

// --- Devices ---

/// Lifecycle of a personal-account device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Pending,
    Active,
    Inactive,
    Revoked,
}

/// A personal account logged in via phone, code and optional password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub phone: String,
    pub status: DeviceStatus,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub last_seen_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Profile fetched from the platform after a successful sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl AccountProfile {
    /// Builds a profile, joining first and last name into the display name.
    pub fn from_names(
        user_id: Option<i64>,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Self {
        let joined = [first_name, last_name]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            user_id,
            username: username.filter(|u| !u.is_empty()).map(str::to_string),
            display_name: (!joined.is_empty()).then_some(joined),
        }
    }
}

/// Encrypted session material bound to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSessionRecord {
    pub device_id: DeviceId,
    pub session_blob: String,
    pub is_primary: bool,
    pub updated_at: String,
}

// --- Dialogs ---

/// Kind of chat visible to a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Channel,
    Chat,
    User,
}

/// A chat as reported by the account protocol's listing call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDialog {
    pub peer_id: i64,
    pub title: String,
    pub kind: DialogKind,
    pub username: Option<String>,
}

/// Result of a live dialog listing.
///
/// `complete` is false when the listing stopped at a limit before the
/// platform ran out of dialogs.
#[derive(Debug, Clone, Default)]
pub struct DialogSnapshot {
    pub dialogs: Vec<RemoteDialog>,
    pub complete: bool,
}

/// A cached dialog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dialog {
    pub device_id: DeviceId,
    pub peer_id: i64,
    pub title: String,
    pub kind: DialogKind,
    pub username: Option<String>,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One page of cached dialogs plus the total non-deleted count.
#[derive(Debug, Clone, Serialize)]
pub struct DialogPage {
    pub data: Vec<Dialog>,
    pub total: u64,
}

// --- Route rules ---

/// A mapping from a device's source chat to a bot's destination chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRule {
    pub id: RuleId,
    pub device_id: DeviceId,
    pub source_chat_id: i64,
    pub bot_id: BotId,
    pub dest_chat_id: i64,
    pub title: Option<String>,
    pub filters: Option<serde_json::Value>,
    pub transforms: Option<serde_json::Value>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when creating a route rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRouteRule {
    pub device_id: DeviceId,
    pub source_chat_id: i64,
    pub bot_id: BotId,
    pub dest_chat_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    #[serde(default)]
    pub transforms: Option<serde_json::Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Partial update of a route rule; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteRulePatch {
    #[serde(default)]
    pub source_chat_id: Option<i64>,
    #[serde(default)]
    pub bot_id: Option<BotId>,
    #[serde(default)]
    pub dest_chat_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
    #[serde(default)]
    pub transforms: Option<serde_json::Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

// --- Media and messages ---

/// Outbound media category on the bot protocol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

/// A downloaded or uploaded media file.
#[derive(Clone, PartialEq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub data: Vec<u8>,
    pub file_name: String,
    pub mime_type: Option<String>,
}

impl fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPayload")
            .field("kind", &self.kind)
            .field("bytes", &self.data.len())
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// A message observed on a device connection, normalized for the relay.
#[derive(Debug, Clone)]
pub struct DeviceMessageEvent {
    pub device_id: DeviceId,
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub media: Option<Arc<MediaPayload>>,
    pub raw: serde_json::Value,
}

/// A message the bot protocol reports as sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub date: i64,
    pub text: Option<String>,
    pub raw: serde_json::Value,
}

/// A poll to post through a bot.
#[derive(Debug, Clone, Deserialize)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
    #[serde(default)]
    pub allows_multiple_answers: Option<bool>,
}

/// Current webhook registration as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookInfo {
    pub url: String,
    pub pending_update_count: u32,
    pub last_error_message: Option<String>,
}

/// Outcome of one target inside a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Sent,
    Failed,
}

/// Per-target result of a bulk send, forward, or delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub chat_id: i64,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn sent(chat_id: i64, message_id: Option<i32>) -> Self {
        Self {
            chat_id,
            status: BatchStatus::Sent,
            message_id,
            error: None,
        }
    }

    pub fn failed(chat_id: i64, error: impl ToString) -> Self {
        Self {
            chat_id,
            status: BatchStatus::Failed,
            message_id: None,
            error: Some(error.to_string()),
        }
    }
}

// --- Bot-side cache rows ---

/// A chat a bot participates in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRecord {
    pub bot_id: BotId,
    pub chat_id: i64,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// A participant seen in a bot chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMember {
    pub bot_id: BotId,
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: bool,
    pub status: String,
}

/// A cached bot-side message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub bot_id: BotId,
    pub chat_id: i64,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub text: Option<String>,
    pub raw: serde_json::Value,
    pub date: i64,
}
