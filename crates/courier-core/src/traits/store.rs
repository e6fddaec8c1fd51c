// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence boundaries consumed by the relay core.
//!
//! Each trait covers one table family. The SQLite implementation lives in
//! `courier-storage`; in-memory versions for tests live in
//! `courier-test-utils`.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{
    AccountProfile, BotAccount, BotId, ChatMember, ChatRecord, Device, DeviceId,
    DeviceSessionRecord, Dialog, NewBotAccount, NewRouteRule, RemoteDialog, RouteRule,
    RouteRulePatch, RuleId, StoredMessage,
};

/// Bot accounts owned by the admin data store.
#[async_trait]
pub trait BotStore: Send + Sync + 'static {
    async fn create_bot(&self, bot: NewBotAccount) -> Result<BotAccount, CourierError>;
    async fn get_bot(&self, id: BotId) -> Result<Option<BotAccount>, CourierError>;
    async fn list_bots(&self) -> Result<Vec<BotAccount>, CourierError>;
    async fn list_active_bots(&self) -> Result<Vec<BotAccount>, CourierError>;
    async fn set_bot_active(&self, id: BotId, active: bool) -> Result<(), CourierError>;
    async fn delete_bot(&self, id: BotId) -> Result<(), CourierError>;
}

/// Device records and their lifecycle transitions.
#[async_trait]
pub trait DeviceStore: Send + Sync + 'static {
    /// Inserts a device in `pending` and returns its id.
    async fn create_pending(&self, phone: &str) -> Result<DeviceId, CourierError>;
    async fn mark_active(&self, id: DeviceId, profile: &AccountProfile)
    -> Result<(), CourierError>;
    async fn mark_inactive(&self, id: DeviceId) -> Result<(), CourierError>;
    async fn mark_revoked(&self, id: DeviceId) -> Result<(), CourierError>;
    async fn touch_last_seen(&self, id: DeviceId) -> Result<(), CourierError>;
    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, CourierError>;
    async fn list_devices(&self) -> Result<Vec<Device>, CourierError>;
    async fn delete_device(&self, id: DeviceId) -> Result<(), CourierError>;
}

/// Encrypted session blobs, one primary row per device.
#[async_trait]
pub trait DeviceSessionStore: Send + Sync + 'static {
    /// Replaces the primary blob for a device, inserting it if absent.
    async fn upsert_primary(&self, device: DeviceId, blob: &str) -> Result<(), CourierError>;
    async fn primary_session(
        &self,
        device: DeviceId,
    ) -> Result<Option<DeviceSessionRecord>, CourierError>;
    async fn delete_sessions(&self, device: DeviceId) -> Result<(), CourierError>;
}

/// Locally cached, soft-deleted snapshot of each device's dialogs.
#[async_trait]
pub trait DialogStore: Send + Sync + 'static {
    /// Inserts or refreshes a dialog, clearing its `deleted` flag.
    async fn upsert_dialog(&self, device: DeviceId, dialog: &RemoteDialog)
    -> Result<(), CourierError>;
    /// Marks every dialog of `device` not in `keep` as deleted.
    ///
    /// An empty `keep` list marks all of them.
    async fn mark_deleted_except(&self, device: DeviceId, keep: &[i64])
    -> Result<u64, CourierError>;
    async fn list_dialogs(
        &self,
        device: DeviceId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Dialog>, CourierError>;
    async fn count_dialogs(&self, device: DeviceId) -> Result<u64, CourierError>;
    async fn record_sync(&self, device: DeviceId) -> Result<(), CourierError>;
    async fn last_sync(&self, device: DeviceId) -> Result<Option<String>, CourierError>;
}

/// Forwarding rules.
#[async_trait]
pub trait RouteRuleStore: Send + Sync + 'static {
    async fn create_rule(&self, rule: NewRouteRule) -> Result<RouteRule, CourierError>;
    async fn get_rule(&self, id: RuleId) -> Result<Option<RouteRule>, CourierError>;
    async fn list_rules_by_device(&self, device: DeviceId) -> Result<Vec<RouteRule>, CourierError>;
    /// Enabled rules whose source is `(device, chat_id)`.
    async fn enabled_rules_for_source(
        &self,
        device: DeviceId,
        chat_id: i64,
    ) -> Result<Vec<RouteRule>, CourierError>;
    async fn update_rule(
        &self,
        id: RuleId,
        patch: RouteRulePatch,
    ) -> Result<Option<RouteRule>, CourierError>;
    async fn delete_rule(&self, id: RuleId) -> Result<bool, CourierError>;
    /// Disables every rule delivering to `(bot, dest_chat_id)`. Returns rows changed.
    async fn disable_by_destination(
        &self,
        bot: BotId,
        dest_chat_id: i64,
    ) -> Result<u64, CourierError>;
    /// Disables every rule reading from `(device, source_chat_id)`. Returns rows changed.
    async fn disable_by_source(
        &self,
        device: DeviceId,
        source_chat_id: i64,
    ) -> Result<u64, CourierError>;
    /// Distinct devices that own at least one rule.
    async fn devices_with_rules(&self) -> Result<Vec<DeviceId>, CourierError>;
}

/// Bot-side chats, participants, and messages.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    async fn upsert_chat(&self, chat: &ChatRecord) -> Result<(), CourierError>;
    async fn upsert_member(&self, member: &ChatMember) -> Result<(), CourierError>;
    /// Inserts a message unless `(bot, chat, message_id)` is already stored.
    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, CourierError>;
    async fn list_chats(&self, bot: BotId) -> Result<Vec<ChatRecord>, CourierError>;
    async fn list_members(&self, bot: BotId, chat_id: i64)
    -> Result<Vec<ChatMember>, CourierError>;
    async fn list_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, CourierError>;
    async fn delete_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        message_ids: &[i64],
    ) -> Result<u64, CourierError>;
    /// Removes the chat row, its members, and its messages.
    async fn purge_chat(&self, bot: BotId, chat_id: i64) -> Result<(), CourierError>;
}
