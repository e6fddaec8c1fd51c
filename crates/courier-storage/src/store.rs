// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the store traits.
//!
//! Every call goes through [`with_backoff`], so a busy or locked database is
//! retried a few times before the error reaches the caller.

use std::future::Future;

use async_trait::async_trait;
use courier_config::model::StorageConfig;
use courier_core::retry::{Backoff, with_backoff};
use courier_core::types::{
    AccountProfile, BotAccount, BotId, ChatMember, ChatRecord, Device, DeviceId,
    DeviceSessionRecord, Dialog, NewBotAccount, NewRouteRule, RemoteDialog, RouteRule,
    RouteRulePatch, RuleId, StoredMessage,
};
use courier_core::{
    BotStore, CourierError, DeviceSessionStore, DeviceStore, DialogStore, MessageStore,
    RouteRuleStore,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed store for every table family.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
    backoff: Backoff,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            backoff: Backoff::default(),
        }
    }

    /// Open the database named by `[storage]` and wrap it.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        Ok(Self::new(db))
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Cheap liveness probe, run once before serving.
    pub async fn health_check(&self) -> Result<(), CourierError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(map_tr_err)
    }

    async fn retry<T, F, Fut>(&self, what: &str, op: F) -> Result<T, CourierError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, CourierError>> + Send,
        T: Send,
    {
        with_backoff(self.backoff, what, op).await
    }
}

#[async_trait]
impl BotStore for SqliteStore {
    async fn create_bot(&self, bot: NewBotAccount) -> Result<BotAccount, CourierError> {
        let db = &self.db;
        self.retry("create_bot", move || queries::bots::create_bot(db, bot.clone()))
            .await
    }

    async fn get_bot(&self, id: BotId) -> Result<Option<BotAccount>, CourierError> {
        let db = &self.db;
        self.retry("get_bot", move || queries::bots::get_bot(db, id)).await
    }

    async fn list_bots(&self) -> Result<Vec<BotAccount>, CourierError> {
        let db = &self.db;
        self.retry("list_bots", move || queries::bots::list_bots(db, false))
            .await
    }

    async fn list_active_bots(&self) -> Result<Vec<BotAccount>, CourierError> {
        let db = &self.db;
        self.retry("list_active_bots", move || queries::bots::list_bots(db, true))
            .await
    }

    async fn set_bot_active(&self, id: BotId, active: bool) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("set_bot_active", move || {
            queries::bots::set_bot_active(db, id, active)
        })
        .await
    }

    async fn delete_bot(&self, id: BotId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("delete_bot", move || queries::bots::delete_bot(db, id))
            .await
    }
}

#[async_trait]
impl DeviceStore for SqliteStore {
    async fn create_pending(&self, phone: &str) -> Result<DeviceId, CourierError> {
        let db = &self.db;
        self.retry("create_pending", move || {
            queries::devices::create_pending(db, phone)
        })
        .await
    }

    async fn mark_active(
        &self,
        id: DeviceId,
        profile: &AccountProfile,
    ) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("mark_active", move || {
            queries::devices::mark_active(db, id, profile)
        })
        .await
    }

    async fn mark_inactive(&self, id: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("mark_inactive", move || queries::devices::mark_inactive(db, id))
            .await
    }

    async fn mark_revoked(&self, id: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("mark_revoked", move || queries::devices::mark_revoked(db, id))
            .await
    }

    async fn touch_last_seen(&self, id: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("touch_last_seen", move || {
            queries::devices::touch_last_seen(db, id)
        })
        .await
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, CourierError> {
        let db = &self.db;
        self.retry("get_device", move || queries::devices::get_device(db, id))
            .await
    }

    async fn list_devices(&self) -> Result<Vec<Device>, CourierError> {
        let db = &self.db;
        self.retry("list_devices", move || queries::devices::list_devices(db))
            .await
    }

    async fn delete_device(&self, id: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("delete_device", move || queries::devices::delete_device(db, id))
            .await
    }
}

#[async_trait]
impl DeviceSessionStore for SqliteStore {
    async fn upsert_primary(&self, device: DeviceId, blob: &str) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("upsert_primary", move || {
            queries::device_sessions::upsert_primary(db, device, blob)
        })
        .await
    }

    async fn primary_session(
        &self,
        device: DeviceId,
    ) -> Result<Option<DeviceSessionRecord>, CourierError> {
        let db = &self.db;
        self.retry("primary_session", move || {
            queries::device_sessions::primary_session(db, device)
        })
        .await
    }

    async fn delete_sessions(&self, device: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("delete_sessions", move || {
            queries::device_sessions::delete_sessions(db, device)
        })
        .await
    }
}

#[async_trait]
impl DialogStore for SqliteStore {
    async fn upsert_dialog(
        &self,
        device: DeviceId,
        dialog: &RemoteDialog,
    ) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("upsert_dialog", move || {
            queries::dialogs::upsert_dialog(db, device, dialog)
        })
        .await
    }

    async fn mark_deleted_except(
        &self,
        device: DeviceId,
        keep: &[i64],
    ) -> Result<u64, CourierError> {
        let db = &self.db;
        self.retry("mark_deleted_except", move || {
            queries::dialogs::mark_deleted_except(db, device, keep)
        })
        .await
    }

    async fn list_dialogs(
        &self,
        device: DeviceId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Dialog>, CourierError> {
        let db = &self.db;
        self.retry("list_dialogs", move || {
            queries::dialogs::list_dialogs(db, device, limit, offset)
        })
        .await
    }

    async fn count_dialogs(&self, device: DeviceId) -> Result<u64, CourierError> {
        let db = &self.db;
        self.retry("count_dialogs", move || {
            queries::dialogs::count_dialogs(db, device)
        })
        .await
    }

    async fn record_sync(&self, device: DeviceId) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("record_sync", move || queries::dialogs::record_sync(db, device))
            .await
    }

    async fn last_sync(&self, device: DeviceId) -> Result<Option<String>, CourierError> {
        let db = &self.db;
        self.retry("last_sync", move || queries::dialogs::last_sync(db, device))
            .await
    }
}

#[async_trait]
impl RouteRuleStore for SqliteStore {
    async fn create_rule(&self, rule: NewRouteRule) -> Result<RouteRule, CourierError> {
        let db = &self.db;
        self.retry("create_rule", move || {
            queries::route_rules::create_rule(db, rule.clone())
        })
        .await
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<RouteRule>, CourierError> {
        let db = &self.db;
        self.retry("get_rule", move || queries::route_rules::get_rule(db, id))
            .await
    }

    async fn list_rules_by_device(
        &self,
        device: DeviceId,
    ) -> Result<Vec<RouteRule>, CourierError> {
        let db = &self.db;
        self.retry("list_rules_by_device", move || {
            queries::route_rules::list_rules_by_device(db, device)
        })
        .await
    }

    async fn enabled_rules_for_source(
        &self,
        device: DeviceId,
        chat_id: i64,
    ) -> Result<Vec<RouteRule>, CourierError> {
        let db = &self.db;
        self.retry("enabled_rules_for_source", move || {
            queries::route_rules::enabled_rules_for_source(db, device, chat_id)
        })
        .await
    }

    async fn update_rule(
        &self,
        id: RuleId,
        patch: RouteRulePatch,
    ) -> Result<Option<RouteRule>, CourierError> {
        let db = &self.db;
        self.retry("update_rule", move || {
            queries::route_rules::update_rule(db, id, patch.clone())
        })
        .await
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool, CourierError> {
        let db = &self.db;
        self.retry("delete_rule", move || queries::route_rules::delete_rule(db, id))
            .await
    }

    async fn disable_by_destination(
        &self,
        bot: BotId,
        dest_chat_id: i64,
    ) -> Result<u64, CourierError> {
        let db = &self.db;
        self.retry("disable_by_destination", move || {
            queries::route_rules::disable_by_destination(db, bot, dest_chat_id)
        })
        .await
    }

    async fn disable_by_source(
        &self,
        device: DeviceId,
        source_chat_id: i64,
    ) -> Result<u64, CourierError> {
        let db = &self.db;
        self.retry("disable_by_source", move || {
            queries::route_rules::disable_by_source(db, device, source_chat_id)
        })
        .await
    }

    async fn devices_with_rules(&self) -> Result<Vec<DeviceId>, CourierError> {
        let db = &self.db;
        self.retry("devices_with_rules", move || {
            queries::route_rules::devices_with_rules(db)
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn upsert_chat(&self, chat: &ChatRecord) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("upsert_chat", move || queries::messages::upsert_chat(db, chat))
            .await
    }

    async fn upsert_member(&self, member: &ChatMember) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("upsert_member", move || {
            queries::messages::upsert_member(db, member)
        })
        .await
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, CourierError> {
        let db = &self.db;
        self.retry("insert_message", move || {
            queries::messages::insert_message(db, message)
        })
        .await
    }

    async fn list_chats(&self, bot: BotId) -> Result<Vec<ChatRecord>, CourierError> {
        let db = &self.db;
        self.retry("list_chats", move || queries::messages::list_chats(db, bot))
            .await
    }

    async fn list_members(
        &self,
        bot: BotId,
        chat_id: i64,
    ) -> Result<Vec<ChatMember>, CourierError> {
        let db = &self.db;
        self.retry("list_members", move || {
            queries::messages::list_members(db, bot, chat_id)
        })
        .await
    }

    async fn list_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, CourierError> {
        let db = &self.db;
        self.retry("list_messages", move || {
            queries::messages::list_messages(db, bot, chat_id, limit)
        })
        .await
    }

    async fn delete_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        message_ids: &[i64],
    ) -> Result<u64, CourierError> {
        let db = &self.db;
        self.retry("delete_messages", move || {
            queries::messages::delete_messages(db, bot, chat_id, message_ids)
        })
        .await
    }

    async fn purge_chat(&self, bot: BotId, chat_id: i64) -> Result<(), CourierError> {
        let db = &self.db;
        self.retry("purge_chat", move || {
            queries::messages::purge_chat(db, bot, chat_id)
        })
        .await
    }
}
