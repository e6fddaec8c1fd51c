// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of every store trait.
//!
//! Behaves like the SQLite store for the cases the relay depends on
//! (revoked devices stay revoked, dialogs are soft-deleted, messages are
//! insert-if-absent). Individual table families can be told to fail so
//! best-effort paths can be tested.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::types::{
    AccountProfile, BotAccount, BotId, ChatMember, ChatRecord, Device, DeviceId,
    DeviceSessionRecord, DeviceStatus, Dialog, NewBotAccount, NewRouteRule, RemoteDialog,
    RouteRule, RouteRulePatch, RuleId, StoredMessage,
};
use courier_core::{
    BotStore, CourierError, DeviceSessionStore, DeviceStore, DialogStore, MessageStore,
    RouteRuleStore,
};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn injected(what: &str) -> CourierError {
    CourierError::Storage {
        source: format!("injected {what} failure").into(),
    }
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    bots: BTreeMap<BotId, BotAccount>,
    devices: BTreeMap<DeviceId, Device>,
    sessions: HashMap<DeviceId, DeviceSessionRecord>,
    dialogs: BTreeMap<(DeviceId, i64), Dialog>,
    syncs: HashMap<DeviceId, String>,
    rules: BTreeMap<RuleId, RouteRule>,
    chats: BTreeMap<(BotId, i64), ChatRecord>,
    members: BTreeMap<(BotId, i64, i64), ChatMember>,
    messages: BTreeMap<(BotId, i64, i64), StoredMessage>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_chats: AtomicBool,
    fail_members: AtomicBool,
    fail_messages: AtomicBool,
    fail_rule_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `upsert_chat` fail.
    pub fn fail_chats(&self, fail: bool) {
        self.fail_chats.store(fail, Ordering::SeqCst);
    }

    /// Make `upsert_member` fail.
    pub fn fail_members(&self, fail: bool) {
        self.fail_members.store(fail, Ordering::SeqCst);
    }

    /// Make `insert_message` fail.
    pub fn fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    /// Make the bulk rule disables fail.
    pub fn fail_rule_updates(&self, fail: bool) {
        self.fail_rule_updates.store(fail, Ordering::SeqCst);
    }

    /// Insert a device directly in the given status.
    pub async fn seed_device(&self, phone: &str, status: DeviceStatus) -> DeviceId {
        let mut inner = self.inner.lock().await;
        let id = DeviceId(inner.next_id());
        let ts = now();
        inner.devices.insert(
            id,
            Device {
                id,
                phone: phone.to_string(),
                status,
                username: None,
                display_name: None,
                last_seen_at: None,
                created_at: ts.clone(),
                updated_at: ts,
            },
        );
        id
    }

    /// Every cached dialog of a device, deleted ones included.
    pub async fn all_dialogs(&self, device: DeviceId) -> Vec<Dialog> {
        let inner = self.inner.lock().await;
        inner
            .dialogs
            .values()
            .filter(|d| d.device_id == device)
            .cloned()
            .collect()
    }

    pub async fn chat(&self, bot: BotId, chat_id: i64) -> Option<ChatRecord> {
        self.inner.lock().await.chats.get(&(bot, chat_id)).cloned()
    }
}

#[async_trait]
impl BotStore for MemoryStore {
    async fn create_bot(&self, bot: NewBotAccount) -> Result<BotAccount, CourierError> {
        let mut inner = self.inner.lock().await;
        let id = BotId(inner.next_id());
        let account = BotAccount {
            id,
            name: bot.name,
            username: bot.username,
            token: bot.token,
            active: bot.active,
            created_at: now(),
        };
        inner.bots.insert(id, account.clone());
        Ok(account)
    }

    async fn get_bot(&self, id: BotId) -> Result<Option<BotAccount>, CourierError> {
        Ok(self.inner.lock().await.bots.get(&id).cloned())
    }

    async fn list_bots(&self) -> Result<Vec<BotAccount>, CourierError> {
        Ok(self.inner.lock().await.bots.values().cloned().collect())
    }

    async fn list_active_bots(&self) -> Result<Vec<BotAccount>, CourierError> {
        Ok(self
            .inner
            .lock()
            .await
            .bots
            .values()
            .filter(|b| b.active)
            .cloned()
            .collect())
    }

    async fn set_bot_active(&self, id: BotId, active: bool) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        let bot = inner
            .bots
            .get_mut(&id)
            .ok_or_else(|| CourierError::not_found("bot", id))?;
        bot.active = active;
        Ok(())
    }

    async fn delete_bot(&self, id: BotId) -> Result<(), CourierError> {
        self.inner.lock().await.bots.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn create_pending(&self, phone: &str) -> Result<DeviceId, CourierError> {
        Ok(self.seed_device(phone, DeviceStatus::Pending).await)
    }

    async fn mark_active(
        &self,
        id: DeviceId,
        profile: &AccountProfile,
    ) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        let device = inner
            .devices
            .get_mut(&id)
            .filter(|d| d.status != DeviceStatus::Revoked)
            .ok_or_else(|| CourierError::not_found("device", id))?;
        let ts = now();
        device.status = DeviceStatus::Active;
        device.username = profile.username.clone();
        device.display_name = profile.display_name.clone();
        device.last_seen_at = Some(ts.clone());
        device.updated_at = ts;
        Ok(())
    }

    async fn mark_inactive(&self, id: DeviceId) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        if let Some(device) = inner.devices.get_mut(&id)
            && device.status != DeviceStatus::Revoked
        {
            device.status = DeviceStatus::Inactive;
            device.updated_at = now();
        }
        Ok(())
    }

    async fn mark_revoked(&self, id: DeviceId) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        if let Some(device) = inner.devices.get_mut(&id) {
            device.status = DeviceStatus::Revoked;
            device.updated_at = now();
        }
        Ok(())
    }

    async fn touch_last_seen(&self, id: DeviceId) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        if let Some(device) = inner.devices.get_mut(&id) {
            device.last_seen_at = Some(now());
        }
        Ok(())
    }

    async fn get_device(&self, id: DeviceId) -> Result<Option<Device>, CourierError> {
        Ok(self.inner.lock().await.devices.get(&id).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, CourierError> {
        Ok(self.inner.lock().await.devices.values().cloned().collect())
    }

    async fn delete_device(&self, id: DeviceId) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        inner.devices.remove(&id);
        inner.sessions.remove(&id);
        inner.dialogs.retain(|(device, _), _| *device != id);
        inner.syncs.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DeviceSessionStore for MemoryStore {
    async fn upsert_primary(&self, device: DeviceId, blob: &str) -> Result<(), CourierError> {
        self.inner.lock().await.sessions.insert(
            device,
            DeviceSessionRecord {
                device_id: device,
                session_blob: blob.to_string(),
                is_primary: true,
                updated_at: now(),
            },
        );
        Ok(())
    }

    async fn primary_session(
        &self,
        device: DeviceId,
    ) -> Result<Option<DeviceSessionRecord>, CourierError> {
        Ok(self.inner.lock().await.sessions.get(&device).cloned())
    }

    async fn delete_sessions(&self, device: DeviceId) -> Result<(), CourierError> {
        self.inner.lock().await.sessions.remove(&device);
        Ok(())
    }
}

#[async_trait]
impl DialogStore for MemoryStore {
    async fn upsert_dialog(
        &self,
        device: DeviceId,
        dialog: &RemoteDialog,
    ) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        let ts = now();
        let entry = inner
            .dialogs
            .entry((device, dialog.peer_id))
            .or_insert_with(|| Dialog {
                device_id: device,
                peer_id: dialog.peer_id,
                title: String::new(),
                kind: dialog.kind,
                username: None,
                deleted: false,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            });
        entry.title = dialog.title.clone();
        entry.kind = dialog.kind;
        entry.username = dialog.username.clone();
        entry.deleted = false;
        entry.updated_at = ts;
        Ok(())
    }

    async fn mark_deleted_except(
        &self,
        device: DeviceId,
        keep: &[i64],
    ) -> Result<u64, CourierError> {
        let mut inner = self.inner.lock().await;
        let mut changed = 0;
        for dialog in inner.dialogs.values_mut() {
            if dialog.device_id == device && !dialog.deleted && !keep.contains(&dialog.peer_id) {
                dialog.deleted = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn list_dialogs(
        &self,
        device: DeviceId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Dialog>, CourierError> {
        let inner = self.inner.lock().await;
        let mut live: Vec<Dialog> = inner
            .dialogs
            .values()
            .filter(|d| d.device_id == device && !d.deleted)
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.peer_id.cmp(&b.peer_id))
        });
        Ok(live
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_dialogs(&self, device: DeviceId) -> Result<u64, CourierError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dialogs
            .values()
            .filter(|d| d.device_id == device && !d.deleted)
            .count() as u64)
    }

    async fn record_sync(&self, device: DeviceId) -> Result<(), CourierError> {
        self.inner.lock().await.syncs.insert(device, now());
        Ok(())
    }

    async fn last_sync(&self, device: DeviceId) -> Result<Option<String>, CourierError> {
        Ok(self.inner.lock().await.syncs.get(&device).cloned())
    }
}

#[async_trait]
impl RouteRuleStore for MemoryStore {
    async fn create_rule(&self, rule: NewRouteRule) -> Result<RouteRule, CourierError> {
        let mut inner = self.inner.lock().await;
        let id = RuleId(inner.next_id());
        let ts = now();
        let created = RouteRule {
            id,
            device_id: rule.device_id,
            source_chat_id: rule.source_chat_id,
            bot_id: rule.bot_id,
            dest_chat_id: rule.dest_chat_id,
            title: rule.title,
            filters: rule.filters.filter(|v| !v.is_null()),
            transforms: rule.transforms.filter(|v| !v.is_null()),
            enabled: rule.enabled.unwrap_or(true),
            created_at: ts.clone(),
            updated_at: ts,
        };
        inner.rules.insert(id, created.clone());
        Ok(created)
    }

    async fn get_rule(&self, id: RuleId) -> Result<Option<RouteRule>, CourierError> {
        Ok(self.inner.lock().await.rules.get(&id).cloned())
    }

    async fn list_rules_by_device(
        &self,
        device: DeviceId,
    ) -> Result<Vec<RouteRule>, CourierError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rules
            .values()
            .filter(|r| r.device_id == device)
            .cloned()
            .collect())
    }

    async fn enabled_rules_for_source(
        &self,
        device: DeviceId,
        chat_id: i64,
    ) -> Result<Vec<RouteRule>, CourierError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rules
            .values()
            .filter(|r| r.device_id == device && r.source_chat_id == chat_id && r.enabled)
            .cloned()
            .collect())
    }

    async fn update_rule(
        &self,
        id: RuleId,
        patch: RouteRulePatch,
    ) -> Result<Option<RouteRule>, CourierError> {
        let mut inner = self.inner.lock().await;
        let Some(rule) = inner.rules.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(v) = patch.source_chat_id {
            rule.source_chat_id = v;
        }
        if let Some(v) = patch.bot_id {
            rule.bot_id = v;
        }
        if let Some(v) = patch.dest_chat_id {
            rule.dest_chat_id = v;
        }
        if let Some(v) = patch.title {
            rule.title = Some(v);
        }
        if let Some(v) = patch.filters {
            rule.filters = Some(v);
        }
        if let Some(v) = patch.transforms {
            rule.transforms = Some(v);
        }
        if let Some(v) = patch.enabled {
            rule.enabled = v;
        }
        rule.updated_at = now();
        Ok(Some(rule.clone()))
    }

    async fn delete_rule(&self, id: RuleId) -> Result<bool, CourierError> {
        Ok(self.inner.lock().await.rules.remove(&id).is_some())
    }

    async fn disable_by_destination(
        &self,
        bot: BotId,
        dest_chat_id: i64,
    ) -> Result<u64, CourierError> {
        if self.fail_rule_updates.load(Ordering::SeqCst) {
            return Err(injected("rule update"));
        }
        let mut inner = self.inner.lock().await;
        let mut changed = 0;
        for rule in inner.rules.values_mut() {
            if rule.bot_id == bot && rule.dest_chat_id == dest_chat_id && rule.enabled {
                rule.enabled = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn disable_by_source(
        &self,
        device: DeviceId,
        source_chat_id: i64,
    ) -> Result<u64, CourierError> {
        if self.fail_rule_updates.load(Ordering::SeqCst) {
            return Err(injected("rule update"));
        }
        let mut inner = self.inner.lock().await;
        let mut changed = 0;
        for rule in inner.rules.values_mut() {
            if rule.device_id == device && rule.source_chat_id == source_chat_id && rule.enabled {
                rule.enabled = false;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn devices_with_rules(&self) -> Result<Vec<DeviceId>, CourierError> {
        let inner = self.inner.lock().await;
        let mut devices: Vec<DeviceId> = inner.rules.values().map(|r| r.device_id).collect();
        devices.sort();
        devices.dedup();
        Ok(devices)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn upsert_chat(&self, chat: &ChatRecord) -> Result<(), CourierError> {
        if self.fail_chats.load(Ordering::SeqCst) {
            return Err(injected("chat"));
        }
        let mut inner = self.inner.lock().await;
        match inner.chats.get_mut(&(chat.bot_id, chat.chat_id)) {
            Some(existing) => {
                existing.kind = chat.kind.clone().or(existing.kind.take());
                existing.title = chat.title.clone().or(existing.title.take());
                existing.username = chat.username.clone().or(existing.username.take());
                existing.first_name = chat.first_name.clone().or(existing.first_name.take());
                existing.last_name = chat.last_name.clone().or(existing.last_name.take());
            }
            None => {
                inner.chats.insert((chat.bot_id, chat.chat_id), chat.clone());
            }
        }
        Ok(())
    }

    async fn upsert_member(&self, member: &ChatMember) -> Result<(), CourierError> {
        if self.fail_members.load(Ordering::SeqCst) {
            return Err(injected("member"));
        }
        self.inner.lock().await.members.insert(
            (member.bot_id, member.chat_id, member.user_id),
            member.clone(),
        );
        Ok(())
    }

    async fn insert_message(&self, message: &StoredMessage) -> Result<bool, CourierError> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(injected("message"));
        }
        let mut inner = self.inner.lock().await;
        let key = (message.bot_id, message.chat_id, message.message_id);
        if inner.messages.contains_key(&key) {
            return Ok(false);
        }
        inner.messages.insert(key, message.clone());
        Ok(true)
    }

    async fn list_chats(&self, bot: BotId) -> Result<Vec<ChatRecord>, CourierError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .chats
            .values()
            .filter(|c| c.bot_id == bot)
            .cloned()
            .collect())
    }

    async fn list_members(
        &self,
        bot: BotId,
        chat_id: i64,
    ) -> Result<Vec<ChatMember>, CourierError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .members
            .values()
            .filter(|m| m.bot_id == bot && m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, CourierError> {
        let inner = self.inner.lock().await;
        let matching: Vec<StoredMessage> = inner
            .messages
            .values()
            .filter(|m| m.bot_id == bot && m.chat_id == chat_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn delete_messages(
        &self,
        bot: BotId,
        chat_id: i64,
        message_ids: &[i64],
    ) -> Result<u64, CourierError> {
        let mut inner = self.inner.lock().await;
        let mut removed = 0;
        for id in message_ids {
            if inner.messages.remove(&(bot, chat_id, *id)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn purge_chat(&self, bot: BotId, chat_id: i64) -> Result<(), CourierError> {
        let mut inner = self.inner.lock().await;
        inner.chats.remove(&(bot, chat_id));
        inner
            .members
            .retain(|(b, c, _), _| !(*b == bot && *c == chat_id));
        inner
            .messages
            .retain(|(b, c, _), _| !(*b == bot && *c == chat_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_devices_stay_revoked() {
        let store = MemoryStore::new();
        let id = store.create_pending("+1").await.unwrap();
        store.mark_revoked(id).await.unwrap();
        store.mark_inactive(id).await.unwrap();
        assert!(store.mark_active(id, &AccountProfile::default()).await.is_err());
        assert_eq!(
            store.get_device(id).await.unwrap().unwrap().status,
            DeviceStatus::Revoked
        );
    }

    #[tokio::test]
    async fn injected_failures_only_hit_their_family() {
        let store = MemoryStore::new();
        store.fail_chats(true);
        let chat = ChatRecord {
            bot_id: BotId(1),
            chat_id: 2,
            kind: None,
            title: None,
            username: None,
            first_name: None,
            last_name: None,
        };
        assert!(store.upsert_chat(&chat).await.is_err());
        let message = StoredMessage {
            bot_id: BotId(1),
            chat_id: 2,
            message_id: 3,
            from_user_id: None,
            text: None,
            raw: serde_json::Value::Null,
            date: 0,
        };
        assert!(store.insert_message(&message).await.unwrap());
        assert!(!store.insert_message(&message).await.unwrap());
    }
}
