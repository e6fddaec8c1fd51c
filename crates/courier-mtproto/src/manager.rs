// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session state machine.
//!
//! A device moves `pending -> active -> {inactive, revoked}`. While a login is
//! in flight the connection and the platform challenge live in an in-memory
//! [`LoginAttempt`]; nothing about it is persisted, so a restart means starting
//! the login again. Once active, the encrypted session is the only thing
//! needed to rebuild a connection.
//!
//! Connections are built single-flight: concurrent callers for the same device
//! share one [`OnceCell`] and only the first runs the connect.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use courier_config::model::DevicesConfig;
use courier_core::traits::account::{AccountUpdate, IncomingMessage, PlatformHandle, SignInOutcome};
use courier_core::types::{
    AccountProfile, Device, DeviceMessageEvent, DeviceStatus, DialogPage, DialogSnapshot,
};
use courier_core::{
    AccountClient, AccountConnector, CourierError, DeviceId, DeviceSessionStore, DeviceStore,
    DialogStore,
};
use courier_vault::SessionVault;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::media;

/// Timeouts and limits for device operations.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub login_timeout: Duration,
    pub dialog_timeout: Duration,
    pub dialog_limit: usize,
    pub dialog_retry_limit: usize,
    pub login_ttl: Duration,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self::from(&DevicesConfig::default())
    }
}

impl From<&DevicesConfig> for DeviceSettings {
    fn from(config: &DevicesConfig) -> Self {
        Self {
            login_timeout: Duration::from_secs(config.login_timeout_secs),
            dialog_timeout: Duration::from_secs(config.dialog_timeout_secs),
            dialog_limit: config.dialog_limit,
            dialog_retry_limit: config.dialog_retry_limit,
            login_ttl: Duration::from_secs(config.login_ttl_secs),
        }
    }
}

/// Outcome of a login step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Ok,
    PasswordRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoginResult {
    pub status: LoginStatus,
    pub device_id: DeviceId,
}

/// Result of a dialog sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub saved: usize,
    pub synced_at: Option<String>,
}

enum LoginStage {
    Code(PlatformHandle),
    Password(PlatformHandle),
}

struct LoginAttempt {
    phone: String,
    client: Arc<dyn AccountClient>,
    stage: LoginStage,
    started: Instant,
}

/// A live device connection.
pub struct DeviceConnection {
    pub device_id: DeviceId,
    pub client: Arc<dyn AccountClient>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl DeviceConnection {
    fn new(device_id: DeviceId, client: Arc<dyn AccountClient>) -> Self {
        Self {
            device_id,
            client,
            listener: StdMutex::new(None),
        }
    }

    /// True while an update listener task runs for this connection.
    pub fn has_listener(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn stop_listener(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

type ConnectionSlot = Arc<OnceCell<Arc<DeviceConnection>>>;

/// Owns login attempts and live connections for every device.
pub struct DeviceSessionManager {
    connector: Arc<dyn AccountConnector>,
    devices: Arc<dyn DeviceStore>,
    sessions: Arc<dyn DeviceSessionStore>,
    dialogs: Arc<dyn DialogStore>,
    vault: Option<Arc<SessionVault>>,
    settings: DeviceSettings,
    events: mpsc::Sender<DeviceMessageEvent>,
    connections: DashMap<DeviceId, ConnectionSlot>,
    logins: DashMap<DeviceId, LoginAttempt>,
}

impl DeviceSessionManager {
    pub fn new(
        connector: Arc<dyn AccountConnector>,
        devices: Arc<dyn DeviceStore>,
        sessions: Arc<dyn DeviceSessionStore>,
        dialogs: Arc<dyn DialogStore>,
        vault: Option<Arc<SessionVault>>,
        settings: DeviceSettings,
        events: mpsc::Sender<DeviceMessageEvent>,
    ) -> Self {
        Self {
            connector,
            devices,
            sessions,
            dialogs,
            vault,
            settings,
            events,
            connections: DashMap::new(),
            logins: DashMap::new(),
        }
    }

    fn vault(&self) -> Result<&SessionVault, CourierError> {
        self.vault
            .as_deref()
            .ok_or_else(|| CourierError::Config("vault.session_key is not configured".into()))
    }

    async fn bounded<T>(
        &self,
        limit: Duration,
        fut: impl Future<Output = Result<T, CourierError>>,
    ) -> Result<T, CourierError> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CourierError::Timeout { duration: limit })?
    }

    // --- Login ---

    /// Create a pending device and ask the platform for a login code.
    pub async fn start_login(&self, phone: &str) -> Result<DeviceId, CourierError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(CourierError::Auth("phone number is required".into()));
        }
        self.vault()?;

        let device_id = self.devices.create_pending(phone).await?;
        let client = match self
            .bounded(self.settings.login_timeout, self.connector.connect(None))
            .await
        {
            Ok(client) => client,
            Err(e) => {
                self.discard_pending(device_id).await;
                return Err(e);
            }
        };
        let challenge = match self
            .bounded(self.settings.login_timeout, client.request_login_code(phone))
            .await
        {
            Ok(challenge) => challenge,
            Err(e) => {
                client.disconnect().await;
                self.discard_pending(device_id).await;
                return Err(e);
            }
        };
        self.logins.insert(
            device_id,
            LoginAttempt {
                phone: phone.to_string(),
                client,
                stage: LoginStage::Code(challenge),
                started: Instant::now(),
            },
        );
        info!(%device_id, "login code requested");
        Ok(device_id)
    }

    /// Remove a device whose login never got a code.
    async fn discard_pending(&self, device_id: DeviceId) {
        if let Err(e) = self.devices.delete_device(device_id).await {
            warn!(%device_id, error = %e, "failed to remove abandoned pending device");
        }
    }

    fn take_attempt(&self, device_id: DeviceId) -> Result<LoginAttempt, CourierError> {
        self.logins
            .remove(&device_id)
            .map(|(_, attempt)| attempt)
            .ok_or(CourierError::NoPendingLogin(device_id))
    }

    /// Submit the login code received by the account owner.
    pub async fn submit_code(
        &self,
        device_id: DeviceId,
        code: &str,
    ) -> Result<LoginResult, CourierError> {
        let mut attempt = self.take_attempt(device_id)?;
        let LoginStage::Code(challenge) = &attempt.stage else {
            self.logins.insert(device_id, attempt);
            return Err(CourierError::Auth(
                "code already accepted, password required".into(),
            ));
        };

        let outcome = self
            .bounded(
                self.settings.login_timeout,
                attempt.client.sign_in(challenge, code.trim()),
            )
            .await;
        match outcome {
            Ok(SignInOutcome::SignedIn(profile)) => {
                self.complete_login(device_id, attempt, profile).await
            }
            Ok(SignInOutcome::PasswordRequired(password)) => {
                debug!(%device_id, phone = %attempt.phone, "second factor required");
                attempt.stage = LoginStage::Password(password);
                self.logins.insert(device_id, attempt);
                Ok(LoginResult {
                    status: LoginStatus::PasswordRequired,
                    device_id,
                })
            }
            Err(e) => {
                self.logins.insert(device_id, attempt);
                Err(e)
            }
        }
    }

    /// Submit the second-factor password.
    pub async fn submit_password(
        &self,
        device_id: DeviceId,
        password: &str,
    ) -> Result<LoginResult, CourierError> {
        let attempt = self.take_attempt(device_id)?;
        let LoginStage::Password(challenge) = &attempt.stage else {
            self.logins.insert(device_id, attempt);
            return Err(CourierError::Auth("login code has not been accepted yet".into()));
        };

        let checked = self
            .bounded(
                self.settings.login_timeout,
                attempt.client.check_password(challenge, password),
            )
            .await;
        match checked {
            Ok(profile) => self.complete_login(device_id, attempt, profile).await,
            Err(e) => {
                self.logins.insert(device_id, attempt);
                Err(e)
            }
        }
    }

    async fn complete_login(
        &self,
        device_id: DeviceId,
        attempt: LoginAttempt,
        profile: AccountProfile,
    ) -> Result<LoginResult, CourierError> {
        let session = attempt.client.export_session().await?;
        let blob = self.vault()?.encrypt(&session)?;
        self.sessions.upsert_primary(device_id, &blob).await?;
        self.devices.mark_active(device_id, &profile).await?;

        let connection = Arc::new(DeviceConnection::new(device_id, attempt.client));
        self.connections
            .insert(device_id, Arc::new(OnceCell::new_with(Some(connection))));
        if let Err(e) = self.ensure_update_handler(device_id).await {
            warn!(%device_id, error = %e, "failed to attach update listener after login");
        }
        info!(
            %device_id,
            username = profile.username.as_deref().unwrap_or(""),
            "device logged in"
        );
        Ok(LoginResult {
            status: LoginStatus::Ok,
            device_id,
        })
    }

    /// True while a login for `device_id` waits for a code or password.
    pub fn login_pending(&self, device_id: DeviceId) -> bool {
        self.logins.contains_key(&device_id)
    }

    /// True when the pending login for `device_id` waits for the password.
    pub fn awaiting_password(&self, device_id: DeviceId) -> bool {
        self.logins
            .get(&device_id)
            .is_some_and(|a| matches!(a.stage, LoginStage::Password(_)))
    }

    /// Drop login attempts older than the configured TTL.
    pub async fn prune_stale_logins(&self) -> usize {
        let ttl = self.settings.login_ttl;
        let stale: Vec<DeviceId> = self
            .logins
            .iter()
            .filter(|a| a.started.elapsed() >= ttl)
            .map(|a| *a.key())
            .collect();
        let mut pruned = 0;
        for device_id in stale {
            if let Some((_, attempt)) = self.logins.remove(&device_id) {
                attempt.client.disconnect().await;
                debug!(%device_id, "stale login attempt dropped");
                pruned += 1;
            }
        }
        pruned
    }

    // --- Connections ---

    /// The live connection for an active device, built on first use.
    pub async fn get_client_for_device(
        &self,
        device_id: DeviceId,
    ) -> Result<Arc<DeviceConnection>, CourierError> {
        let device = self
            .devices
            .get_device(device_id)
            .await?
            .ok_or_else(|| CourierError::not_found("device", device_id))?;
        if device.status != DeviceStatus::Active {
            return Err(CourierError::not_running("device", device_id));
        }
        let slot: ConnectionSlot = self.connections.entry(device_id).or_default().clone();
        slot.get_or_try_init(|| self.open_connection(device_id))
            .await
            .cloned()
    }

    async fn open_connection(
        &self,
        device_id: DeviceId,
    ) -> Result<Arc<DeviceConnection>, CourierError> {
        let session = match self.sessions.primary_session(device_id).await? {
            Some(record) => Some(self.vault()?.decrypt(&record.session_blob)?),
            None => {
                warn!(%device_id, "active device has no stored session");
                None
            }
        };
        let client = self
            .bounded(self.settings.login_timeout, self.connector.connect(session))
            .await?;
        if let Err(e) = self.devices.touch_last_seen(device_id).await {
            warn!(%device_id, error = %e, "failed to update last_seen_at");
        }
        info!(%device_id, "device connected");
        Ok(Arc::new(DeviceConnection::new(device_id, client)))
    }

    /// Tear down the live connection, if any. Returns it for further cleanup.
    async fn drop_connection(&self, device_id: DeviceId) -> Option<Arc<DeviceConnection>> {
        let (_, slot) = self.connections.remove(&device_id)?;
        let connection = slot.get()?.clone();
        connection.stop_listener();
        connection.client.disconnect().await;
        Some(connection)
    }

    /// Attach the update listener for a device. Returns false when one was
    /// already running.
    pub async fn ensure_update_handler(&self, device_id: DeviceId) -> Result<bool, CourierError> {
        let connection = self.get_client_for_device(device_id).await?;
        let mut listener = connection
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(false);
        }
        *listener = Some(tokio::spawn(run_listener(
            device_id,
            connection.client.clone(),
            self.events.clone(),
        )));
        debug!(%device_id, "update listener attached");
        Ok(true)
    }

    /// Rebuild the connection from the stored session and reattach the listener.
    pub async fn reconnect(&self, device_id: DeviceId) -> Result<(), CourierError> {
        self.drop_connection(device_id).await;
        self.ensure_update_handler(device_id).await?;
        Ok(())
    }

    /// Attach listeners for every active device. Returns how many succeeded.
    pub async fn attach_all(&self) -> Result<usize, CourierError> {
        let devices = self.devices.list_devices().await?;
        let mut attached = 0;
        for device in devices.iter().filter(|d| d.status == DeviceStatus::Active) {
            match self.ensure_update_handler(device.id).await {
                Ok(_) => attached += 1,
                Err(e) => warn!(device_id = %device.id, error = %e, "failed to attach device"),
            }
        }
        info!(attached, "device listeners attached");
        Ok(attached)
    }

    // --- Lifecycle ---

    pub async fn status(&self, device_id: DeviceId) -> Result<Device, CourierError> {
        self.devices
            .get_device(device_id)
            .await?
            .ok_or_else(|| CourierError::not_found("device", device_id))
    }

    pub async fn list(&self) -> Result<Vec<Device>, CourierError> {
        self.devices.list_devices().await
    }

    /// Best-effort disconnect of a live connection or pending login.
    async fn teardown(&self, device_id: DeviceId, log_out: bool) {
        if let Some((_, attempt)) = self.logins.remove(&device_id) {
            attempt.client.disconnect().await;
        }
        let Some((_, slot)) = self.connections.remove(&device_id) else {
            return;
        };
        let Some(connection) = slot.get() else {
            return;
        };
        connection.stop_listener();
        if log_out && let Err(e) = connection.client.log_out().await {
            warn!(%device_id, error = %e, "log out failed");
        }
        connection.client.disconnect().await;
    }

    /// Log out and mark the device inactive.
    pub async fn deactivate(&self, device_id: DeviceId) -> Result<(), CourierError> {
        self.teardown(device_id, true).await;
        self.devices.mark_inactive(device_id).await?;
        info!(%device_id, "device deactivated");
        Ok(())
    }

    /// Administratively revoke a device. Revoked devices never come back.
    pub async fn revoke(&self, device_id: DeviceId) -> Result<(), CourierError> {
        self.status(device_id).await?;
        self.teardown(device_id, true).await;
        self.devices.mark_revoked(device_id).await?;
        info!(%device_id, "device revoked");
        Ok(())
    }

    /// Deactivate, then remove the device and its sessions.
    pub async fn delete(&self, device_id: DeviceId) -> Result<(), CourierError> {
        self.status(device_id).await?;
        if let Err(e) = self.deactivate(device_id).await {
            warn!(%device_id, error = %e, "deactivate before delete failed");
        }
        self.sessions.delete_sessions(device_id).await?;
        self.devices.delete_device(device_id).await?;
        info!(%device_id, "device deleted");
        Ok(())
    }

    /// Persist fresh session material for every live connection and close them.
    pub async fn shutdown(&self) {
        let logins: Vec<DeviceId> = self.logins.iter().map(|a| *a.key()).collect();
        for device_id in logins {
            if let Some((_, attempt)) = self.logins.remove(&device_id) {
                attempt.client.disconnect().await;
            }
        }

        let ids: Vec<DeviceId> = self.connections.iter().map(|c| *c.key()).collect();
        for device_id in ids {
            let Some((_, slot)) = self.connections.remove(&device_id) else {
                continue;
            };
            let Some(connection) = slot.get() else {
                continue;
            };
            connection.stop_listener();
            if let Err(e) = self.persist_session(device_id, connection.client.as_ref()).await {
                warn!(%device_id, error = %e, "failed to persist session on shutdown");
            }
            connection.client.disconnect().await;
        }
        info!("device connections closed");
    }

    async fn persist_session(
        &self,
        device_id: DeviceId,
        client: &dyn AccountClient,
    ) -> Result<(), CourierError> {
        let session = client.export_session().await?;
        let blob = self.vault()?.encrypt(&session)?;
        self.sessions.upsert_primary(device_id, &blob).await
    }

    // --- Dialogs ---

    async fn fetch_dialogs(
        &self,
        connection: &DeviceConnection,
        limit: Option<usize>,
    ) -> Result<DialogSnapshot, CourierError> {
        self.bounded(
            self.settings.dialog_timeout,
            connection.client.fetch_dialogs(limit),
        )
        .await
    }

    /// Refresh the dialog cache from a live listing.
    ///
    /// A timeout or a duplicated-session error rebuilds the connection once and
    /// retries with the smaller retry limit.
    pub async fn sync_dialogs(&self, device_id: DeviceId) -> Result<SyncSummary, CourierError> {
        let connection = self.get_client_for_device(device_id).await?;
        let snapshot = match self
            .fetch_dialogs(&connection, Some(self.settings.dialog_limit))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) if needs_rebuild(&e) => {
                warn!(%device_id, error = %e, "dialog fetch failed, rebuilding connection");
                let had_listener = connection.has_listener();
                drop(connection);
                self.drop_connection(device_id).await;
                let connection = self.get_client_for_device(device_id).await?;
                let snapshot = self
                    .fetch_dialogs(&connection, Some(self.settings.dialog_retry_limit))
                    .await?;
                if had_listener && let Err(e) = self.ensure_update_handler(device_id).await {
                    warn!(%device_id, error = %e, "failed to reattach update listener");
                }
                snapshot
            }
            Err(e) => return Err(e),
        };

        for dialog in &snapshot.dialogs {
            self.dialogs.upsert_dialog(device_id, dialog).await?;
        }
        let keep: Vec<i64> = snapshot.dialogs.iter().map(|d| d.peer_id).collect();
        let tombstoned = self.dialogs.mark_deleted_except(device_id, &keep).await?;
        self.dialogs.record_sync(device_id).await?;
        let synced_at = self.dialogs.last_sync(device_id).await?;
        info!(%device_id, saved = keep.len(), tombstoned, "dialogs synced");
        Ok(SyncSummary {
            saved: keep.len(),
            synced_at,
        })
    }

    /// Live, unlimited dialog listing.
    pub async fn list_dialogs(&self, device_id: DeviceId) -> Result<DialogSnapshot, CourierError> {
        let connection = self.get_client_for_device(device_id).await?;
        self.fetch_dialogs(&connection, None).await
    }

    /// A page of cached dialogs.
    pub async fn dialogs(
        &self,
        device_id: DeviceId,
        limit: u32,
        offset: u32,
    ) -> Result<DialogPage, CourierError> {
        self.status(device_id).await?;
        let data = self.dialogs.list_dialogs(device_id, limit, offset).await?;
        let total = self.dialogs.count_dialogs(device_id).await?;
        Ok(DialogPage { data, total })
    }
}

fn needs_rebuild(e: &CourierError) -> bool {
    match e {
        CourierError::Timeout { .. } => true,
        other => other.to_string().to_uppercase().contains("AUTH_KEY_DUPLICATED"),
    }
}

async fn run_listener(
    device_id: DeviceId,
    client: Arc<dyn AccountClient>,
    events: mpsc::Sender<DeviceMessageEvent>,
) {
    loop {
        let update = match client.next_update().await {
            Ok(Some(update)) => update,
            Ok(None) => break,
            Err(e) => {
                warn!(%device_id, error = %e, "update stream failed");
                break;
            }
        };
        let AccountUpdate::NewMessage(message) = update else {
            continue;
        };
        let event = normalize(device_id, client.as_ref(), message).await;
        metrics::counter!("courier_device_events_total").increment(1);
        if events.send(event).await.is_err() {
            debug!(%device_id, "event consumer gone");
            break;
        }
    }
    debug!(%device_id, "update listener stopped");
}

async fn normalize(
    device_id: DeviceId,
    client: &dyn AccountClient,
    message: IncomingMessage,
) -> DeviceMessageEvent {
    let media = match &message.media {
        Some(remote) => match client.download_media(remote).await {
            Ok(data) => Some(Arc::new(media::payload(remote, data))),
            Err(e) => {
                warn!(
                    %device_id,
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "media download failed, relaying text only"
                );
                None
            }
        },
        None => None,
    };
    DeviceMessageEvent {
        device_id,
        chat_id: message.chat_id,
        message_id: message.message_id,
        text: message.text,
        media,
        raw: message.raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_triggers() {
        assert!(needs_rebuild(&CourierError::Timeout {
            duration: Duration::from_secs(15)
        }));
        assert!(needs_rebuild(&CourierError::Platform {
            message: "rpc error 406: AUTH_KEY_DUPLICATED".into(),
            source: None,
        }));
        assert!(!needs_rebuild(&CourierError::Auth("nope".into())));
    }

    #[test]
    fn settings_follow_config() {
        let settings = DeviceSettings::default();
        assert_eq!(settings.dialog_timeout, Duration::from_secs(15));
        assert_eq!(settings.dialog_limit, 200);
        assert_eq!(settings.dialog_retry_limit, 150);
    }

    #[test]
    fn login_result_serializes_status() {
        let json = serde_json::to_value(LoginResult {
            status: LoginStatus::PasswordRequired,
            device_id: DeviceId(4),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": "password_required", "device_id": 4}));
    }
}
