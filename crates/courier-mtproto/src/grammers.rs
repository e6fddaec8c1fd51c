// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`AccountConnector`] over the account protocol via grammers.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use courier_config::model::TelegramConfig;
use courier_core::traits::account::{
    AccountUpdate, IncomingMessage, PlatformHandle, RemoteMedia, SignInOutcome,
};
use courier_core::types::{AccountProfile, DialogKind, DialogSnapshot, RemoteDialog};
use courier_core::{AccountClient, AccountConnector, CourierError};
use grammers_client::types::{Chat, Downloadable, LoginToken, Media, PasswordToken, User};
use grammers_client::{Client, Config, InitParams, SignInError, Update};
use grammers_session::Session;
use serde_json::json;
use tracing::debug;

fn platform_err<E>(e: E) -> CourierError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CourierError::classify_platform(e.to_string(), Some(Box::new(e)))
}

fn profile(user: &User) -> AccountProfile {
    AccountProfile::from_names(
        Some(user.id()),
        user.username(),
        Some(user.first_name()),
        user.last_name(),
    )
}

/// Opens grammers connections with the configured application credentials.
#[derive(Debug, Clone, Default)]
pub struct GrammersConnector {
    api_id: Option<i32>,
    api_hash: Option<String>,
}

impl GrammersConnector {
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            api_id: Some(api_id),
            api_hash: Some(api_hash.into()),
        }
    }

    /// Credentials are checked on connect, not here.
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
        }
    }

    fn credentials(&self) -> Result<(i32, &str), CourierError> {
        match (self.api_id, self.api_hash.as_deref()) {
            (Some(id), Some(hash)) if id > 0 && !hash.is_empty() => Ok((id, hash)),
            _ => Err(CourierError::Config(
                "telegram.api_id and telegram.api_hash are required for devices".into(),
            )),
        }
    }
}

#[async_trait]
impl AccountConnector for GrammersConnector {
    async fn connect(
        &self,
        session: Option<Vec<u8>>,
    ) -> Result<Arc<dyn AccountClient>, CourierError> {
        let (api_id, api_hash) = self.credentials()?;
        let session = match session {
            Some(bytes) => Session::load(&bytes)
                .map_err(|e| CourierError::Vault(format!("unreadable session material: {e}")))?,
            None => Session::new(),
        };
        let client = Client::connect(Config {
            session,
            api_id,
            api_hash: api_hash.to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| CourierError::TransientNetwork {
            message: e.to_string(),
            source: Some(Box::new(e)),
        })?;
        Ok(Arc::new(GrammersClient::new(client)))
    }
}

/// One grammers connection. `disconnect` drops the handle; later calls fail
/// with `NotRunning`.
pub struct GrammersClient {
    client: StdMutex<Option<Client>>,
}

impl GrammersClient {
    pub fn new(client: Client) -> Self {
        Self {
            client: StdMutex::new(Some(client)),
        }
    }

    fn client(&self) -> Result<Client, CourierError> {
        self.client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| CourierError::not_running("account connection", "closed"))
    }
}

fn remote_dialog(chat: &Chat) -> RemoteDialog {
    let kind = match chat {
        Chat::User(_) => DialogKind::User,
        Chat::Group(_) => DialogKind::Chat,
        Chat::Channel(_) => DialogKind::Channel,
    };
    let title = chat.name();
    RemoteDialog {
        peer_id: chat.id(),
        title: if title.is_empty() { "Unknown".to_string() } else { title.to_string() },
        kind,
        username: chat.username().map(str::to_string),
    }
}

fn incoming(message: grammers_client::types::Message) -> IncomingMessage {
    let media = message.media().and_then(|media| {
        let (is_photo, mime_type, file_name) = match &media {
            Media::Photo(_) => (true, None, None),
            Media::Document(doc) => (
                false,
                doc.mime_type().map(str::to_string),
                Some(doc.name().to_string()).filter(|n| !n.is_empty()),
            ),
            _ => return None,
        };
        Some(RemoteMedia {
            is_photo,
            mime_type,
            file_name,
            handle: PlatformHandle::new(media),
        })
    });
    let chat_id = message.chat().id();
    IncomingMessage {
        chat_id,
        message_id: message.id(),
        text: message.text().to_string(),
        raw: json!({
            "id": message.id(),
            "chat_id": chat_id,
            "text": message.text(),
            "date": message.date().timestamp(),
            "outgoing": message.outgoing(),
        }),
        media,
    }
}

#[async_trait]
impl AccountClient for GrammersClient {
    async fn request_login_code(&self, phone: &str) -> Result<PlatformHandle, CourierError> {
        let token = self
            .client()?
            .request_login_code(phone)
            .await
            .map_err(|e| CourierError::Auth(e.to_string()))?;
        Ok(PlatformHandle::new(token))
    }

    async fn sign_in(
        &self,
        challenge: &PlatformHandle,
        code: &str,
    ) -> Result<SignInOutcome, CourierError> {
        let token = challenge
            .downcast_ref::<LoginToken>()
            .ok_or_else(|| CourierError::Internal("login challenge of the wrong type".into()))?;
        match self.client()?.sign_in(token, code).await {
            Ok(user) => Ok(SignInOutcome::SignedIn(profile(&user))),
            Err(SignInError::PasswordRequired(password)) => Ok(SignInOutcome::PasswordRequired(
                PlatformHandle::new(StdMutex::new(Some(password))),
            )),
            Err(other) => Err(CourierError::Auth(other.to_string())),
        }
    }

    async fn check_password(
        &self,
        challenge: &PlatformHandle,
        password: &str,
    ) -> Result<AccountProfile, CourierError> {
        let slot = challenge
            .downcast_ref::<StdMutex<Option<PasswordToken>>>()
            .ok_or_else(|| CourierError::Internal("password challenge of the wrong type".into()))?;
        // grammers consumes the token, so a wrong password needs a fresh login
        let token = slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| CourierError::Auth("password challenge expired, restart login".into()))?;
        let user = self
            .client()?
            .check_password(token, password.as_bytes())
            .await
            .map_err(|e| CourierError::Auth(e.to_string()))?;
        Ok(profile(&user))
    }

    async fn export_session(&self) -> Result<Vec<u8>, CourierError> {
        Ok(self.client()?.session().save())
    }

    async fn fetch_dialogs(&self, limit: Option<usize>) -> Result<DialogSnapshot, CourierError> {
        let client = self.client()?;
        let mut iter = client.iter_dialogs();
        let mut dialogs = Vec::new();
        loop {
            if let Some(limit) = limit
                && dialogs.len() >= limit
            {
                let more = iter.next().await.map_err(platform_err)?.is_some();
                return Ok(DialogSnapshot {
                    dialogs,
                    complete: !more,
                });
            }
            match iter.next().await.map_err(platform_err)? {
                Some(dialog) => dialogs.push(remote_dialog(dialog.chat())),
                None => break,
            }
        }
        Ok(DialogSnapshot {
            dialogs,
            complete: true,
        })
    }

    async fn next_update(&self) -> Result<Option<AccountUpdate>, CourierError> {
        let Ok(client) = self.client() else {
            return Ok(None);
        };
        let update = client.next_update().await.map_err(platform_err)?;
        Ok(Some(match update {
            Update::NewMessage(message) => AccountUpdate::NewMessage(incoming(message)),
            _ => AccountUpdate::Other,
        }))
    }

    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>, CourierError> {
        let media = media
            .handle
            .downcast_ref::<Media>()
            .ok_or_else(|| CourierError::Internal("media reference of the wrong type".into()))?;
        let client = self.client()?;
        let mut download = client.iter_download(&Downloadable::Media(media.clone()));
        let mut data = Vec::new();
        while let Some(chunk) = download.next().await.map_err(platform_err)? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    async fn log_out(&self) -> Result<(), CourierError> {
        self.client()?.sign_out().await.map_err(platform_err)?;
        Ok(())
    }

    async fn disconnect(&self) {
        if self
            .client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            debug!("account connection released");
        }
    }
}
