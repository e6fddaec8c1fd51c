// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted personal-account connections.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Mutex, mpsc};

use courier_core::traits::account::{
    AccountUpdate, IncomingMessage, PlatformHandle, RemoteMedia, SignInOutcome,
};
use courier_core::types::{AccountProfile, DialogKind, DialogSnapshot, RemoteDialog};
use courier_core::{AccountClient, AccountConnector, CourierError};

/// How clients created by a [`MockAccountConnector`] behave.
#[derive(Debug, Clone)]
pub struct MockAccountBehavior {
    /// The only login code `sign_in` accepts.
    pub code: String,
    /// Second factor; `None` means sign-in completes with the code alone.
    pub password: Option<String>,
    pub profile: AccountProfile,
    pub dialogs: Vec<RemoteDialog>,
    /// Whether an unlimited listing reports itself complete.
    pub complete: bool,
    pub media_bytes: Vec<u8>,
}

impl Default for MockAccountBehavior {
    fn default() -> Self {
        Self {
            code: "12345".into(),
            password: None,
            profile: AccountProfile::from_names(Some(42), Some("relay_user"), Some("Relay"), None),
            dialogs: Vec::new(),
            complete: true,
            media_bytes: b"media".to_vec(),
        }
    }
}

/// A scripted failure of the next `fetch_dialogs` call.
#[derive(Debug, Clone)]
pub enum DialogFault {
    /// Never answers.
    Hang,
    /// Fails with the given platform error text.
    Error(String),
}

/// Shorthand for a [`RemoteDialog`].
pub fn dialog(peer_id: i64, title: &str, kind: DialogKind) -> RemoteDialog {
    RemoteDialog {
        peer_id,
        title: title.to_string(),
        kind,
        username: None,
    }
}

/// Creates [`MockAccountClient`]s and remembers them.
#[derive(Default)]
pub struct MockAccountConnector {
    behavior: StdMutex<MockAccountBehavior>,
    faults: Arc<StdMutex<VecDeque<DialogFault>>>,
    connect_delay: StdMutex<Duration>,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    clients: StdMutex<Vec<Arc<MockAccountClient>>>,
}

impl MockAccountConnector {
    pub fn new(behavior: MockAccountBehavior) -> Self {
        Self {
            behavior: StdMutex::new(behavior),
            ..Self::default()
        }
    }

    /// Applies to clients created after the call.
    pub fn set_behavior(&self, f: impl FnOnce(&mut MockAccountBehavior)) {
        let mut behavior = self.behavior.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut behavior);
    }

    /// Every `connect` sleeps this long before answering.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Queue a fault for the next dialog listing on any client.
    pub fn push_dialog_fault(&self, fault: DialogFault) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(fault);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every client handed out so far, oldest first.
    pub fn clients(&self) -> Vec<Arc<MockAccountClient>> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_client(&self) -> Option<Arc<MockAccountClient>> {
        self.clients().pop()
    }
}

#[async_trait]
impl AccountConnector for MockAccountConnector {
    async fn connect(
        &self,
        session: Option<Vec<u8>>,
    ) -> Result<Arc<dyn AccountClient>, CourierError> {
        let delay = *self.connect_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(CourierError::TransientNetwork {
                message: "connection refused".into(),
                source: None,
            });
        }
        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let session = session.unwrap_or_else(|| format!("mock-session-{n}").into_bytes());
        let client = Arc::new(MockAccountClient::new(
            behavior,
            session,
            self.faults.clone(),
        ));
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(client.clone());
        Ok(client)
    }
}

/// A connected account whose answers come from a [`MockAccountBehavior`].
pub struct MockAccountClient {
    behavior: MockAccountBehavior,
    session: Vec<u8>,
    faults: Arc<StdMutex<VecDeque<DialogFault>>>,
    updates_tx: StdMutex<Option<mpsc::UnboundedSender<AccountUpdate>>>,
    updates_rx: Mutex<mpsc::UnboundedReceiver<AccountUpdate>>,
    code_requests: AtomicUsize,
    dialog_fetches: AtomicUsize,
    downloads: AtomicUsize,
    logged_out: AtomicBool,
    disconnected: AtomicBool,
}

impl MockAccountClient {
    fn new(
        behavior: MockAccountBehavior,
        session: Vec<u8>,
        faults: Arc<StdMutex<VecDeque<DialogFault>>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            behavior,
            session,
            faults,
            updates_tx: StdMutex::new(Some(tx)),
            updates_rx: Mutex::new(rx),
            code_requests: AtomicUsize::new(0),
            dialog_fetches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
            logged_out: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Session bytes this client was restored from or created with.
    pub fn session(&self) -> &[u8] {
        &self.session
    }

    /// Deliver an update to whoever is reading `next_update`.
    pub fn push_update(&self, update: AccountUpdate) {
        if let Some(tx) = self
            .updates_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            let _ = tx.send(update);
        }
    }

    /// Deliver a text message.
    pub fn push_text(&self, chat_id: i64, message_id: i32, text: &str) {
        self.push_update(AccountUpdate::NewMessage(IncomingMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            media: None,
            raw: json!({"id": message_id, "chat_id": chat_id, "text": text}),
        }));
    }

    /// Deliver a message with an attachment.
    pub fn push_media(
        &self,
        chat_id: i64,
        message_id: i32,
        caption: &str,
        is_photo: bool,
        mime_type: Option<&str>,
    ) {
        self.push_update(AccountUpdate::NewMessage(IncomingMessage {
            chat_id,
            message_id,
            text: caption.to_string(),
            media: Some(RemoteMedia {
                is_photo,
                mime_type: mime_type.map(str::to_string),
                file_name: None,
                handle: PlatformHandle::new(message_id),
            }),
            raw: json!({"id": message_id, "chat_id": chat_id, "text": caption}),
        }));
    }

    /// Close the update stream; `next_update` then returns `Ok(None)`.
    pub fn close_updates(&self) {
        self.updates_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn code_requests(&self) -> usize {
        self.code_requests.load(Ordering::SeqCst)
    }

    pub fn dialog_fetches(&self) -> usize {
        self.dialog_fetches.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountClient for MockAccountClient {
    async fn request_login_code(&self, phone: &str) -> Result<PlatformHandle, CourierError> {
        if phone.trim().is_empty() {
            return Err(CourierError::Auth("PHONE_NUMBER_INVALID".into()));
        }
        self.code_requests.fetch_add(1, Ordering::SeqCst);
        Ok(PlatformHandle::new(phone.to_string()))
    }

    async fn sign_in(
        &self,
        challenge: &PlatformHandle,
        code: &str,
    ) -> Result<SignInOutcome, CourierError> {
        if challenge.downcast_ref::<String>().is_none() {
            return Err(CourierError::Auth("PHONE_CODE_EXPIRED".into()));
        }
        if code != self.behavior.code {
            return Err(CourierError::Auth("PHONE_CODE_INVALID".into()));
        }
        match &self.behavior.password {
            Some(_) => Ok(SignInOutcome::PasswordRequired(PlatformHandle::new(
                "password-challenge",
            ))),
            None => Ok(SignInOutcome::SignedIn(self.behavior.profile.clone())),
        }
    }

    async fn check_password(
        &self,
        _challenge: &PlatformHandle,
        password: &str,
    ) -> Result<AccountProfile, CourierError> {
        match &self.behavior.password {
            Some(expected) if expected == password => Ok(self.behavior.profile.clone()),
            _ => Err(CourierError::Auth("PASSWORD_HASH_INVALID".into())),
        }
    }

    async fn export_session(&self) -> Result<Vec<u8>, CourierError> {
        Ok(self.session.clone())
    }

    async fn fetch_dialogs(&self, limit: Option<usize>) -> Result<DialogSnapshot, CourierError> {
        self.dialog_fetches.fetch_add(1, Ordering::SeqCst);
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match fault {
            Some(DialogFault::Hang) => std::future::pending().await,
            Some(DialogFault::Error(message)) => {
                Err(CourierError::classify_platform(message, None))
            }
            None => {
                let all = &self.behavior.dialogs;
                match limit {
                    Some(limit) if limit < all.len() => Ok(DialogSnapshot {
                        dialogs: all[..limit].to_vec(),
                        complete: false,
                    }),
                    _ => Ok(DialogSnapshot {
                        dialogs: all.clone(),
                        complete: self.behavior.complete,
                    }),
                }
            }
        }
    }

    async fn next_update(&self) -> Result<Option<AccountUpdate>, CourierError> {
        Ok(self.updates_rx.lock().await.recv().await)
    }

    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>, CourierError> {
        if media.handle.downcast_ref::<i32>().is_none() {
            return Err(CourierError::Platform {
                message: "unknown media reference".into(),
                source: None,
            });
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.behavior.media_bytes.clone())
    }

    async fn log_out(&self) -> Result<(), CourierError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.close_updates();
    }
}
