// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Personal-account protocol boundary.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{AccountProfile, DialogSnapshot};

/// Opaque value issued by the account protocol and handed back to it later.
///
/// Login challenges, second-factor challenges, and downloadable media
/// references are all library-specific types; the core only stores them.
pub struct PlatformHandle(Box<dyn Any + Send + Sync>);

impl PlatformHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for PlatformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlatformHandle(..)")
    }
}

/// Result of submitting a login code.
#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn(AccountProfile),
    /// The account has a second factor; the handle feeds `check_password`.
    PasswordRequired(PlatformHandle),
}

/// A media attachment that has not been downloaded yet.
#[derive(Debug)]
pub struct RemoteMedia {
    /// The platform declared this a photo.
    pub is_photo: bool,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub handle: PlatformHandle,
}

/// A new message seen on a device connection.
#[derive(Debug)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub media: Option<RemoteMedia>,
    pub raw: serde_json::Value,
}

/// An update pulled from a device connection.
#[derive(Debug)]
pub enum AccountUpdate {
    NewMessage(IncomingMessage),
    /// Anything the relay does not consume.
    Other,
}

/// A connected personal-account client.
#[async_trait]
pub trait AccountClient: Send + Sync + 'static {
    async fn request_login_code(&self, phone: &str) -> Result<PlatformHandle, CourierError>;

    async fn sign_in(
        &self,
        challenge: &PlatformHandle,
        code: &str,
    ) -> Result<SignInOutcome, CourierError>;

    async fn check_password(
        &self,
        challenge: &PlatformHandle,
        password: &str,
    ) -> Result<AccountProfile, CourierError>;

    /// Serializes the current session material.
    async fn export_session(&self) -> Result<Vec<u8>, CourierError>;

    /// Lists visible dialogs, stopping after `limit` when given.
    async fn fetch_dialogs(&self, limit: Option<usize>) -> Result<DialogSnapshot, CourierError>;

    /// Waits for the next update. `Ok(None)` means the connection closed.
    async fn next_update(&self) -> Result<Option<AccountUpdate>, CourierError>;

    async fn download_media(&self, media: &RemoteMedia) -> Result<Vec<u8>, CourierError>;

    async fn log_out(&self) -> Result<(), CourierError>;

    async fn disconnect(&self);
}

/// Opens account connections, optionally restoring saved session material.
#[async_trait]
pub trait AccountConnector: Send + Sync + 'static {
    async fn connect(&self, session: Option<Vec<u8>>)
    -> Result<Arc<dyn AccountClient>, CourierError>;
}
