// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide session vault.
//!
//! One symmetric key from configuration protects every device session blob.
//! Blobs are stored as base64 text so they fit a plain TEXT column.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_config::model::VaultConfig;
use courier_core::CourierError;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto;

/// Encrypts and decrypts device session material.
///
/// Debug output omits the key.
pub struct SessionVault {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for SessionVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SessionVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Builds the vault from `[vault] session_key`.
    ///
    /// Fails with [`CourierError::Config`] when the key is missing or malformed.
    pub fn from_config(config: &VaultConfig) -> Result<Self, CourierError> {
        let encoded = config.session_key.as_deref().ok_or_else(|| {
            CourierError::Config("vault.session_key is required to store device sessions".into())
        })?;
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CourierError::Config(format!("vault.session_key is not base64: {e}")))?,
        );
        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            CourierError::Config(format!(
                "vault.session_key must be 32 bytes, got {}",
                decoded.len()
            ))
        })?;
        debug!("session vault initialized");
        Ok(Self::new(key))
    }

    /// Generates a fresh key and returns it base64-encoded for configuration.
    pub fn generate_key() -> Result<String, CourierError> {
        let key = Zeroizing::new(crypto::generate_random_key()?);
        Ok(STANDARD.encode(key.as_slice()))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CourierError> {
        let sealed = crypto::seal(&self.key, plaintext)?;
        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, CourierError> {
        let sealed = STANDARD
            .decode(blob.trim())
            .map_err(|e| CourierError::Vault(format!("session blob is not base64: {e}")))?;
        crypto::open(&self.key, &sealed)
    }
}
