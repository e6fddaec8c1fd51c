// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential vault for device session blobs.
//!
//! Session material is sealed with AES-256-GCM under a single key taken from
//! configuration before it reaches the database.

pub mod crypto;
pub mod vault;

pub use vault::SessionVault;
