// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! External collaborator capabilities.
//!
//! The background process never talks to a device, window, or network
//! directly - the host supplies these at construction time.

use async_trait::async_trait;

use warden_core::error::Result;

/// Opaque signing device. Keys behind this capability never enter the
/// key store; device errors are surfaced to the caller verbatim.
#[async_trait]
pub trait HardwareSigner: Send + Sync {
    async fn pub_key(&self) -> Result<Vec<u8>>;
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
    /// Errors when the signing app is not open on the device.
    async fn is_app_open(&self) -> Result<()>;
    async fn version(&self) -> Result<String>;
}

/// Fire-and-forget consent surface. Opening may silently fail; approval
/// can still arrive through any other UI.
pub trait PopupOpener: Send + Sync {
    fn open_window(&self, url: &str);
}

/// Hands a finished transaction to the network layer.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String>;
}

/// No-op popup opener for headless runs and tests.
#[derive(Default)]
pub struct NullPopupOpener;

impl PopupOpener for NullPopupOpener {
    fn open_window(&self, _url: &str) {}
}
