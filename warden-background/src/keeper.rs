// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Consent-gated orchestration over the key ring.
//!
//! Every operation that needs explicit user consent suspends on one of
//! three approvers until a separate approve/reject message settles it.
//! The keeper exclusively owns the key ring; nothing else touches the
//! mnemonic or the derived-key cache.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use warden_core::crypto::KdfParams;
use warden_core::error::{Result, WardenError};
use warden_core::keyring::{KeyRing, KeyRingStatus};
use warden_core::keys::{self, AccountKey};
use warden_core::kv::KvStore;

use crate::approver::{is_valid_request_id, AsyncApprover, DEFAULT_APPROVAL_TIMEOUT};
use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::hardware::{HardwareSigner, PopupOpener, TxBroadcaster};

/// Fixed id for the single unlock gate. Internal, so not subject to
/// the 8-hex-digit format required of untrusted ids.
const UNLOCK_ID: &str = "unlock";

const UNLOCK_POPUP_URL: &str = "popup.html#/unlock";
const SIGN_POPUP_URL: &str = "popup.html#/sign";
const TX_CONFIG_POPUP_URL: &str = "popup.html#/fee";

pub const DEFAULT_ACCOUNT_PATH: &str = "m/44'/118'/0'/0/0";

/// Fee/gas/memo parameters a transaction builder needs user sign-off
/// on. The approval result carries the (possibly edited) config back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBuilderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub gas: u64,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub fee: String,
}

/// What a pending sign request is asking consent for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub address: String,
    pub message: Vec<u8>,
}

pub struct KeeperConfig {
    pub kdf_params: KdfParams,
    pub approval_timeout: Duration,
    pub account_paths: Vec<String>,
    pub audit_capacity: usize,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::DEFAULT,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            account_paths: vec![DEFAULT_ACCOUNT_PATH.to_string()],
            audit_capacity: 10_000,
        }
    }
}

#[derive(Clone)]
enum AccountSlot {
    Local { path: String },
    Hardware,
}

struct AddressBook {
    slots: Vec<AccountSlot>,
    active: usize,
}

impl AddressBook {
    fn active_slot(&self) -> AccountSlot {
        self.slots[self.active].clone()
    }
}

pub struct KeyRingKeeper {
    keyring: Mutex<KeyRing>,
    book: Mutex<AddressBook>,
    unlock_approver: AsyncApprover<(), ()>,
    sign_approver: AsyncApprover<SignRequest, ()>,
    tx_config_approver: AsyncApprover<TxBuilderConfig, TxBuilderConfig>,
    popup: Arc<dyn PopupOpener>,
    hardware: Option<Arc<dyn HardwareSigner>>,
    broadcaster: Option<Arc<dyn TxBroadcaster>>,
    audit: Mutex<AuditLog>,
}

impl KeyRingKeeper {
    pub fn new(kv: Arc<dyn KvStore>, popup: Arc<dyn PopupOpener>, config: KeeperConfig) -> Self {
        let slots = config
            .account_paths
            .iter()
            .map(|path| AccountSlot::Local { path: path.clone() })
            .collect();

        Self {
            keyring: Mutex::new(KeyRing::new(kv, config.kdf_params)),
            book: Mutex::new(AddressBook { slots, active: 0 }),
            unlock_approver: AsyncApprover::new(config.approval_timeout),
            sign_approver: AsyncApprover::new(config.approval_timeout),
            tx_config_approver: AsyncApprover::new(config.approval_timeout),
            popup,
            hardware: None,
            broadcaster: None,
            audit: Mutex::new(AuditLog::new(config.audit_capacity)),
        }
    }

    /// Attach a hardware signer; its address joins the address book.
    pub fn with_hardware_signer(mut self, signer: Arc<dyn HardwareSigner>) -> Self {
        self.hardware = Some(signer);
        self.book.get_mut().slots.push(AccountSlot::Hardware);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn TxBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub async fn status(&self) -> KeyRingStatus {
        self.keyring.lock().await.status()
    }

    /// Load the persisted key store (process startup).
    pub async fn restore(&self) -> Result<KeyRingStatus> {
        let mut ring = self.keyring.lock().await;
        ring.restore().await?;
        Ok(ring.status())
    }

    /// Make the key ring usable, restoring and - when locked - opening
    /// the unlock consent surface and suspending until a separate
    /// `unlock` call approves the gate.
    pub async fn enable(&self) -> Result<KeyRingStatus> {
        {
            let mut ring = self.keyring.lock().await;
            if ring.status() == KeyRingStatus::NotLoaded {
                ring.restore().await?;
            }
            match ring.status() {
                KeyRingStatus::Empty => return Err(WardenError::KeyStoreMissing),
                KeyRingStatus::Unlocked => return Ok(KeyRingStatus::Unlocked),
                _ => {}
            }
        }

        self.popup.open_window(UNLOCK_POPUP_URL);
        self.unlock_approver.request(UNLOCK_ID, ()).await?;
        Ok(self.status().await)
    }

    pub async fn create_key(&self, mnemonic: &str, password: &str) -> Result<KeyRingStatus> {
        let status = {
            let mut ring = self.keyring.lock().await;
            ring.create_key(mnemonic, password)?;
            ring.save().await?;
            ring.status()
        };
        self.audit_log(AuditEntry::new(AuditAction::CreateKey)).await;
        info!("key ring created");
        Ok(status)
    }

    pub async fn unlock(&self, password: &str) -> Result<KeyRingStatus> {
        let result = self.keyring.lock().await.unlock(password);
        match result {
            Ok(()) => {
                self.audit_log(AuditEntry::new(AuditAction::Unlock)).await;
                info!("key ring unlocked");
                self.unlock_approver.approve(UNLOCK_ID, ());
                Ok(KeyRingStatus::Unlocked)
            }
            Err(e) => {
                if matches!(e, WardenError::AuthenticationFailed) {
                    self.audit_log(
                        AuditEntry::new(AuditAction::UnlockFailed).with_success(false),
                    )
                    .await;
                    warn!("unlock rejected: wrong password");
                }
                Err(e)
            }
        }
    }

    pub async fn lock(&self) -> Result<KeyRingStatus> {
        self.keyring.lock().await.lock()?;
        self.audit_log(AuditEntry::new(AuditAction::Lock)).await;
        info!("key ring locked");
        Ok(KeyRingStatus::Locked)
    }

    pub async fn verify_password(&self, password: &str) -> Result<bool> {
        self.keyring.lock().await.verify_password(password)
    }

    pub async fn update_password(&self, old: &str, new: &str) -> Result<bool> {
        let changed = self.keyring.lock().await.update_password(old, new).await?;
        if changed {
            self.audit_log(AuditEntry::new(AuditAction::UpdatePassword)).await;
        }
        Ok(changed)
    }

    pub async fn clear(&self) -> Result<KeyRingStatus> {
        let status = {
            let mut ring = self.keyring.lock().await;
            ring.clear().await?;
            ring.status()
        };
        self.audit_log(AuditEntry::new(AuditAction::ClearKeyRing)).await;
        warn!("key ring cleared");
        Ok(status)
    }

    /// Public key and address for `path`, or for the active account
    /// when no path is given.
    pub async fn get_key(&self, path: Option<&str>) -> Result<AccountKey> {
        match path {
            Some(path) => self.keyring.lock().await.get_key(path),
            None => {
                let slot = self.book.lock().await.active_slot();
                match slot {
                    AccountSlot::Local { path } => self.keyring.lock().await.get_key(&path),
                    AccountSlot::Hardware => {
                        let hw = self.hardware()?;
                        let public_key = hw.pub_key().await?;
                        let address = keys::address_from_pub_key(&public_key);
                        Ok(AccountKey {
                            public_key,
                            address,
                        })
                    }
                }
            }
        }
    }

    /// Suspend on the sign approver; once approved, sign with the
    /// active account - the hardware signer when that account is
    /// hardware-linked, the key ring otherwise.
    pub async fn request_sign(
        &self,
        id: &str,
        bech32_address: &str,
        message: &[u8],
        open_popup: bool,
    ) -> Result<Vec<u8>> {
        if !is_valid_request_id(id) {
            return Err(WardenError::InvalidRequestId(id.to_string()));
        }

        let active_slot = self.book.lock().await.active_slot();
        let active_address = self.slot_address(&active_slot).await?;
        if active_address != bech32_address {
            return Err(WardenError::AddressMismatch);
        }

        if open_popup {
            self.popup
                .open_window(&format!("{SIGN_POPUP_URL}?id={id}"));
        }

        let request = SignRequest {
            address: bech32_address.to_string(),
            message: message.to_vec(),
        };
        self.sign_approver.request(id, request).await?;

        let signature = match &active_slot {
            AccountSlot::Local { path } => {
                self.keyring.lock().await.sign(path, message)?.to_vec()
            }
            AccountSlot::Hardware => {
                let hw = self.hardware()?;
                hw.is_app_open().await?;
                hw.sign(message).await?
            }
        };

        self.audit_log(AuditEntry::new(AuditAction::SignApproved).with_request_id(id))
            .await;
        debug!(id, "sign request approved");
        Ok(signature)
    }

    /// The message a pending sign request wants signed.
    pub fn requested_message(&self, id: &str) -> Result<SignRequest> {
        self.sign_approver.data(id)
    }

    pub fn approve_sign(&self, id: &str) {
        self.sign_approver.approve(id, ());
    }

    pub async fn reject_sign(&self, id: &str) {
        self.sign_approver.reject(id);
        self.audit_log(
            AuditEntry::new(AuditAction::SignRejected)
                .with_request_id(id)
                .with_success(false),
        )
        .await;
    }

    /// Suspend until the user confirms (or edits) the fee/gas/memo
    /// configuration.
    pub async fn request_tx_builder_config(
        &self,
        config: TxBuilderConfig,
        id: &str,
        open_popup: bool,
    ) -> Result<TxBuilderConfig> {
        if !is_valid_request_id(id) {
            return Err(WardenError::InvalidRequestId(id.to_string()));
        }

        if open_popup {
            self.popup
                .open_window(&format!("{TX_CONFIG_POPUP_URL}?id={id}"));
        }

        let approved = self.tx_config_approver.request(id, config).await?;
        self.audit_log(AuditEntry::new(AuditAction::TxConfigApproved).with_request_id(id))
            .await;
        debug!(id, "tx builder config approved");
        Ok(approved)
    }

    pub fn requested_tx_config(&self, id: &str) -> Result<TxBuilderConfig> {
        self.tx_config_approver.data(id)
    }

    pub fn approve_tx_builder_config(&self, id: &str, config: TxBuilderConfig) {
        self.tx_config_approver.approve(id, config);
    }

    pub async fn reject_tx_builder_config(&self, id: &str) {
        self.tx_config_approver.reject(id);
        self.audit_log(
            AuditEntry::new(AuditAction::TxConfigRejected)
                .with_request_id(id)
                .with_success(false),
        )
        .await;
    }

    /// Relay an already-signed transaction to the network collaborator.
    pub async fn request_background_tx(&self, tx_bytes: &[u8]) -> Result<String> {
        let broadcaster = self
            .broadcaster
            .as_ref()
            .ok_or_else(|| WardenError::InvalidInput("no tx broadcaster attached".into()))?;

        let tx_hash = broadcaster.broadcast(tx_bytes).await?;
        self.audit_log(AuditEntry::new(AuditAction::BroadcastTx)).await;
        Ok(tx_hash)
    }

    pub async fn active_address(&self) -> Result<String> {
        let slot = self.book.lock().await.active_slot();
        self.slot_address(&slot).await
    }

    pub async fn every_address(&self) -> Result<Vec<String>> {
        let slots = self.book.lock().await.slots.clone();
        let mut addresses = Vec::with_capacity(slots.len());
        for slot in &slots {
            addresses.push(self.slot_address(slot).await?);
        }
        Ok(addresses)
    }

    /// Switch the single active account to the one owning `address`.
    pub async fn set_active_address(&self, address: &str) -> Result<()> {
        let slots = self.book.lock().await.slots.clone();
        for (index, slot) in slots.iter().enumerate() {
            if self.slot_address(slot).await? == address {
                self.book.lock().await.active = index;
                debug!(address, "active address changed");
                return Ok(());
            }
        }
        Err(WardenError::InvalidInput(format!(
            "unknown address: {address}"
        )))
    }

    pub async fn is_hardware_linked(&self, address: &str) -> Result<bool> {
        if self.hardware.is_none() {
            return Ok(false);
        }
        let slots = self.book.lock().await.slots.clone();
        for slot in &slots {
            if matches!(slot, AccountSlot::Hardware)
                && self.slot_address(slot).await? == address
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn audit_recent(&self, n: usize) -> Vec<AuditEntry> {
        self.audit.lock().await.recent(n)
    }

    async fn slot_address(&self, slot: &AccountSlot) -> Result<String> {
        match slot {
            AccountSlot::Local { path } => {
                Ok(self.keyring.lock().await.get_key(path)?.address)
            }
            AccountSlot::Hardware => {
                let hw = self.hardware()?;
                let public_key = hw.pub_key().await?;
                Ok(keys::address_from_pub_key(&public_key))
            }
        }
    }

    fn hardware(&self) -> Result<&Arc<dyn HardwareSigner>> {
        self.hardware
            .as_ref()
            .ok_or_else(|| WardenError::HardwareUnavailable("no hardware signer attached".into()))
    }

    async fn audit_log(&self, entry: AuditEntry) {
        self.audit.lock().await.log(entry);
    }
}
