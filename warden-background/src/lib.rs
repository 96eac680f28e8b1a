// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Warden Background - the trust-boundary process of the extension
//! wallet
//!
//! One [`Background`] context is constructed at process start and owns
//! everything: the consent-gated [`keeper::KeyRingKeeper`], the
//! [`router::Router`] that carries typed messages from UI and page
//! contexts, and the [`autolock::TimeoutLock`] inactivity supervisor.

#![forbid(unsafe_code)]

pub mod approver;
pub mod audit;
pub mod autolock;
pub mod hardware;
pub mod keeper;
pub mod msgs;
pub mod rate_limit;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use warden_core::crypto::KdfParams;
use warden_core::error::Result;
use warden_core::keyring::KeyRingStatus;
use warden_core::kv::KvStore;

use crate::approver::DEFAULT_APPROVAL_TIMEOUT;
use crate::autolock::{TimeoutLock, DEFAULT_LOCK_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::hardware::{HardwareSigner, PopupOpener, TxBroadcaster};
use crate::keeper::{KeeperConfig, KeyRingKeeper, DEFAULT_ACCOUNT_PATH};
use crate::msgs::{MessageSender, ResponseEnvelope};
use crate::rate_limit::RateLimitConfig;
use crate::router::Router;

pub struct BackgroundConfig {
    pub kdf_params: KdfParams,
    pub approval_timeout: Duration,
    pub poll_interval: Duration,
    pub lock_timeout: Duration,
    pub account_paths: Vec<String>,
    pub audit_capacity: usize,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::DEFAULT,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            account_paths: vec![DEFAULT_ACCOUNT_PATH.to_string()],
            audit_capacity: 10_000,
            rate_limit: None,
        }
    }
}

/// The single long-lived background context.
pub struct Background {
    keeper: Arc<KeyRingKeeper>,
    router: Router,
    autolock: Arc<TimeoutLock>,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Background {
    pub fn new(
        kv: Arc<dyn KvStore>,
        popup: Arc<dyn PopupOpener>,
        hardware: Option<Arc<dyn HardwareSigner>>,
        broadcaster: Option<Arc<dyn TxBroadcaster>>,
        config: BackgroundConfig,
    ) -> Self {
        let mut keeper = KeyRingKeeper::new(
            kv.clone(),
            popup,
            KeeperConfig {
                kdf_params: config.kdf_params,
                approval_timeout: config.approval_timeout,
                account_paths: config.account_paths,
                audit_capacity: config.audit_capacity,
            },
        );
        if let Some(signer) = hardware {
            keeper = keeper.with_hardware_signer(signer);
        }
        if let Some(broadcaster) = broadcaster {
            keeper = keeper.with_broadcaster(broadcaster);
        }

        let keeper = Arc::new(keeper);
        let router = Router::new(keeper.clone(), config.rate_limit);
        let autolock = Arc::new(TimeoutLock::new(
            keeper.clone(),
            kv,
            config.poll_interval,
            config.lock_timeout,
        ));

        Self {
            keeper,
            router,
            autolock,
            supervisor: std::sync::Mutex::new(None),
        }
    }

    pub fn keeper(&self) -> &Arc<KeyRingKeeper> {
        &self.keeper
    }

    /// Single entry point for request envelopes. Re-arms the auto-lock
    /// supervisor whenever the key ring is observed unlocked (the
    /// supervisor is one-shot and exits after each auto-lock).
    pub async fn handle(&self, raw: &str, sender: &MessageSender) -> ResponseEnvelope {
        let response = self.router.handle(raw, sender).await;
        if self.keeper.status().await == KeyRingStatus::Unlocked {
            self.ensure_supervisor_armed();
        }
        response
    }

    /// User activity observed by the host resets the inactivity clock.
    pub async fn report_activity(&self) -> Result<()> {
        self.autolock.report_activity().await
    }

    fn ensure_supervisor_armed(&self) {
        let mut guard = self.supervisor.lock().expect("supervisor lock poisoned");
        let armed = guard.as_ref().is_some_and(|handle| !handle.is_finished());
        if !armed {
            *guard = Some(self.autolock.arm());
        }
    }
}
