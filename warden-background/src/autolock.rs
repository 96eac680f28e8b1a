// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inactivity supervisor.
//!
//! Polls at a fixed interval while armed. Single-writer discipline on
//! the persisted counter: only the supervisor increments it, only
//! [`TimeoutLock::report_activity`] resets it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use warden_core::error::{Result, WardenError};
use warden_core::keyring::KeyRingStatus;
use warden_core::kv::{self, KvStore};

use crate::keeper::KeyRingKeeper;

/// Fixed key under which accumulated inactive time (ms) is persisted.
pub const INACTIVE_TIME_KEY: &str = "auto-lock/inactive-ms";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub struct TimeoutLock {
    keeper: Arc<KeyRingKeeper>,
    kv: Arc<dyn KvStore>,
    poll_interval: Duration,
    lock_timeout: Duration,
}

impl TimeoutLock {
    pub fn new(
        keeper: Arc<KeyRingKeeper>,
        kv: Arc<dyn KvStore>,
        poll_interval: Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            keeper,
            kv,
            poll_interval,
            lock_timeout,
        }
    }

    /// Start polling. One-shot: the task exits after locking and must
    /// be re-armed by whoever observes the next unlock.
    pub fn arm(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval is immediate.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match this.poll_once().await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "auto-lock poll failed"),
                }
            }
        })
    }

    /// Reset accumulated inactive time (user activity observed).
    pub async fn report_activity(&self) -> Result<()> {
        kv::set_json(self.kv.as_ref(), INACTIVE_TIME_KEY, &0u64).await
    }

    /// One poll step. `Ok(true)` means the ring was locked and polling
    /// should stop.
    async fn poll_once(&self) -> Result<bool> {
        if self.keeper.status().await != KeyRingStatus::Unlocked {
            return Ok(false);
        }

        let inactive_ms: u64 = kv::get_json(self.kv.as_ref(), INACTIVE_TIME_KEY)
            .await?
            .unwrap_or(0);
        let inactive_ms = inactive_ms.saturating_add(self.poll_interval.as_millis() as u64);

        if inactive_ms >= self.lock_timeout.as_millis() as u64 {
            kv::set_json(self.kv.as_ref(), INACTIVE_TIME_KEY, &0u64).await?;
            match self.keeper.lock().await {
                Ok(_) => info!("locked key ring after inactivity"),
                // Lost the race to a manual lock; stop either way.
                Err(WardenError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
            Ok(true)
        } else {
            kv::set_json(self.kv.as_ref(), INACTIVE_TIME_KEY, &inactive_ms).await?;
            Ok(false)
        }
    }
}
