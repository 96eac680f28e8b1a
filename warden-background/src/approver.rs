// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Generic suspend-until-consent gate.
//!
//! A caller registers a request under an id and suspends; some other
//! actor later approves or rejects that id, or the per-entry timer
//! fires. Exactly one of the three settles the request and removes it.
//! The approver knows nothing about what is being approved.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use warden_core::error::{Result, WardenError};

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(180);

/// Untrusted callers must present ids of exactly 8 ASCII hex digits.
/// Internal fixed ids (e.g. the unlock gate) are exempt.
pub fn is_valid_request_id(id: &str) -> bool {
    id.len() == 8 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

struct Pending<TReq, TRes> {
    data: TReq,
    reply: oneshot::Sender<Result<TRes>>,
    timer: JoinHandle<()>,
}

pub struct AsyncApprover<TReq, TRes> {
    pending: Arc<Mutex<HashMap<String, Pending<TReq, TRes>>>>,
    timeout: Duration,
}

impl<TReq, TRes> AsyncApprover<TReq, TRes>
where
    TReq: Clone + Send + 'static,
    TRes: Send + 'static,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Register `id` and suspend until approve, reject, or timeout.
    /// A still-pending duplicate id fails immediately.
    pub async fn request(&self, id: &str, data: TReq) -> Result<TRes> {
        let (reply, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().expect("pending table lock poisoned");
            if pending.contains_key(id) {
                return Err(WardenError::DuplicateRequestId(id.to_string()));
            }

            let timer = tokio::spawn({
                let pending = Arc::clone(&self.pending);
                let id = id.to_string();
                let timeout = self.timeout;
                async move {
                    tokio::time::sleep(timeout).await;
                    let entry = pending
                        .lock()
                        .expect("pending table lock poisoned")
                        .remove(&id);
                    if let Some(entry) = entry {
                        debug!(id, "approval timed out");
                        let _ = entry.reply.send(Err(WardenError::ApprovalTimeout));
                    }
                }
            });

            pending.insert(id.to_string(), Pending { data, reply, timer });
        }

        rx.await.unwrap_or(Err(WardenError::UserRejected))
    }

    /// Data associated with a pending id, for the consent UI.
    pub fn data(&self, id: &str) -> Result<TReq> {
        self.pending
            .lock()
            .expect("pending table lock poisoned")
            .get(id)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| WardenError::UnknownRequestId(id.to_string()))
    }

    /// Resolve a pending request. A no-op for ids that are no longer
    /// pending: approve may race the timeout, and losing that race is
    /// not an error for the approving side.
    pub fn approve(&self, id: &str, result: TRes) {
        let entry = self
            .pending
            .lock()
            .expect("pending table lock poisoned")
            .remove(id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.reply.send(Ok(result));
            }
            None => debug!(id, "approve for id that is not pending"),
        }
    }

    /// Reject a pending request with a user-cancellation error. No-op
    /// for ids that are no longer pending.
    pub fn reject(&self, id: &str) {
        let entry = self
            .pending
            .lock()
            .expect("pending table lock poisoned")
            .remove(id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.reply.send(Err(WardenError::UserRejected));
            }
            None => debug!(id, "reject for id that is not pending"),
        }
    }
}

impl<TReq, TRes> Default for AsyncApprover<TReq, TRes>
where
    TReq: Clone + Send + 'static,
    TRes: Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approver(secs: u64) -> Arc<AsyncApprover<String, u32>> {
        Arc::new(AsyncApprover::new(Duration::from_secs(secs)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_resolves_request() {
        let gate = approver(180);

        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "payload".into()).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(gate.data("ab12cd34").unwrap(), "payload");

        gate.approve("ab12cd34", 7);
        assert_eq!(pending.await.unwrap().unwrap(), 7);

        // Settled entries are removed.
        assert!(matches!(
            gate.data("ab12cd34"),
            Err(WardenError::UnknownRequestId(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_is_user_rejected() {
        let gate = approver(180);

        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "payload".into()).await }
        });
        tokio::task::yield_now().await;

        gate.reject("ab12cd34");
        assert!(matches!(
            pending.await.unwrap(),
            Err(WardenError::UserRejected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_pending_id_fails() {
        let gate = approver(180);

        let _pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "first".into()).await }
        });
        tokio::task::yield_now().await;

        let result = gate.request("ab12cd34", "second".into()).await;
        assert!(matches!(result, Err(WardenError::DuplicateRequestId(_))));

        // The original entry is untouched.
        assert_eq!(gate.data("ab12cd34").unwrap(), "first");
        gate.reject("ab12cd34");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_and_removes() {
        let gate = approver(30);

        let result = gate.request("ab12cd34", "payload".into()).await;
        assert!(matches!(result, Err(WardenError::ApprovalTimeout)));

        assert!(matches!(
            gate.data("ab12cd34"),
            Err(WardenError::UnknownRequestId(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_is_exactly_once() {
        let gate = approver(180);

        let pending = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "payload".into()).await }
        });
        tokio::task::yield_now().await;

        gate.reject("ab12cd34");
        // Late approve and double reject are silent no-ops.
        gate.approve("ab12cd34", 1);
        gate.reject("ab12cd34");

        assert!(matches!(
            pending.await.unwrap(),
            Err(WardenError::UserRejected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancelled_on_settle_spares_reused_id() {
        let gate = approver(30);

        let first = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "first".into()).await }
        });
        tokio::task::yield_now().await;
        gate.approve("ab12cd34", 1);
        first.await.unwrap().unwrap();

        // Re-use the id; the first entry's timer must not fire into it.
        let second = tokio::spawn({
            let gate = gate.clone();
            async move { gate.request("ab12cd34", "second".into()).await }
        });
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(gate.data("ab12cd34").unwrap(), "second");

        gate.approve("ab12cd34", 2);
        assert_eq!(second.await.unwrap().unwrap(), 2);
    }

    #[test]
    fn test_request_id_format() {
        assert!(is_valid_request_id("ab12cd34"));
        assert!(is_valid_request_id("AB12CD34"));
        assert!(!is_valid_request_id("ab12cd3"));
        assert!(!is_valid_request_id("ab12cd345"));
        assert!(!is_valid_request_id("ab12cdzz"));
        assert!(!is_valid_request_id(""));
    }
}
