// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Route-keyed dispatch of envelope messages into the keeper.
//!
//! The router is the sole external authorization boundary: every
//! message from an untrusted page context must pass the origin check
//! (and the per-origin rate limiter) before any handler runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use warden_core::error::{Result, WardenError};

use crate::keeper::KeyRingKeeper;
use crate::msgs::{Envelope, KeyRingMsg, MessageSender, ResponseEnvelope, TxMsg};
use crate::msgs::{KEYRING_ROUTE, TX_ROUTE};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

const MAX_RATE_LIMITERS: usize = 1_000;

pub struct Router {
    keeper: Arc<KeyRingKeeper>,
    rate_limit: Option<RateLimitConfig>,
    limiters: Mutex<HashMap<String, RateLimiter>>,
}

impl Router {
    pub fn new(keeper: Arc<KeyRingKeeper>, rate_limit: Option<RateLimitConfig>) -> Self {
        Self {
            keeper,
            rate_limit,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one serialized request envelope. Always produces exactly
    /// one response envelope.
    pub async fn handle(&self, raw: &str, sender: &MessageSender) -> ResponseEnvelope {
        match self.dispatch(raw, sender).await {
            Ok(payload) => ResponseEnvelope::ok(payload),
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "request failed");
                ResponseEnvelope::err(&e, !sender.internal)
            }
        }
    }

    async fn dispatch(&self, raw: &str, sender: &MessageSender) -> Result<Value> {
        let env: Envelope = serde_json::from_str(raw)
            .map_err(|e| WardenError::InvalidInput(format!("malformed envelope: {e}")))?;

        debug!(route = %env.route, msg_type = %env.msg_type, internal = sender.internal, "dispatch");

        match env.route.as_str() {
            KEYRING_ROUTE => {
                let msg: KeyRingMsg = parse_route_msg(&env, KeyRingMsg::TYPES)?;
                msg.validate_basic()?;
                self.authorize(&env, msg.external_allowed(), sender)?;
                self.handle_keyring(msg).await
            }
            TX_ROUTE => {
                let msg: TxMsg = parse_route_msg(&env, TxMsg::TYPES)?;
                msg.validate_basic()?;
                self.authorize(&env, msg.external_allowed(), sender)?;
                self.handle_tx(msg).await
            }
            other => Err(WardenError::UnknownRoute(other.to_string())),
        }
    }

    /// Internal senders are trusted. External senders must use an
    /// externally-reachable message type and declare an origin equal to
    /// the origin of their sender URL.
    fn authorize(
        &self,
        env: &Envelope,
        external_allowed: bool,
        sender: &MessageSender,
    ) -> Result<()> {
        if sender.internal {
            return Ok(());
        }

        if !external_allowed {
            return Err(WardenError::OriginNotAllowed(format!(
                "message type {} is internal-only",
                env.msg_type
            )));
        }

        let declared = env
            .origin
            .as_deref()
            .ok_or_else(|| WardenError::OriginNotAllowed("origin not declared".into()))?;
        let sender_url = sender
            .url
            .as_deref()
            .ok_or_else(|| WardenError::OriginNotAllowed("sender has no url".into()))?;

        let sender_origin = origin_of(sender_url)?;
        if origin_of(declared)? != sender_origin {
            return Err(WardenError::OriginNotAllowed(declared.to_string()));
        }

        self.check_rate_limit(&sender_origin)
    }

    fn check_rate_limit(&self, origin: &str) -> Result<()> {
        let config = match &self.rate_limit {
            Some(config) => config,
            None => return Ok(()),
        };

        let mut limiters = self.limiters.lock().expect("limiter table lock poisoned");

        if limiters.len() >= MAX_RATE_LIMITERS && !limiters.contains_key(origin) {
            limiters.retain(|_, limiter| !limiter.is_empty());
            if limiters.len() >= MAX_RATE_LIMITERS {
                let oldest = limiters
                    .iter()
                    .min_by_key(|(_, limiter)| limiter.last_used())
                    .map(|(key, _)| key.clone());
                if let Some(key) = oldest {
                    limiters.remove(&key);
                }
            }
        }

        let limiter = limiters
            .entry(origin.to_string())
            .or_insert_with(|| RateLimiter::new(config.clone()));

        limiter
            .check_and_record()
            .map_err(WardenError::RateLimited)
    }

    async fn handle_keyring(&self, msg: KeyRingMsg) -> Result<Value> {
        match msg {
            KeyRingMsg::Enable => {
                let status = self.keeper.enable().await?;
                Ok(json!({ "status": status }))
            }
            KeyRingMsg::GetStatus => {
                Ok(json!({ "status": self.keeper.status().await }))
            }
            KeyRingMsg::GetKey { path } => {
                let key = self.keeper.get_key(path.as_deref()).await?;
                Ok(json!({
                    "pubKeyHex": hex::encode(&key.public_key),
                    "address": key.address,
                }))
            }
            KeyRingMsg::CreateKey { mnemonic, password } => {
                let status = self.keeper.create_key(&mnemonic, &password).await?;
                Ok(json!({ "status": status }))
            }
            KeyRingMsg::Unlock { password } => {
                let status = self.keeper.unlock(&password).await?;
                Ok(json!({ "status": status }))
            }
            KeyRingMsg::Lock => {
                let status = self.keeper.lock().await?;
                Ok(json!({ "status": status }))
            }
            KeyRingMsg::UpdatePassword { old, new } => {
                let success = self.keeper.update_password(&old, &new).await?;
                Ok(json!({ "success": success }))
            }
            KeyRingMsg::Clear => {
                let status = self.keeper.clear().await?;
                Ok(json!({ "status": status }))
            }
            KeyRingMsg::SetActiveAddress { address } => {
                self.keeper.set_active_address(&address).await?;
                Ok(json!({ "address": address }))
            }
            KeyRingMsg::GetEveryAddress => {
                let addresses = self.keeper.every_address().await?;
                Ok(json!({ "addresses": addresses }))
            }
            KeyRingMsg::RequestSign {
                id,
                bech32_address,
                message_hex,
                open_popup,
            } => {
                let message = hex::decode(&message_hex)
                    .map_err(|_| WardenError::InvalidInput("messageHex is not valid hex".into()))?;
                let signature = self
                    .keeper
                    .request_sign(&id, &bech32_address, &message, open_popup)
                    .await?;
                Ok(json!({ "signatureHex": hex::encode(signature) }))
            }
            KeyRingMsg::GetRequestedMessage { id } => {
                let pending = self.keeper.requested_message(&id)?;
                Ok(json!({
                    "address": pending.address,
                    "messageHex": hex::encode(&pending.message),
                }))
            }
            KeyRingMsg::ApproveSign { id } => {
                self.keeper.approve_sign(&id);
                Ok(json!({}))
            }
            KeyRingMsg::RejectSign { id } => {
                self.keeper.reject_sign(&id).await;
                Ok(json!({}))
            }
        }
    }

    async fn handle_tx(&self, msg: TxMsg) -> Result<Value> {
        match msg {
            TxMsg::RequestTxBuilderConfig {
                id,
                config,
                open_popup,
            } => {
                let approved = self
                    .keeper
                    .request_tx_builder_config(config, &id, open_popup)
                    .await?;
                Ok(json!({ "config": approved }))
            }
            TxMsg::GetRequestedTxConfig { id } => {
                let config = self.keeper.requested_tx_config(&id)?;
                Ok(json!({ "config": config }))
            }
            TxMsg::ApproveTxBuilderConfig { id, config } => {
                self.keeper.approve_tx_builder_config(&id, config);
                Ok(json!({}))
            }
            TxMsg::RejectTxBuilderConfig { id } => {
                self.keeper.reject_tx_builder_config(&id).await;
                Ok(json!({}))
            }
            TxMsg::RequestBackgroundTx { tx_hex } => {
                let tx_bytes = hex::decode(&tx_hex)
                    .map_err(|_| WardenError::InvalidInput("txHex is not valid hex".into()))?;
                let tx_hash = self.keeper.request_background_tx(&tx_bytes).await?;
                Ok(json!({ "txHash": tx_hash }))
            }
        }
    }
}

fn parse_route_msg<T: DeserializeOwned>(env: &Envelope, known: &[&str]) -> Result<T> {
    if !known.contains(&env.msg_type.as_str()) {
        return Err(WardenError::UnknownMessageType(env.msg_type.clone()));
    }

    let value = json!({ "type": env.msg_type.clone(), "payload": env.payload.clone() });
    serde_json::from_value(value)
        .map_err(|e| WardenError::InvalidInput(format!("malformed payload: {e}")))
}

/// `scheme://host[:port]` of a URL or origin string, lowercased.
fn origin_of(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| WardenError::OriginNotAllowed(format!("not a url: {url}")))?;

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Strip userinfo if present.
    let host = authority.rsplit('@').next().unwrap_or_default();

    if scheme.is_empty() || host.is_empty() {
        return Err(WardenError::OriginNotAllowed(format!("not a url: {url}")));
    }

    Ok(format!("{scheme}://{host}").to_ascii_lowercase())
}
