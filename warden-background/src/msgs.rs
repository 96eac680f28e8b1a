// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire message types for the cross-context channel.
//!
//! Every request is an [`Envelope`] naming a route, a message type and
//! a payload. Per-route message sets are closed serde enums, so the
//! set of dispatchable types is fixed at compile time; anything else is
//! an unknown-message-type error before a handler runs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_core::error::{Result, WardenError};

use crate::keeper::TxBuilderConfig;

pub const KEYRING_ROUTE: &str = "keyring";
pub const TX_ROUTE: &str = "tx";

/// Identity of the message sender, supplied by the extension host.
/// `internal` marks the extension's own UI pages; everything else is
/// an untrusted page context.
#[derive(Debug, Clone)]
pub struct MessageSender {
    pub internal: bool,
    pub url: Option<String>,
}

impl MessageSender {
    pub fn internal() -> Self {
        Self {
            internal: true,
            url: None,
        }
    }

    pub fn external(url: impl Into<String>) -> Self {
        Self {
            internal: false,
            url: Some(url.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub route: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum KeyRingMsg {
    Enable,
    GetStatus,
    #[serde(rename_all = "camelCase")]
    GetKey {
        #[serde(default)]
        path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CreateKey { mnemonic: String, password: String },
    #[serde(rename_all = "camelCase")]
    Unlock { password: String },
    Lock,
    #[serde(rename_all = "camelCase")]
    UpdatePassword { old: String, new: String },
    Clear,
    #[serde(rename_all = "camelCase")]
    SetActiveAddress { address: String },
    GetEveryAddress,
    #[serde(rename_all = "camelCase")]
    RequestSign {
        id: String,
        bech32_address: String,
        message_hex: String,
        #[serde(default)]
        open_popup: bool,
    },
    #[serde(rename_all = "camelCase")]
    GetRequestedMessage { id: String },
    #[serde(rename_all = "camelCase")]
    ApproveSign { id: String },
    #[serde(rename_all = "camelCase")]
    RejectSign { id: String },
}

impl KeyRingMsg {
    pub const TYPES: &'static [&'static str] = &[
        "enable",
        "get-status",
        "get-key",
        "create-key",
        "unlock",
        "lock",
        "update-password",
        "clear",
        "set-active-address",
        "get-every-address",
        "request-sign",
        "get-requested-message",
        "approve-sign",
        "reject-sign",
    ];

    /// Whether an untrusted page context may send this message at all.
    /// Pages may read the active key but never pick derivation paths.
    pub fn external_allowed(&self) -> bool {
        matches!(
            self,
            Self::Enable | Self::GetKey { path: None } | Self::RequestSign { .. }
        )
    }

    pub fn validate_basic(&self) -> Result<()> {
        match self {
            Self::CreateKey { mnemonic, password } => {
                require_non_empty(mnemonic, "mnemonic")?;
                require_non_empty(password, "password")
            }
            Self::Unlock { password } => require_non_empty(password, "password"),
            Self::UpdatePassword { old, new } => {
                require_non_empty(old, "old password")?;
                require_non_empty(new, "new password")
            }
            Self::SetActiveAddress { address } => require_non_empty(address, "address"),
            Self::GetKey { path: Some(path) } => require_non_empty(path, "path"),
            Self::RequestSign {
                id,
                bech32_address,
                message_hex,
                ..
            } => {
                require_non_empty(id, "id")?;
                require_non_empty(bech32_address, "bech32Address")?;
                if hex::decode(message_hex).is_err() {
                    return Err(WardenError::InvalidInput(
                        "messageHex is not valid hex".into(),
                    ));
                }
                Ok(())
            }
            Self::GetRequestedMessage { id }
            | Self::ApproveSign { id }
            | Self::RejectSign { id } => require_non_empty(id, "id"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum TxMsg {
    #[serde(rename_all = "camelCase")]
    RequestTxBuilderConfig {
        id: String,
        config: TxBuilderConfig,
        #[serde(default)]
        open_popup: bool,
    },
    #[serde(rename_all = "camelCase")]
    GetRequestedTxConfig { id: String },
    #[serde(rename_all = "camelCase")]
    ApproveTxBuilderConfig { id: String, config: TxBuilderConfig },
    #[serde(rename_all = "camelCase")]
    RejectTxBuilderConfig { id: String },
    #[serde(rename_all = "camelCase")]
    RequestBackgroundTx { tx_hex: String },
}

impl TxMsg {
    pub const TYPES: &'static [&'static str] = &[
        "request-tx-builder-config",
        "get-requested-tx-config",
        "approve-tx-builder-config",
        "reject-tx-builder-config",
        "request-background-tx",
    ];

    pub fn external_allowed(&self) -> bool {
        matches!(
            self,
            Self::RequestTxBuilderConfig { .. } | Self::RequestBackgroundTx { .. }
        )
    }

    pub fn validate_basic(&self) -> Result<()> {
        match self {
            Self::RequestTxBuilderConfig { id, .. }
            | Self::GetRequestedTxConfig { id }
            | Self::ApproveTxBuilderConfig { id, .. }
            | Self::RejectTxBuilderConfig { id } => require_non_empty(id, "id"),
            Self::RequestBackgroundTx { tx_hex } => {
                require_non_empty(tx_hex, "txHex")?;
                if hex::decode(tx_hex).is_err() {
                    return Err(WardenError::InvalidInput("txHex is not valid hex".into()));
                }
                Ok(())
            }
        }
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        Err(WardenError::InvalidInput(format!(
            "{field} must not be empty"
        )))
    } else {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// `{ payload }` on success, `{ error: { kind, message } }` on failure.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn ok(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            error: None,
        }
    }

    /// External callers get sanitized message text; internal callers
    /// the full error display.
    pub fn err(error: &WardenError, external: bool) -> Self {
        let message = if external {
            error.sanitize_for_external().to_string()
        } else {
            error.to_string()
        };
        Self {
            payload: None,
            error: Some(ErrorBody {
                kind: error.kind(),
                message,
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
