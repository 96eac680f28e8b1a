// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

use crate::keyring::KeyRingStatus;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("operation {op} is not allowed while the key ring is {status}")]
    InvalidState {
        op: &'static str,
        status: KeyRingStatus,
    },

    #[error("authentication failed - wrong password or corrupted key store")]
    AuthenticationFailed,

    #[error("no key store exists")]
    KeyStoreMissing,

    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("unknown request id: {0}")]
    UnknownRequestId(String),

    #[error("request id already pending: {0}")]
    DuplicateRequestId(String),

    #[error("malformed request id: {0}")]
    InvalidRequestId(String),

    #[error("approval timed out")]
    ApprovalTimeout,

    #[error("request rejected by user")]
    UserRejected,

    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("address does not match the active key")]
    AddressMismatch,

    #[error("rate limited, retry after {0}s")]
    RateLimited(u32),

    #[error("hardware signer unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("hardware app version mismatch: expected {expected}, found {found}")]
    HardwareVersionMismatch { expected: String, found: String },

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl WardenError {
    /// Stable kind tag carried in error response envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid-state",
            Self::AuthenticationFailed => "authentication-failed",
            Self::KeyStoreMissing => "key-store-missing",
            Self::InvalidMnemonic(_) => "invalid-mnemonic",
            Self::InvalidPath(_) => "invalid-path",
            Self::Derivation(_) => "derivation-failed",
            Self::UnknownRequestId(_) => "unknown-request-id",
            Self::DuplicateRequestId(_) => "duplicate-request-id",
            Self::InvalidRequestId(_) => "invalid-request-id",
            Self::ApprovalTimeout => "timeout",
            Self::UserRejected => "user-rejected",
            Self::OriginNotAllowed(_) => "origin-not-allowed",
            Self::UnknownMessageType(_) => "unknown-message-type",
            Self::UnknownRoute(_) => "unknown-route",
            Self::AddressMismatch => "address-mismatch",
            Self::RateLimited(_) => "rate-limited",
            Self::HardwareUnavailable(_) => "hardware-unavailable",
            Self::HardwareVersionMismatch { .. } => "hardware-version-mismatch",
            Self::Encryption(_) => "encryption-error",
            Self::Storage(_) => "storage-error",
            Self::Serialization(_) => "serialization-error",
            Self::InvalidInput(_) => "invalid-input",
        }
    }

    /// Message text safe to hand to an untrusted page context.
    ///
    /// Internal callers get the full `Display` text; external responses
    /// must not leak key-store or storage details.
    pub fn sanitize_for_external(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "operation not allowed in current state",
            Self::AuthenticationFailed => "authentication failed",
            Self::KeyStoreMissing => "key doesn't exist",
            Self::InvalidMnemonic(_) => "invalid mnemonic",
            Self::InvalidPath(_) | Self::Derivation(_) => "key derivation failed",
            Self::UnknownRequestId(_) => "unknown request id",
            Self::DuplicateRequestId(_) => "request id already pending",
            Self::InvalidRequestId(_) => "malformed request id",
            Self::ApprovalTimeout => "approval timed out",
            Self::UserRejected => "request rejected",
            Self::OriginNotAllowed(_) => "origin not allowed",
            Self::UnknownMessageType(_) => "unknown message type",
            Self::UnknownRoute(_) => "unknown route",
            Self::AddressMismatch => "address does not match the active key",
            Self::RateLimited(_) => "rate limited",
            Self::HardwareUnavailable(_) => "hardware signer unavailable",
            Self::HardwareVersionMismatch { .. } => "hardware app version mismatch",
            Self::Encryption(_) => "cryptographic operation failed",
            Self::Storage(_) => "storage error",
            Self::Serialization(_) => "data format error",
            Self::InvalidInput(_) => "invalid input",
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
