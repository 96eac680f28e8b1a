// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Warden Core - key custody for the Warden extension wallet
//!
//! This crate provides the secret-material layer of the background
//! process:
//! - Encrypted-at-rest key store (Argon2id + XChaCha20-Poly1305)
//! - The key-ring state machine (not loaded / empty / locked / unlocked)
//! - Deterministic secp256k1 derivation and signing from a BIP39 mnemonic
//! - The key-value persistence collaborator trait

#![forbid(unsafe_code)]

pub mod crypto;
pub mod error;
pub mod keyring;
pub mod keys;
pub mod keystore;
pub mod kv;

pub use error::{Result, WardenError};
pub use keyring::{KeyRing, KeyRingStatus};
