// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Password KDF and AEAD primitives for the encrypted key store.

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::{Blake2b512, Digest};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    XChaCha20Poly1305,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, WardenError};

pub const SALT_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const KEY_SIZE: usize = 32;
pub const TAG_SIZE: usize = 16;

/// Argon2id cost parameters, persisted beside the ciphertext so old
/// key stores stay decryptable after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub const TESTING: Self = Self {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };

    pub const DEFAULT: Self = Self {
        memory_kib: 256 * 1024,
        iterations: 4,
        parallelism: 4,
    };

    pub const HIGH: Self = Self {
        memory_kib: 512 * 1024,
        iterations: 6,
        parallelism: 4,
    };
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub fn derive_key(
    password: &[u8],
    salt: &[u8; SALT_SIZE],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let argon2_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| WardenError::Encryption(format!("argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut output = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password, salt, output.as_mut())
        .map_err(|e| WardenError::Encryption(format!("argon2: {e}")))?;

    Ok(output)
}

#[derive(Clone)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<EncryptedData> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce_ga = GenericArray::from_slice(&nonce);

    let ciphertext = cipher
        .encrypt(nonce_ga, plaintext)
        .map_err(|_| WardenError::Encryption("encryption failed".into()))?;

    Ok(EncryptedData { ciphertext, nonce })
}

/// Authenticated decryption. A wrong key surfaces as
/// [`WardenError::AuthenticationFailed`] - the AEAD tag is the password
/// check.
pub fn decrypt(encrypted: &EncryptedData, key: &[u8; KEY_SIZE]) -> Result<Zeroizing<Vec<u8>>> {
    if encrypted.ciphertext.len() < TAG_SIZE {
        return Err(WardenError::Encryption("ciphertext too short".into()));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = GenericArray::from_slice(&encrypted.nonce);

    let plaintext = cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| WardenError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    let result = hasher.finalize();

    let mut output = [0u8; 32];
    output.copy_from_slice(&result[..32]);
    output
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
