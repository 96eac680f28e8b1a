// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic secp256k1 key derivation and signing.
//!
//! Derivation follows BIP32 over the BIP39 seed: master key from
//! `HMAC-SHA512(key="Bitcoin seed", data=seed)`, then per path
//! component `k_child = parse256(IL) + k_parent (mod n)`, with the
//! hardened/normal split deciding whether the private or the public
//! parent serialization feeds the HMAC. Same mnemonic and path always
//! yield the same key, so callers may cache derived keys freely.

use bech32::{Bech32, Hrp};
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto;
use crate::error::{Result, WardenError};

type HmacSha512 = Hmac<Sha512>;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Human-readable part of every Warden account address.
const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("wrd");

/// Public half of a derived account: compressed SEC1 public key plus
/// its bech32 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub public_key: Vec<u8>,
    pub address: String,
}

/// Parse and seed a BIP39 mnemonic (empty passphrase).
pub fn seed_from_mnemonic(phrase: &str) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase)
        .map_err(|e| WardenError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

/// Validate a BIP39 mnemonic without deriving the seed.
pub fn validate_mnemonic(phrase: &str) -> Result<()> {
    bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase)
        .map(|_| ())
        .map_err(|e| WardenError::InvalidMnemonic(e.to_string()))
}

/// Derive the signing key for `path` (e.g. `m/44'/118'/0'/0/0`) from a
/// BIP39 seed.
pub fn derive_signing_key(seed: &[u8; 64], path: &str) -> Result<SigningKey> {
    let components = parse_derivation_path(path)?;

    let (mut key, mut chain_code) = master_key_from_seed(seed)?;

    for component in &components {
        let (child_key, child_chain) = derive_child(&key, &chain_code, *component)?;
        chain_code.zeroize();
        key = child_key;
        chain_code = child_chain;
    }

    let signing_key = SigningKey::from_bytes(&key.to_repr())
        .map_err(|_| WardenError::Derivation("derived key out of range".into()))?;
    chain_code.zeroize();

    Ok(signing_key)
}

/// Public key and address for a signing key.
pub fn account_key(signing_key: &SigningKey) -> AccountKey {
    let public_key = signing_key
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec();
    let address = address_from_pub_key(&public_key);
    AccountKey {
        public_key,
        address,
    }
}

/// Bech32 address for a compressed secp256k1 public key: the first 20
/// bytes of blake2b-256 of the key, under the `wrd` HRP.
pub fn address_from_pub_key(compressed: &[u8]) -> String {
    let digest = crypto::blake2b_256(compressed);
    bech32::encode::<Bech32>(ADDRESS_HRP, &digest[..20])
        .expect("bech32 encode of 20-byte hash with valid HRP is infallible")
}

/// Sign `message` (SHA-256 prehash, RFC 6979 nonce), returning the
/// 64-byte compact signature.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Result<[u8; 64]> {
    let digest = Sha256::digest(message);
    let signature: Signature = signing_key
        .sign_prehash(digest.as_slice())
        .map_err(|e| WardenError::Derivation(format!("signing failed: {e}")))?;

    let mut out = [0u8; 64];
    out.copy_from_slice(signature.to_bytes().as_slice());
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildIndex {
    index: u32,
    hardened: bool,
}

fn master_key_from_seed(seed: &[u8]) -> Result<(Scalar, [u8; 32])> {
    let i = hmac_sha512(MASTER_HMAC_KEY, seed);

    let mut il = [0u8; 32];
    let mut chain_code = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    chain_code.copy_from_slice(&i[32..]);

    let key = scalar_from_bytes(&il);
    il.zeroize();

    match key {
        Some(k) if !bool::from(k.is_zero()) => Ok((k, chain_code)),
        _ => Err(WardenError::Derivation("invalid master key".into())),
    }
}

fn derive_child(
    parent_key: &Scalar,
    parent_chain_code: &[u8; 32],
    child: ChildIndex,
) -> Result<(Scalar, [u8; 32])> {
    // data = 0x00 || ser256(k_par) || ser32(i)  (hardened)
    //      = serP(point(k_par))    || ser32(i)  (normal)
    let mut data = Zeroizing::new(Vec::with_capacity(37));
    let raw_index = if child.hardened {
        data.push(0x00);
        data.extend_from_slice(parent_key.to_repr().as_slice());
        child.index | HARDENED_OFFSET
    } else {
        let point = (ProjectivePoint::GENERATOR * parent_key).to_affine();
        data.extend_from_slice(point.to_encoded_point(true).as_bytes());
        child.index
    };
    data.extend_from_slice(&raw_index.to_be_bytes());

    let i = hmac_sha512(parent_chain_code, &data);

    let mut il = [0u8; 32];
    let mut chain_code = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    chain_code.copy_from_slice(&i[32..]);

    let tweak = scalar_from_bytes(&il);
    il.zeroize();

    let tweak = tweak.ok_or_else(|| WardenError::Derivation("child tweak out of range".into()))?;
    let child_key = tweak + parent_key;
    if bool::from(child_key.is_zero()) {
        return Err(WardenError::Derivation("derived zero child key".into()));
    }

    Ok((child_key, chain_code))
}

fn scalar_from_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    Scalar::from_repr((*bytes).into()).into()
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let mut output = [0u8; 64];
    output.copy_from_slice(mac.finalize().into_bytes().as_slice());
    output
}

fn parse_derivation_path(path: &str) -> Result<Vec<ChildIndex>> {
    let trimmed = path.trim();

    let components = trimmed
        .strip_prefix("m/")
        .ok_or_else(|| WardenError::InvalidPath(format!("path must start with 'm/': {trimmed}")))?;

    if components.is_empty() {
        return Err(WardenError::InvalidPath(
            "path must have at least one component".into(),
        ));
    }

    let mut parsed = Vec::new();
    for part in components.split('/') {
        if part.is_empty() {
            return Err(WardenError::InvalidPath(format!(
                "empty component in path: {trimmed}"
            )));
        }

        let (num_str, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
            Some(num) => (num, true),
            None => (part, false),
        };

        let index: u32 = num_str
            .parse()
            .map_err(|_| WardenError::InvalidPath(format!("invalid index '{part}'")))?;

        if index >= HARDENED_OFFSET {
            return Err(WardenError::InvalidPath(format!(
                "index {index} exceeds maximum {}",
                HARDENED_OFFSET - 1
            )));
        }

        parsed.push(ChildIndex { index, hardened });
    }

    Ok(parsed)
}
