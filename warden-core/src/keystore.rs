// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The persisted encrypted key structure: the mnemonic sealed under a
//! password-derived key, together with every parameter needed to open
//! it again. Replaced wholesale on create/update-password, never
//! mutated in place.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, EncryptedData, KdfParams, NONCE_SIZE, SALT_SIZE};
use crate::error::{Result, WardenError};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyStore {
    pub version: u32,
    pub kdf: KdfParams,
    #[serde(with = "hex_array")]
    pub salt: [u8; SALT_SIZE],
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedKeyStore {
    /// Encrypt `mnemonic` under `password` with a fresh salt and nonce.
    pub fn seal(mnemonic: &str, password: &str, params: KdfParams) -> Result<Self> {
        let salt: [u8; SALT_SIZE] = crypto::random_bytes();
        let key = crypto::derive_key(password.as_bytes(), &salt, params)?;
        let encrypted = crypto::encrypt(mnemonic.as_bytes(), &key)?;

        Ok(Self {
            version: FORMAT_VERSION,
            kdf: params,
            salt,
            nonce: encrypted.nonce,
            ciphertext: encrypted.ciphertext,
        })
    }

    /// Decrypt the mnemonic. Wrong password surfaces as
    /// [`WardenError::AuthenticationFailed`].
    pub fn open(&self, password: &str) -> Result<SecretString> {
        if self.version > FORMAT_VERSION {
            return Err(WardenError::Storage(format!(
                "unsupported key store version {}",
                self.version
            )));
        }

        let key = crypto::derive_key(password.as_bytes(), &self.salt, self.kdf)?;
        let encrypted = EncryptedData {
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce,
        };
        let plaintext = crypto::decrypt(&encrypted, &key)?;

        let phrase = std::str::from_utf8(&plaintext)
            .map_err(|_| WardenError::Storage("key store plaintext is not utf-8".into()))?;
        Ok(SecretString::from(phrase.to_string()))
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("unexpected field length"))
    }
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
