// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

use warden_core::crypto::KdfParams;
use warden_core::keyring::{KeyRing, KeyRingStatus};
use warden_core::kv::MemoryKvStore;
use warden_core::WardenError;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                        abandon abandon abandon abandon abandon about";
const PASSWORD: &str = "correct horse battery staple";
const PATH: &str = "m/44'/118'/0'/0/0";

#[tokio::test]
async fn test_full_key_lifecycle_across_processes() {
    let kv = Arc::new(MemoryKvStore::new());

    // First process: create and persist.
    let expected_key = {
        let mut ring = KeyRing::new(kv.clone(), KdfParams::TESTING);
        ring.restore().await.unwrap();
        assert_eq!(ring.status(), KeyRingStatus::Empty);

        ring.create_key(MNEMONIC, PASSWORD).unwrap();
        assert_eq!(ring.status(), KeyRingStatus::Unlocked);
        ring.save().await.unwrap();

        ring.get_key(PATH).unwrap()
    };

    // Fresh process over the same persisted store.
    let mut ring = KeyRing::new(kv, KdfParams::TESTING);
    assert_eq!(ring.status(), KeyRingStatus::NotLoaded);

    // Only restore is legal before loading.
    assert!(matches!(
        ring.sign(PATH, b"msg"),
        Err(WardenError::InvalidState { .. })
    ));

    ring.restore().await.unwrap();
    assert_eq!(ring.status(), KeyRingStatus::Locked);

    ring.unlock(PASSWORD).unwrap();
    assert_eq!(ring.status(), KeyRingStatus::Unlocked);

    // Deterministic derivation: the fresh process sees the same key.
    let account = ring.get_key(PATH).unwrap();
    assert_eq!(account, expected_key);

    // The signature verifies against the public key derived for PATH.
    let message = b"send 10 uwrd to wrd1xyz";
    let signature = ring.sign(PATH, message).unwrap();

    let verifying = VerifyingKey::from_sec1_bytes(&account.public_key).unwrap();
    let digest = Sha256::digest(message);
    let parsed = Signature::from_slice(&signature).unwrap();
    verifying.verify_prehash(digest.as_slice(), &parsed).unwrap();
}

#[tokio::test]
async fn test_wrong_password_then_right_password() {
    let kv = Arc::new(MemoryKvStore::new());
    let mut ring = KeyRing::new(kv, KdfParams::TESTING);
    ring.restore().await.unwrap();
    ring.create_key(MNEMONIC, PASSWORD).unwrap();
    ring.lock().unwrap();

    for wrong in ["", "CORRECT HORSE BATTERY STAPLE", "correct horse"] {
        assert!(matches!(
            ring.unlock(wrong),
            Err(WardenError::AuthenticationFailed)
        ));
        assert_eq!(ring.status(), KeyRingStatus::Locked);
    }

    ring.unlock(PASSWORD).unwrap();
    assert_eq!(ring.status(), KeyRingStatus::Unlocked);
}

#[tokio::test]
async fn test_update_password_survives_restart() {
    let kv = Arc::new(MemoryKvStore::new());

    {
        let mut ring = KeyRing::new(kv.clone(), KdfParams::TESTING);
        ring.restore().await.unwrap();
        ring.create_key(MNEMONIC, PASSWORD).unwrap();
        ring.save().await.unwrap();
        assert!(ring.update_password(PASSWORD, "new password").await.unwrap());
    }

    let mut ring = KeyRing::new(kv, KdfParams::TESTING);
    ring.restore().await.unwrap();
    assert!(matches!(
        ring.unlock(PASSWORD),
        Err(WardenError::AuthenticationFailed)
    ));
    ring.unlock("new password").unwrap();
}
