// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use warden_background::hardware::NullPopupOpener;
use warden_background::msgs::MessageSender;
use warden_background::rate_limit::RateLimitConfig;
use warden_background::{Background, BackgroundConfig};
use warden_core::crypto::KdfParams;
use warden_core::kv::MemoryKvStore;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                        abandon abandon abandon abandon abandon about";
const PASSWORD: &str = "correct horse battery staple";

fn test_config() -> BackgroundConfig {
    BackgroundConfig {
        kdf_params: KdfParams::TESTING,
        ..BackgroundConfig::default()
    }
}

fn background(config: BackgroundConfig) -> Arc<Background> {
    Arc::new(Background::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(NullPopupOpener),
        None,
        None,
        config,
    ))
}

async fn send_internal(bg: &Background, route: &str, ty: &str, payload: Value) -> Value {
    let raw = json!({ "route": route, "type": ty, "payload": payload }).to_string();
    let response = bg.handle(&raw, &MessageSender::internal()).await;
    assert!(
        response.is_ok(),
        "{route}/{ty} failed: {:?}",
        response.error
    );
    response.payload.unwrap()
}

async fn unlocked_background() -> Arc<Background> {
    let bg = background(test_config());
    bg.keeper().restore().await.unwrap();
    let payload = send_internal(
        &bg,
        "keyring",
        "create-key",
        json!({ "mnemonic": MNEMONIC, "password": PASSWORD }),
    )
    .await;
    assert_eq!(payload["status"], "unlocked");
    bg
}

#[tokio::test]
async fn test_create_key_needs_restore_first() {
    let bg = background(test_config());
    let raw = json!({
        "route": "keyring",
        "type": "create-key",
        "payload": { "mnemonic": MNEMONIC, "password": PASSWORD }
    })
    .to_string();

    // The ring is not loaded yet; creating a key is an invalid-state
    // error until something triggers a restore.
    let response = bg.handle(&raw, &MessageSender::internal()).await;
    assert_eq!(response.error.unwrap().kind, "invalid-state");

    // enable() restores as a side effect and reports the missing key.
    let raw = json!({ "route": "keyring", "type": "enable" }).to_string();
    let response = bg.handle(&raw, &MessageSender::internal()).await;
    assert_eq!(response.error.unwrap().kind, "key-store-missing");

    let response = bg
        .handle(
            &json!({
                "route": "keyring",
                "type": "create-key",
                "payload": { "mnemonic": MNEMONIC, "password": PASSWORD }
            })
            .to_string(),
            &MessageSender::internal(),
        )
        .await;
    assert!(response.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_external_sign_flow_end_to_end() {
    let bg = unlocked_background().await;

    let key_payload = send_internal(&bg, "keyring", "get-key", json!({})).await;
    let address = key_payload["address"].as_str().unwrap().to_string();
    let pub_key = hex::decode(key_payload["pubKeyHex"].as_str().unwrap()).unwrap();

    let message = b"send 10 uwrd to wrd1xyz";
    let sign_request = json!({
        "route": "keyring",
        "type": "request-sign",
        "payload": {
            "id": "ab12cd34",
            "bech32Address": address,
            "messageHex": hex::encode(message),
            "openPopup": true
        },
        "origin": "https://app.example"
    })
    .to_string();

    let signing = tokio::spawn({
        let bg = bg.clone();
        async move {
            bg.handle(&sign_request, &MessageSender::external("https://app.example/page"))
                .await
        }
    });
    tokio::task::yield_now().await;

    // The consent UI reads back what is being signed.
    let pending = send_internal(
        &bg,
        "keyring",
        "get-requested-message",
        json!({ "id": "ab12cd34" }),
    )
    .await;
    assert_eq!(pending["messageHex"].as_str().unwrap(), hex::encode(message));

    send_internal(&bg, "keyring", "approve-sign", json!({ "id": "ab12cd34" })).await;

    let response = signing.await.unwrap();
    assert!(response.is_ok());
    let signature =
        hex::decode(response.payload.unwrap()["signatureHex"].as_str().unwrap()).unwrap();

    let verifying = VerifyingKey::from_sec1_bytes(&pub_key).unwrap();
    let digest = Sha256::digest(message);
    let parsed = Signature::from_slice(&signature).unwrap();
    verifying.verify_prehash(digest.as_slice(), &parsed).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_external_sign_rejection() {
    let bg = unlocked_background().await;
    let key_payload = send_internal(&bg, "keyring", "get-key", json!({})).await;
    let address = key_payload["address"].as_str().unwrap().to_string();

    let sign_request = json!({
        "route": "keyring",
        "type": "request-sign",
        "payload": {
            "id": "ab12cd34",
            "bech32Address": address,
            "messageHex": "deadbeef"
        },
        "origin": "https://app.example"
    })
    .to_string();

    let signing = tokio::spawn({
        let bg = bg.clone();
        async move {
            bg.handle(&sign_request, &MessageSender::external("https://app.example"))
                .await
        }
    });
    tokio::task::yield_now().await;

    send_internal(&bg, "keyring", "reject-sign", json!({ "id": "ab12cd34" })).await;

    let response = signing.await.unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.kind, "user-rejected");
    // External callers see sanitized text only.
    assert_eq!(error.message, "request rejected");
}

#[tokio::test]
async fn test_origin_check() {
    let bg = unlocked_background().await;

    let enable = |origin: Option<&str>| {
        let mut envelope = json!({ "route": "keyring", "type": "enable" });
        if let Some(origin) = origin {
            envelope["origin"] = json!(origin);
        }
        envelope.to_string()
    };

    // Declared origin differs from the sender's URL origin.
    let response = bg
        .handle(
            &enable(Some("https://a.example")),
            &MessageSender::external("https://b.example/page"),
        )
        .await;
    assert_eq!(response.error.unwrap().kind, "origin-not-allowed");

    // Identical origins are accepted.
    let response = bg
        .handle(
            &enable(Some("https://a.example")),
            &MessageSender::external("https://a.example/deep/path?q=1"),
        )
        .await;
    assert!(response.is_ok());

    // Missing declared origin is rejected for external senders.
    let response = bg
        .handle(&enable(None), &MessageSender::external("https://a.example"))
        .await;
    assert_eq!(response.error.unwrap().kind, "origin-not-allowed");

    // Internal senders bypass the check entirely.
    let response = bg.handle(&enable(None), &MessageSender::internal()).await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn test_internal_only_messages_blocked_externally() {
    let bg = unlocked_background().await;

    for (ty, payload) in [
        ("unlock", json!({ "password": PASSWORD })),
        ("lock", Value::Null),
        ("approve-sign", json!({ "id": "ab12cd34" })),
        ("clear", Value::Null),
        ("get-key", json!({ "path": "m/44'/118'/0'/0/1" })),
    ] {
        let raw = json!({
            "route": "keyring",
            "type": ty,
            "payload": payload,
            "origin": "https://a.example"
        })
        .to_string();

        let response = bg
            .handle(&raw, &MessageSender::external("https://a.example"))
            .await;
        assert_eq!(
            response.error.unwrap().kind,
            "origin-not-allowed",
            "{ty} should be internal-only"
        );
    }
}

#[tokio::test]
async fn test_unknown_type_and_route() {
    let bg = unlocked_background().await;

    let raw = json!({ "route": "keyring", "type": "export-mnemonic" }).to_string();
    let response = bg.handle(&raw, &MessageSender::internal()).await;
    assert_eq!(response.error.unwrap().kind, "unknown-message-type");

    let raw = json!({ "route": "ledger", "type": "enable" }).to_string();
    let response = bg.handle(&raw, &MessageSender::internal()).await;
    assert_eq!(response.error.unwrap().kind, "unknown-route");
}

#[tokio::test(start_paused = true)]
async fn test_tx_builder_config_flow() {
    let bg = unlocked_background().await;

    let request = json!({
        "route": "tx",
        "type": "request-tx-builder-config",
        "payload": {
            "id": "0011beef",
            "config": { "gas": 200000, "memo": "", "fee": "" }
        },
        "origin": "https://app.example"
    })
    .to_string();

    let requesting = tokio::spawn({
        let bg = bg.clone();
        async move {
            bg.handle(&request, &MessageSender::external("https://app.example"))
                .await
        }
    });
    tokio::task::yield_now().await;

    let pending = send_internal(
        &bg,
        "tx",
        "get-requested-tx-config",
        json!({ "id": "0011beef" }),
    )
    .await;
    assert_eq!(pending["config"]["gas"], 200000);

    send_internal(
        &bg,
        "tx",
        "approve-tx-builder-config",
        json!({
            "id": "0011beef",
            "config": { "gas": 250000, "memo": "fee bumped", "fee": "1000uwrd" }
        }),
    )
    .await;

    let response = requesting.await.unwrap();
    let config = response.payload.unwrap()["config"].clone();
    assert_eq!(config["gas"], 250000);
    assert_eq!(config["memo"], "fee bumped");
}

#[tokio::test]
async fn test_rate_limit_applies_to_external_only() {
    let bg = background(BackgroundConfig {
        kdf_params: KdfParams::TESTING,
        rate_limit: Some(RateLimitConfig::new(2, 100)),
        ..BackgroundConfig::default()
    });
    bg.keeper().restore().await.unwrap();
    send_internal(
        &bg,
        "keyring",
        "create-key",
        json!({ "mnemonic": MNEMONIC, "password": PASSWORD }),
    )
    .await;

    let enable = json!({
        "route": "keyring",
        "type": "enable",
        "origin": "https://a.example"
    })
    .to_string();
    let sender = MessageSender::external("https://a.example");

    assert!(bg.handle(&enable, &sender).await.is_ok());
    assert!(bg.handle(&enable, &sender).await.is_ok());
    let response = bg.handle(&enable, &sender).await;
    assert_eq!(response.error.unwrap().kind, "rate-limited");

    // Internal traffic is never limited.
    for _ in 0..5 {
        send_internal(&bg, "keyring", "get-status", Value::Null).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_auto_lock_arms_after_unlock_via_messages() {
    let bg = Arc::new(Background::new(
        Arc::new(MemoryKvStore::new()),
        Arc::new(NullPopupOpener),
        None,
        None,
        BackgroundConfig {
            kdf_params: KdfParams::TESTING,
            poll_interval: Duration::from_millis(5000),
            lock_timeout: Duration::from_millis(10_000),
            ..BackgroundConfig::default()
        },
    ));

    bg.keeper().restore().await.unwrap();
    send_internal(
        &bg,
        "keyring",
        "create-key",
        json!({ "mnemonic": MNEMONIC, "password": PASSWORD }),
    )
    .await;

    // Two poll intervals of inactivity: supervisor locks the ring.
    tokio::time::sleep(Duration::from_millis(10_200)).await;
    let status = send_internal(&bg, "keyring", "get-status", Value::Null).await;
    assert_eq!(status["status"], "locked");

    // Unlocking through the router re-arms the one-shot supervisor.
    let payload = send_internal(
        &bg,
        "keyring",
        "unlock",
        json!({ "password": PASSWORD }),
    )
    .await;
    assert_eq!(payload["status"], "unlocked");

    tokio::time::sleep(Duration::from_millis(10_200)).await;
    let status = send_internal(&bg, "keyring", "get-status", Value::Null).await;
    assert_eq!(status["status"], "locked");
}
