// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key-value persistence collaborator.
//!
//! The extension host owns the real store (browser local storage); the
//! core only sees this trait. All callers funnel through the single
//! background process, so the store is treated as single-writer.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed read through serde_json.
pub async fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match kv.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Typed write through serde_json.
pub async fn set_json<T: Serialize>(kv: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    kv.set(key, bytes).await
}

/// In-memory store for tests and headless runs.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let kv = MemoryKvStore::new();

        assert!(kv.get("missing").await.unwrap().is_none());

        kv.set("answer", vec![42]).await.unwrap();
        assert_eq!(kv.get("answer").await.unwrap(), Some(vec![42]));

        kv.remove("answer").await.unwrap();
        assert!(kv.get("answer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let kv = MemoryKvStore::new();

        set_json(&kv, "count", &7u64).await.unwrap();
        let read: Option<u64> = get_json(&kv, "count").await.unwrap();
        assert_eq!(read, Some(7));

        let missing: Option<u64> = get_json(&kv, "absent").await.unwrap();
        assert_eq!(missing, None);
    }
}
