//! Process-local store for tests and ephemeral runs

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{KeyValueStore, StoreKey};
use crate::errors::StoreResult;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Epoch millis; only set for leases
    expires_at: Option<i64>,
}

/// HashMap-backed store; clones share the same map
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<StoreKey, Entry>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>> {
        Ok(self.entries.read().await.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &StoreKey, value: Value) -> StoreResult<()> {
        self.entries.write().await.insert(
            key.clone(),
            Entry {
                value,
                expires_at: None,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        key: &StoreKey,
        holder: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(key) {
            let owned_by_us = existing.value.as_str() == Some(holder);
            let expired = existing.expires_at.is_some_and(|at| at < now);
            if !owned_by_us && !expired {
                return Ok(false);
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                value: Value::String(holder.to_string()),
                expires_at: Some(now + ttl.as_millis() as i64),
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, key: &StoreKey, holder: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|e| e.expires_at.is_some() && e.value.as_str() == Some(holder))
        {
            entries.remove(key);
        }
        Ok(())
    }
}
