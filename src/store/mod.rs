//! Persistent key-value store
//!
//! Every piece of state the service keeps (platform maps, ETags, logo
//! entries and refresh leases) lives behind [`KeyValueStore`]. Values are
//! JSON documents addressed by a [`StoreKey`]; each write replaces a whole
//! value so no read-modify-write cycle is ever needed.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::errors::{StoreError, StoreResult};

pub mod bulk;
pub mod entity;
pub mod memory;
pub mod seaorm;

pub use bulk::write_many;
pub use memory::InMemoryStore;
pub use seaorm::SeaOrmStore;

/// Structured key made of path segments, rendered as `a/b/c`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(Vec<String>);

impl StoreKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// chain id -> platform id map
    pub fn platform_map() -> Self {
        Self::new(["platform_map", "by_chain_id"])
    }

    /// platform id -> chain id map
    pub fn reverse_map() -> Self {
        Self::new(["platform_map", "by_platform_id"])
    }

    pub fn etag(platform_id: &str) -> Self {
        Self::new(["etag", platform_id])
    }

    /// Logo entry; the address is always stored lowercased
    pub fn logo(chain_id: u64, address: &str) -> Self {
        Self::new([
            "logo".to_string(),
            chain_id.to_string(),
            address.to_lowercase(),
        ])
    }

    pub fn lock(name: &str) -> Self {
        Self::new(["lock", name])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn render(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Durable mapping from structured keys to JSON values
///
/// Implementations must give read-after-write visibility for a single key.
/// No multi-key transaction is required by any caller.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &StoreKey, value: Value) -> StoreResult<()>;

    /// Take `key` for `holder` unless another holder owns an unexpired lease.
    /// Returns whether the lease is now held by `holder`.
    async fn try_acquire_lease(
        &self,
        key: &StoreKey,
        holder: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Drop the lease if `holder` still owns it
    async fn release_lease(&self, key: &StoreKey, holder: &str) -> StoreResult<()>;
}

/// Typed helpers over the raw JSON interface
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    async fn get_json<T>(&self, key: &StoreKey) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::encoding(key.render(), e)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &StoreKey, value: &T) -> StoreResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value).map_err(|e| StoreError::encoding(key.render(), e))?;
        self.set(key, value).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
