//! Platform registry: chain id <-> upstream platform id
//!
//! Both maps are rebuilt wholesale from one listing fetch and only persisted
//! once the fetch and decode succeeded, so a failed refresh never leaves a
//! partially updated registry behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::UpstreamConfig;
use crate::errors::AppResult;
use crate::fetch::{ResilientHttpClient, RetryPolicy};
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreKey};

/// One entry of the upstream asset-platform listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetPlatform {
    pub id: String,
    #[serde(default)]
    pub chain_identifier: Option<u64>,
}

/// chain id (as text) -> platform id
pub type PlatformMap = BTreeMap<String, String>;

/// platform id -> chain id
pub type ReverseMap = BTreeMap<String, u64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub by_chain_id: PlatformMap,
    pub by_platform_id: ReverseMap,
}

impl RegistrySnapshot {
    /// Build both maps from a listing; platforms without a chain id are skipped
    pub fn from_platforms(platforms: &[AssetPlatform]) -> Self {
        let mut snapshot = Self::default();
        for platform in platforms {
            if let Some(chain_id) = platform.chain_identifier {
                snapshot
                    .by_chain_id
                    .insert(chain_id.to_string(), platform.id.clone());
                snapshot
                    .by_platform_id
                    .insert(platform.id.clone(), chain_id);
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.by_chain_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chain_id.is_empty()
    }
}

pub struct RegistryResolver {
    store: Arc<dyn KeyValueStore>,
    client: ResilientHttpClient,
    upstream: UpstreamConfig,
    policy: RetryPolicy,
}

impl RegistryResolver {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        client: ResilientHttpClient,
        upstream: UpstreamConfig,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            client,
            upstream,
            policy,
        }
    }

    /// Fetch the platform listing and replace both registry maps.
    ///
    /// Fetch or decode failures are returned and leave the stored maps untouched.
    pub async fn refresh_registry(&self) -> AppResult<RegistrySnapshot> {
        let url = &self.upstream.asset_platforms_url;
        debug!("Refreshing platform registry from {}", url);

        let platforms: Vec<AssetPlatform> = self.client.fetch_json(url, &self.policy).await?;
        let snapshot = RegistrySnapshot::from_platforms(&platforms);

        self.store
            .set_json(&StoreKey::platform_map(), &snapshot.by_chain_id)
            .await?;
        self.store
            .set_json(&StoreKey::reverse_map(), &snapshot.by_platform_id)
            .await?;

        info!(
            "Platform registry refreshed: {} platforms, {} with a chain id",
            platforms.len(),
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// Platform id currently mapped to `chain_id`, if any
    pub async fn platform_for_chain(&self, chain_id: u64) -> AppResult<Option<String>> {
        platform_for_chain(self.store.as_ref(), chain_id).await
    }
}

/// Look up `chain_id` in the stored platform map
pub async fn platform_for_chain(
    store: &dyn KeyValueStore,
    chain_id: u64,
) -> AppResult<Option<String>> {
    let map: Option<PlatformMap> = store.get_json(&StoreKey::platform_map()).await?;
    Ok(map.and_then(|mut m| m.remove(&chain_id.to_string())))
}
