use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::indexer::{IndexOutcome, Indexer};
use crate::registry::RegistryResolver;
use crate::store::{KeyValueStore, StoreKey};

/// Lease name guarding the scheduled cycle
pub const REFRESH_LOCK: &str = "refresh";

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub chain_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IndexOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub platforms: usize,
    pub chains: Vec<ChainReport>,
}

impl CycleReport {
    pub fn indexed_logos(&self) -> usize {
        self.chains
            .iter()
            .filter_map(|c| match &c.outcome {
                Some(IndexOutcome::Indexed { logos, .. }) => Some(*logos),
                _ => None,
            })
            .sum()
    }
}

/// One registry refresh followed by indexing of every supported chain
pub struct RefreshJob {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<RegistryResolver>,
    indexer: Arc<Indexer>,
    lock_ttl: Duration,
}

impl RefreshJob {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<RegistryResolver>,
        indexer: Arc<Indexer>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            indexer,
            lock_ttl,
        }
    }

    /// Run a cycle unless another instance holds the refresh lease.
    ///
    /// Returns `Ok(None)` when the cycle was skipped. A registry failure
    /// aborts the cycle; per-chain failures end up in the report.
    pub async fn run_cycle(&self, chain_ids: &[u64]) -> AppResult<Option<CycleReport>> {
        let key = StoreKey::lock(REFRESH_LOCK);
        let holder = Uuid::new_v4().to_string();

        if !self
            .store
            .try_acquire_lease(&key, &holder, self.lock_ttl)
            .await?
        {
            info!("Refresh already running elsewhere, skipping this cycle");
            return Ok(None);
        }
        debug!("Acquired refresh lease as {}", holder);

        let result = self.run_locked(chain_ids).await;

        if let Err(e) = self.store.release_lease(&key, &holder).await {
            warn!("Failed to release refresh lease {}: {}", holder, e);
        }

        result.map(Some)
    }

    async fn run_locked(&self, chain_ids: &[u64]) -> AppResult<CycleReport> {
        let snapshot = self.registry.refresh_registry().await?;

        let runs = chain_ids.iter().map(|&chain_id| {
            let indexer = Arc::clone(&self.indexer);
            async move { (chain_id, indexer.index_platform(chain_id).await) }
        });

        let chains = join_all(runs)
            .await
            .into_iter()
            .map(|(chain_id, result)| match result {
                Ok(outcome) => ChainReport {
                    chain_id,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => {
                    error!("Indexing chain {} failed: {}", chain_id, e);
                    ChainReport {
                        chain_id,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        let report = CycleReport {
            platforms: snapshot.len(),
            chains,
        };
        info!(
            "Refresh cycle finished: {} platforms, {} chains, {} logos written",
            report.platforms,
            report.chains.len(),
            report.indexed_logos()
        );
        Ok(report)
    }
}
