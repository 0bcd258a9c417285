//! Bounded-concurrency bulk writes
//!
//! A fixed pool of workers drains one shared queue. Each worker pops an
//! entry, awaits its write, then pops the next, so at most `concurrency`
//! writes are in flight at any moment. No ordering between entries is
//! guaranteed.

use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{KeyValueStore, StoreKey};
use crate::errors::StoreResult;

/// Write every entry exactly once with at most `concurrency` writes in flight.
///
/// Resolves once all workers drained the queue, or with the first write
/// error (remaining queued entries are then not written).
pub async fn write_many<S>(
    store: &S,
    entries: Vec<(StoreKey, Value)>,
    concurrency: usize,
) -> StoreResult<usize>
where
    S: KeyValueStore + ?Sized,
{
    let total = entries.len();
    if total == 0 {
        return Ok(0);
    }

    let workers = concurrency.clamp(1, total);
    let queue = Arc::new(Mutex::new(entries));

    let pool = (0..workers).map(|_| {
        let queue = Arc::clone(&queue);
        async move {
            loop {
                // guard dropped before the write is awaited
                let next = queue.lock().await.pop();
                let Some((key, value)) = next else {
                    return StoreResult::Ok(());
                };
                store.set(&key, value).await?;
            }
        }
    });

    try_join_all(pool).await?;
    debug!("Bulk wrote {} entries with {} workers", total, workers);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::config::defaults::DEFAULT_WRITE_CONCURRENCY;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn entries(n: usize) -> Vec<(StoreKey, Value)> {
        (0..n)
            .map(|i| {
                (
                    StoreKey::logo(1, &format!("0x{i:040x}")),
                    json!(format!("https://logos.example/{i}.png")),
                )
            })
            .collect()
    }

    /// Tracks how many writes overlap and can fail on a chosen key
    #[derive(Default)]
    struct ProbeStore {
        inner: InMemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail_on: Option<StoreKey>,
    }

    #[async_trait]
    impl KeyValueStore for ProbeStore {
        async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &StoreKey, value: Value) -> StoreResult<()> {
            if self.fail_on.as_ref() == Some(key) {
                return Err(StoreError::encoding(key.render(), "refused"));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn try_acquire_lease(
            &self,
            key: &StoreKey,
            holder: &str,
            ttl: Duration,
        ) -> StoreResult<bool> {
            self.inner.try_acquire_lease(key, holder, ttl).await
        }

        async fn release_lease(&self, key: &StoreKey, holder: &str) -> StoreResult<()> {
            self.inner.release_lease(key, holder).await
        }
    }

    #[tokio::test]
    async fn writes_every_entry_exactly_once() {
        let store = InMemoryStore::new();
        let written = write_many(&store, entries(300), DEFAULT_WRITE_CONCURRENCY)
            .await
            .unwrap();

        assert_eq!(written, 300);
        assert_eq!(store.write_count(), 300);
        assert_eq!(store.len().await, 300);
        assert_eq!(
            store
                .get(&StoreKey::logo(1, &format!("0x{:040x}", 299)))
                .await
                .unwrap(),
            Some(json!("https://logos.example/299.png"))
        );
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let store = ProbeStore::default();
        write_many(&store, entries(120), 25).await.unwrap();

        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak <= 25, "peak concurrency {peak}");
        assert!(peak > 1, "writes were serialized");
        assert_eq!(store.inner.write_count(), 120);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = InMemoryStore::new();
        assert_eq!(write_many(&store, Vec::new(), 25).await.unwrap(), 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn first_write_error_is_propagated() {
        let batch = entries(50);
        let store = ProbeStore {
            fail_on: Some(batch[10].0.clone()),
            ..Default::default()
        };
        let result = write_many(&store, batch, 5).await;
        assert!(matches!(result, Err(StoreError::Encoding { .. })));
    }
}
