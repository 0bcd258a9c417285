//! Per-platform token-list indexing
//!
//! One run for one chain: resolve the upstream platform, conditionally
//! re-download its token list, and republish every usable logo. Upstream
//! trouble is contained and reported as an [`IndexOutcome`]; only store
//! failures surface as errors.
//!
//! The platform ETag is written after all logo writes completed, so an
//! interrupted run makes the next one fetch again instead of trusting a
//! half-applied list.

use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{IndexerConfig, UpstreamConfig};
use crate::errors::AppResult;
use crate::fetch::{ResilientHttpClient, RetryPolicy};
use crate::registry::platform_for_chain;
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreKey, write_many};

/// Result of indexing one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// No platform is registered for the chain
    UnknownChain { chain_id: u64 },
    /// Upstream answered 304; the stored entries are current
    NotModified { platform_id: String },
    /// Upstream could not be fetched or decoded; nothing was written
    Failed { platform_id: String, reason: String },
    Indexed {
        platform_id: String,
        logos: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        etag: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct TokenList {
    #[serde(default)]
    tokens: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    #[serde(rename = "chainId", default)]
    chain_id: Option<Value>,
    #[serde(default)]
    address: Option<String>,
    #[serde(rename = "logoURI", default)]
    logo_uri: Option<String>,
}

/// Chain id a token is keyed under: its own numeric `chainId`, else a
/// decimal-string `chainId`, else the chain being indexed.
pub fn effective_chain_id(token_chain_id: Option<&Value>, fallback: u64) -> u64 {
    match token_chain_id {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(fallback),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().unwrap_or(fallback)
        }
        _ => fallback,
    }
}

/// Turn raw token records into logo writes.
///
/// Records that do not decode, or lack an address or logo, are dropped. When
/// two records land on the same key the later one wins.
pub fn collect_logo_entries(tokens: Vec<Value>, chain_id: u64) -> Vec<(StoreKey, Value)> {
    let mut entries: HashMap<StoreKey, Value> = HashMap::with_capacity(tokens.len());

    for raw in tokens {
        let Ok(token) = serde_json::from_value::<TokenEntry>(raw) else {
            continue;
        };
        let (Some(address), Some(logo)) = (token.address, token.logo_uri) else {
            continue;
        };
        if address.is_empty() || logo.is_empty() {
            continue;
        }

        let chain = effective_chain_id(token.chain_id.as_ref(), chain_id);
        entries.insert(StoreKey::logo(chain, &address), Value::String(logo));
    }

    entries.into_iter().collect()
}

pub struct Indexer {
    store: Arc<dyn KeyValueStore>,
    client: ResilientHttpClient,
    upstream: UpstreamConfig,
    policy: RetryPolicy,
    write_concurrency: usize,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        client: ResilientHttpClient,
        upstream: UpstreamConfig,
        indexer: &IndexerConfig,
    ) -> Self {
        Self {
            store,
            client,
            upstream,
            policy: RetryPolicy::from_indexer_config(indexer),
            write_concurrency: indexer.write_concurrency.max(1),
        }
    }

    pub fn token_list_url(&self, platform_id: &str) -> String {
        format!(
            "{}/{}/all.json",
            self.upstream.token_list_base_url.trim_end_matches('/'),
            platform_id
        )
    }

    /// Re-index the token list of the platform registered for `chain_id`
    pub async fn index_platform(&self, chain_id: u64) -> AppResult<IndexOutcome> {
        let Some(platform_id) = platform_for_chain(self.store.as_ref(), chain_id).await? else {
            warn!("Skip {}: platformId not found", chain_id);
            return Ok(IndexOutcome::UnknownChain { chain_id });
        };

        let previous_etag: Option<String> =
            self.store.get_json(&StoreKey::etag(&platform_id)).await?;

        let mut headers = HeaderMap::new();
        if let Some(etag) = previous_etag.as_deref() {
            match HeaderValue::from_str(etag) {
                Ok(value) => {
                    headers.insert(IF_NONE_MATCH, value);
                }
                Err(_) => warn!(
                    "Stored ETag for {} is not a valid header value, fetching unconditionally",
                    platform_id
                ),
            }
        }

        let url = self.token_list_url(&platform_id);
        let response = match self.client.fetch_with_retry(&url, headers, &self.policy).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Skip {}: network error after retries: {}", platform_id, e);
                return Ok(IndexOutcome::Failed {
                    platform_id,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!("{} token list not modified", platform_id);
            return Ok(IndexOutcome::NotModified { platform_id });
        }
        if !status.is_success() {
            warn!("Skip {}: HTTP {} after retries", platform_id, status.as_u16());
            return Ok(IndexOutcome::Failed {
                platform_id,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let list: TokenList = match response.json().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Skip {}: unreadable token list: {}", platform_id, e);
                return Ok(IndexOutcome::Failed {
                    platform_id,
                    reason: format!("invalid token list: {e}"),
                });
            }
        };

        let entries = collect_logo_entries(list.tokens.unwrap_or_default(), chain_id);
        let logos = write_many(self.store.as_ref(), entries, self.write_concurrency).await?;

        if let Some(etag) = etag.as_ref() {
            self.store
                .set_json(&StoreKey::etag(&platform_id), etag)
                .await?;
        }

        info!("Indexed {} with {} logos", platform_id, logos);
        Ok(IndexOutcome::Indexed {
            platform_id,
            logos,
            etag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Some(json!(137)), 1, 137)]
    #[case(Some(json!("137")), 1, 137)]
    #[case(Some(json!("0x89")), 1, 1)]
    #[case(Some(json!("")), 56, 56)]
    #[case(Some(json!(-3)), 10, 10)]
    #[case(Some(json!(null)), 10, 10)]
    #[case(None, 8453, 8453)]
    fn derives_effective_chain_id(
        #[case] raw: Option<Value>,
        #[case] fallback: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(effective_chain_id(raw.as_ref(), fallback), expected);
    }

    #[test]
    fn string_chain_id_overrides_the_indexed_chain() {
        let entries = collect_logo_entries(
            vec![json!({
                "chainId": "137",
                "address": "0xABCDEF0000000000000000000000000000000001",
                "logoURI": "https://logos.example/a.png"
            })],
            1,
        );
        assert_eq!(
            entries,
            vec![(
                StoreKey::logo(137, "0xabcdef0000000000000000000000000000000001"),
                json!("https://logos.example/a.png")
            )]
        );
    }

    #[test]
    fn incomplete_and_malformed_records_are_dropped() {
        let entries = collect_logo_entries(
            vec![
                json!({ "address": "0x0000000000000000000000000000000000000001" }),
                json!({ "logoURI": "https://logos.example/b.png" }),
                json!({ "address": "", "logoURI": "https://logos.example/c.png" }),
                json!({ "address": 42, "logoURI": "https://logos.example/d.png" }),
                json!("not an object"),
                json!({
                    "address": "0x0000000000000000000000000000000000000002",
                    "logoURI": "ipfs://cid/e.png"
                }),
            ],
            10,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].0,
            StoreKey::logo(10, "0x0000000000000000000000000000000000000002")
        );
    }

    #[test]
    fn duplicate_keys_keep_the_last_record() {
        let entries = collect_logo_entries(
            vec![
                json!({ "address": "0xAA00000000000000000000000000000000000000", "logoURI": "first" }),
                json!({ "address": "0xaa00000000000000000000000000000000000000", "logoURI": "second" }),
            ],
            1,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, json!("second"));
    }
}
