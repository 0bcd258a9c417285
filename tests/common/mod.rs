//! Local stand-ins for the token-list provider, the IPFS gateway and the
//! image hosts, plus helpers wiring the application against them.

#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use token_logo_proxy::config::Config;
use token_logo_proxy::fetch::ResilientHttpClient;
use token_logo_proxy::store::KeyValueStore;
use token_logo_proxy::web::{AppState, create_router};

pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
pub const WMATIC: &str = "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270";
pub const ETHEREUM_ETAG: &str = "\"ethereum-v1\"";

/// What the fake provider has seen
#[derive(Default)]
pub struct UpstreamLog {
    /// `(platform id, If-None-Match)` per token-list request
    pub token_list_requests: Vec<(String, Option<String>)>,
    pub image_requests: Vec<String>,
}

#[derive(Clone, Default)]
pub struct Upstream {
    pub base_url: String,
    pub log: Arc<Mutex<UpstreamLog>>,
}

impl Upstream {
    pub fn token_list_requests(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().unwrap().token_list_requests.clone()
    }

    pub fn image_requests(&self) -> Vec<String> {
        self.log.lock().unwrap().image_requests.clone()
    }
}

async fn asset_platforms() -> Json<Value> {
    Json(json!([
        { "id": "ethereum", "chain_identifier": 1, "name": "Ethereum" },
        { "id": "polygon-pos", "chain_identifier": 137, "name": "Polygon POS" },
        { "id": "unstoppable", "chain_identifier": 10, "name": "Always failing" },
        { "id": "bitcoin-cash", "chain_identifier": null, "name": "No chain id" }
    ]))
}

async fn token_list(
    State(log): State<Arc<Mutex<UpstreamLog>>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Response {
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    log.lock()
        .unwrap()
        .token_list_requests
        .push((platform.clone(), if_none_match.clone()));

    match platform.as_str() {
        "ethereum" => {
            if if_none_match.as_deref() == Some(ETHEREUM_ETAG) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            (
                [(header::ETAG, ETHEREUM_ETAG)],
                Json(json!({
                    "name": "CoinGecko Ethereum",
                    "tokens": [
                        {
                            "chainId": 1,
                            "address": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                            "logoURI": "ipfs://QmUsdc/logo.png"
                        },
                        {
                            "chainId": "137",
                            "address": WMATIC,
                            "logoURI": "https://images.example/wmatic.png"
                        },
                        { "chainId": 1, "address": "0x1111111111111111111111111111111111111111" },
                        { "chainId": 1, "logoURI": "https://images.example/orphan.png" }
                    ]
                })),
            )
                .into_response()
        }
        // no ETag on this one
        "polygon-pos" => Json(json!({
            "tokens": [
                {
                    "chainId": 137,
                    "address": "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
                    "logoURI": "https://images.example/usdc-polygon.png"
                }
            ]
        }))
        .into_response(),
        "unstoppable" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn image(State(log): State<Arc<Mutex<UpstreamLog>>>, Path(path): Path<String>) -> Response {
    log.lock().unwrap().image_requests.push(path.clone());

    if path.starts_with("missing") {
        return (StatusCode::NOT_FOUND, "gone").into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://only.example"),
        ],
        format!("IMAGE:{path}"),
    )
        .into_response()
}

/// Start the fake provider on an ephemeral port
pub async fn spawn_upstream() -> Upstream {
    let log = Arc::new(Mutex::new(UpstreamLog::default()));

    let app = Router::new()
        .route("/api/v3/asset_platforms", get(asset_platforms))
        .route("/{platform}/all.json", get(token_list))
        .route("/images/{*path}", get(image))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream {
        base_url: format!("http://{addr}"),
        log,
    }
}

/// Configuration pointing every upstream at the fake provider
pub fn test_config(upstream: &Upstream) -> Config {
    let base = &upstream.base_url;
    let mut config = Config::default();

    config.upstream.asset_platforms_url = format!("{base}/api/v3/asset_platforms");
    config.upstream.token_list_base_url = base.clone();

    config.indexer.supported_chain_ids = vec![1, 137, 10, 56];
    config.indexer.fetch_attempts = 2;
    config.indexer.base_delay = Duration::from_millis(10);

    config.logos.ipfs_gateway = format!("{base}/images/ipfs/");
    config.logos.identicon_base_url = format!("{base}/images/avatar/");
    config.logos.default_native_logo = format!("{base}/images/native/eth.png");
    config.logos.native_logos = BTreeMap::from([(
        "137".to_string(),
        format!("{base}/images/native/pol.png"),
    )]);
    config
}

pub fn test_client() -> ResilientHttpClient {
    ResilientHttpClient::from_client(reqwest::Client::builder().no_proxy().build().unwrap())
}

pub fn test_state(config: Config, store: Arc<dyn KeyValueStore>) -> AppState {
    AppState::new(config, store, test_client())
}

pub fn test_router(config: Config, store: Arc<dyn KeyValueStore>) -> Router {
    create_router(test_state(config, store))
}
