//! Request-time logo resolution and image proxying
//!
//! Resolution never consults the token-list provider. A request is answered
//! from the cached entry, the chain's native-token logo for the zero address,
//! or a deterministic identicon, in that order.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::config::LogoConfig;
use crate::errors::{AppError, AppResult};
use crate::fetch::ResilientHttpClient;
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreKey};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// 400 body for a bad path. `chainId` must be a plain decimal `u64`, so
/// forms like `0x89`, `1e3` or `-1` are rejected here too.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid chainId or address";

/// CORS headers forced onto every response, replacing upstream values
pub const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

static ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-f]{40}$").unwrap());

/// Headers that describe the upstream connection rather than the image
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
];

/// A validated `(chainId, address)` pair, address lowercased
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoRequest {
    pub chain_id: u64,
    pub address: String,
}

/// Where the served image URL came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoSource {
    Cached(String),
    Native(String),
    Identicon(String),
}

impl LogoSource {
    pub fn url(&self) -> &str {
        match self {
            LogoSource::Cached(url) | LogoSource::Native(url) | LogoSource::Identicon(url) => url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogoSource::Cached(_) => "cached",
            LogoSource::Native(_) => "native",
            LogoSource::Identicon(_) => "identicon",
        }
    }
}

/// Check the raw path segments before anything touches the store
pub fn validate_request(chain_id: &str, address: &str) -> AppResult<LogoRequest> {
    let chain_id = chain_id
        .parse::<u64>()
        .map_err(|_| AppError::validation(INVALID_REQUEST_MESSAGE))?;

    let address = address.to_ascii_lowercase();
    if !ADDRESS_PATTERN.is_match(&address) {
        return Err(AppError::validation(INVALID_REQUEST_MESSAGE));
    }

    Ok(LogoRequest { chain_id, address })
}

/// Rewrite `ipfs://<cid>/<path>` onto an HTTP gateway; other URLs pass through
pub fn ipfs_to_http(url: &str, gateway: &str) -> String {
    match url.strip_prefix("ipfs://") {
        Some(rest) => format!("{}/{}", gateway.trim_end_matches('/'), rest),
        None => url.to_string(),
    }
}

/// Placeholder image URL, a pure function of the chain and address
pub fn identicon_url(base_url: &str, chain_id: u64, address: &str) -> String {
    format!(
        "{}/{}:{}",
        base_url.trim_end_matches('/'),
        chain_id,
        address.to_ascii_lowercase()
    )
}

/// Apply the fallback order to an optional cache hit
pub fn choose_logo(request: &LogoRequest, cached: Option<String>, logos: &LogoConfig) -> LogoSource {
    if let Some(url) = cached.filter(|url| !url.is_empty()) {
        return LogoSource::Cached(url);
    }
    if request.address == ZERO_ADDRESS {
        return LogoSource::Native(logos.native_logo(request.chain_id).to_string());
    }
    LogoSource::Identicon(identicon_url(
        &logos.identicon_base_url,
        request.chain_id,
        &request.address,
    ))
}

/// Replace any upstream CORS headers with the fixed set
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

/// Plain-text response carrying the CORS headers
pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response {
    let mut response = (status, message.into()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    apply_cors_headers(response.headers_mut());
    response
}

#[derive(Clone)]
pub struct Responder {
    store: Arc<dyn KeyValueStore>,
    client: ResilientHttpClient,
    logos: LogoConfig,
}

impl Responder {
    pub fn new(store: Arc<dyn KeyValueStore>, client: ResilientHttpClient, logos: LogoConfig) -> Self {
        Self {
            store,
            client,
            logos,
        }
    }

    /// Pick the logo for an already validated request
    pub async fn lookup(&self, request: &LogoRequest) -> AppResult<LogoSource> {
        let cached: Option<String> = self
            .store
            .get_json(&StoreKey::logo(request.chain_id, &request.address))
            .await?;
        Ok(choose_logo(request, cached, &self.logos))
    }

    /// Validate, pick a logo and stream it back
    pub async fn resolve(&self, chain_id: &str, address: &str) -> AppResult<Response> {
        let request = validate_request(chain_id, address)?;
        let source = self.lookup(&request).await?;
        let url = ipfs_to_http(source.url(), &self.logos.ipfs_gateway);

        debug!(
            chain_id = request.chain_id,
            address = %request.address,
            source = source.kind(),
            url = %url,
            "Resolved token logo"
        );

        self.stream_through(&url).await
    }

    /// Fetch `url` once and pass the body through with normalized headers.
    ///
    /// A non-success upstream status becomes a 502 naming that status.
    pub async fn stream_through(&self, url: &str) -> AppResult<Response> {
        let upstream = self.client.get(url).await?;
        let status = upstream.status();

        if !status.is_success() {
            warn!("Image upstream {} returned {}", url, status.as_u16());
            return Ok(text_response(
                StatusCode::BAD_GATEWAY,
                format!("Upstream {}", status.as_u16()),
            ));
        }

        let mut headers = upstream.headers().clone();
        for name in HOP_BY_HOP {
            headers.remove(name);
        }
        match HeaderValue::from_str(&self.logos.cache_control) {
            Ok(value) => {
                headers.insert(header::CACHE_CONTROL, value);
            }
            Err(_) => {
                return Err(AppError::configuration(format!(
                    "cache_control is not a valid header value: {}",
                    self.logos.cache_control
                )));
            }
        }
        apply_cors_headers(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ADDR: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    #[rstest]
    #[case("1", "0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48", true)]
    #[case("137", ADDR, true)]
    #[case("abc", ADDR, false)]
    #[case("-1", ADDR, false)]
    #[case("0x89", ADDR, false)]
    #[case("1e3", ADDR, false)]
    #[case("", ADDR, false)]
    #[case("1", "0x123", false)]
    #[case("1", "a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", false)]
    #[case("1", "0xg0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", false)]
    #[case("1", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb4800", false)]
    fn validates_requests(#[case] chain: &str, #[case] address: &str, #[case] ok: bool) {
        let result = validate_request(chain, address);
        assert_eq!(result.is_ok(), ok, "{chain}/{address}");
        if let Err(AppError::Validation { message }) = result {
            assert_eq!(message, INVALID_REQUEST_MESSAGE);
        }
    }

    #[test]
    fn validation_lowercases_the_address() {
        let request = validate_request("1", &ADDR.to_uppercase().replacen("0X", "0x", 1)).unwrap();
        assert_eq!(request.address, ADDR);
    }

    #[test]
    fn rewrites_ipfs_urls() {
        let gateway = "https://cloudflare-ipfs.com/ipfs/";
        assert_eq!(
            ipfs_to_http("ipfs://CID/a/b", gateway),
            "https://cloudflare-ipfs.com/ipfs/CID/a/b"
        );
        assert_eq!(
            ipfs_to_http("https://example.com/logo.png", gateway),
            "https://example.com/logo.png"
        );
        assert_eq!(ipfs_to_http("IPFS://CID", gateway), "IPFS://CID");
    }

    #[test]
    fn identicon_is_deterministic() {
        let a = identicon_url("https://avatars.z52da5wt.xyz/", 1, &ADDR.to_uppercase());
        let b = identicon_url("https://avatars.z52da5wt.xyz", 1, ADDR);
        assert_eq!(a, b);
        assert_eq!(a, format!("https://avatars.z52da5wt.xyz/1:{ADDR}"));
    }

    #[test]
    fn fallback_order() {
        let logos = LogoConfig::default();
        let token = validate_request("1", ADDR).unwrap();
        let native = validate_request("137", ZERO_ADDRESS).unwrap();

        assert_eq!(
            choose_logo(&token, Some("https://cdn/x.png".into()), &logos),
            LogoSource::Cached("https://cdn/x.png".into())
        );
        assert_eq!(
            choose_logo(&native, Some("ipfs://cid".into()), &logos),
            LogoSource::Cached("ipfs://cid".into())
        );
        assert_eq!(
            choose_logo(&native, None, &logos),
            LogoSource::Native(logos.native_logo(137).to_string())
        );
        assert!(matches!(
            choose_logo(&token, None, &logos),
            LogoSource::Identicon(url) if url.ends_with(&format!("1:{ADDR}"))
        ));
    }

    #[test]
    fn cors_headers_replace_existing_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://only.example"),
        );
        apply_cors_headers(&mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, HEAD, OPTIONS"
        );
        assert_eq!(headers.get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN).iter().count(), 1);
    }
}
