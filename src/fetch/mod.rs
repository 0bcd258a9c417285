//! Resilient upstream fetching
//!
//! [`send_with_retry`] drives any request closure through the retry schedule:
//!
//! - success or `304 Not Modified` is terminal and returned at once
//! - `429` and `5xx` are retried; any other status is returned untouched
//! - when attempts run out after a retriable status, the last response is
//!   returned rather than an error
//! - when attempts run out after a transport failure, that error is raised
//!
//! Callers branch on that asymmetry: an HTTP failure is a value to inspect,
//! a transport failure is an `Err`.

use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{IndexerConfig, UpstreamConfig};
use crate::errors::{AppError, AppResult};
use crate::utils::backoff::retry_delay;
use crate::utils::jitter::{MAX_RETRY_JITTER_MS, generate_jitter_ms};

/// Attempt budget and backoff base for one logical fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// Policy used for token-list and registry fetches
    pub fn from_indexer_config(config: &IndexerConfig) -> Self {
        Self::new(config.fetch_attempts, config.base_delay)
    }
}

/// Statuses that are final without retrying
pub fn is_terminal_success(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_MODIFIED
}

pub fn is_retriable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run `send` until it yields a terminal response or the policy is exhausted
pub async fn send_with_retry<F, Fut, E>(
    policy: &RetryPolicy,
    target: &str,
    mut send: F,
) -> Result<Response, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);

    for attempt in 0..attempts {
        let last = attempt + 1 == attempts;

        match send().await {
            Ok(response) => {
                let status = response.status();
                if is_terminal_success(status) || !is_retriable(status) {
                    if attempt > 0 {
                        debug!(
                            "Fetch of {} finished with {} on attempt {}/{}",
                            target,
                            status,
                            attempt + 1,
                            attempts
                        );
                    }
                    return Ok(response);
                }
                if last {
                    warn!(
                        "Fetch of {} still failing with {} after {} attempts",
                        target, status, attempts
                    );
                    return Ok(response);
                }

                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok());
                let delay = retry_delay(
                    attempt,
                    policy.base_delay,
                    retry_after,
                    Utc::now(),
                    generate_jitter_ms(MAX_RETRY_JITTER_MS),
                );
                warn!(
                    "Fetch of {} returned {} on attempt {}/{}, retrying in {:?}",
                    target,
                    status,
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if last {
                    warn!(
                        "Fetch of {} failed after {} attempts: {}",
                        target, attempts, err
                    );
                    return Err(err);
                }
                let delay = retry_delay(
                    attempt,
                    policy.base_delay,
                    None,
                    Utc::now(),
                    generate_jitter_ms(MAX_RETRY_JITTER_MS),
                );
                warn!(
                    "Fetch of {} failed on attempt {}/{}, retrying in {:?}: {}",
                    target,
                    attempt + 1,
                    attempts,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("retry loop always returns on its last attempt")
}

/// HTTP client for the token-list provider and image hosts
#[derive(Clone)]
pub struct ResilientHttpClient {
    client: Client,
}

impl ResilientHttpClient {
    /// Client with a connect timeout only, so large token lists can stream
    pub fn new(config: &UpstreamConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` with `headers` through the retry schedule
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        headers: HeaderMap,
        policy: &RetryPolicy,
    ) -> AppResult<Response> {
        let response = send_with_retry(policy, url, || {
            self.client.get(url).headers(headers.clone()).send()
        })
        .await?;
        Ok(response)
    }

    /// GET and decode JSON; any non-success final status is an error
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> AppResult<T> {
        let response = self.fetch_with_retry(url, HeaderMap::new(), policy).await?;
        if !response.status().is_success() {
            return Err(AppError::upstream_status(url, response.status().as_u16()));
        }
        Ok(response.json::<T>().await?)
    }

    /// Single GET following redirects, no retries
    pub async fn get(&self, url: &str) -> AppResult<Response> {
        Ok(self.client.get(url).send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn response(status: u16, retry_after: Option<&str>) -> Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(value) = retry_after {
            builder = builder.header("retry-after", value);
        }
        Response::from(builder.body("").unwrap())
    }

    /// Replays scripted outcomes and records when each attempt happened
    struct Script {
        outcomes: Mutex<VecDeque<Result<Response, String>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Script {
        fn new(outcomes: Vec<Result<Response, String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn next(self: Arc<Self>) -> Result<Response, String> {
            self.calls.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(800))
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_server_errors() {
        let script = Script::new(vec![
            Ok(response(500, None)),
            Ok(response(500, None)),
            Ok(response(200, None)),
        ]);
        let s = Arc::clone(&script);
        let result = send_with_retry(&policy(), "test", move || Arc::clone(&s).next())
            .await
            .unwrap();

        assert_eq!(result.status(), StatusCode::OK);
        assert_eq!(script.call_count(), 3);
        let gaps = script.gaps();
        assert!(gaps[0] >= Duration::from_millis(800));
        assert!(gaps[1] >= gaps[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after_on_429() {
        let script = Script::new(vec![
            Ok(response(429, Some("2"))),
            Ok(response(429, Some("2"))),
            Ok(response(429, Some("2"))),
            Ok(response(429, Some("2"))),
        ]);
        let s = Arc::clone(&script);
        let result = send_with_retry(
            &RetryPolicy::new(4, Duration::from_millis(10)),
            "test",
            move || Arc::clone(&s).next(),
        )
        .await
        .unwrap();

        // exhausted: the last failing response is handed back
        assert_eq!(result.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(script.call_count(), 4);
        for gap in script.gaps() {
            assert!(gap >= Duration::from_millis(2_000), "waited only {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_modified_is_terminal() {
        let script = Script::new(vec![Ok(response(304, None))]);
        let s = Arc::clone(&script);
        let result = send_with_retry(&policy(), "test", move || Arc::clone(&s).next())
            .await
            .unwrap();
        assert_eq!(result.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(script.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let script = Script::new(vec![Ok(response(404, None))]);
        let s = Arc::clone(&script);
        let result = send_with_retry(&policy(), "test", move || Arc::clone(&s).next())
            .await
            .unwrap();
        assert_eq!(result.status(), StatusCode::NOT_FOUND);
        assert_eq!(script.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_then_raised() {
        let script = Script::new(vec![
            Err("connection refused".to_string()),
            Err("connection refused".to_string()),
            Err("connection reset".to_string()),
        ]);
        let s = Arc::clone(&script);
        let result = send_with_retry(
            &RetryPolicy::new(3, Duration::from_millis(100)),
            "test",
            move || Arc::clone(&s).next(),
        )
        .await;

        assert_eq!(result.unwrap_err(), "connection reset");
        assert_eq!(script.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_then_success() {
        let script = Script::new(vec![
            Err("connection refused".to_string()),
            Ok(response(200, None)),
        ]);
        let s = Arc::clone(&script);
        let result = send_with_retry(&policy(), "test", move || Arc::clone(&s).next())
            .await
            .unwrap();
        assert_eq!(result.status(), StatusCode::OK);
        assert!(script.gaps()[0] >= Duration::from_millis(800));
    }

    #[test]
    fn status_classification() {
        assert!(is_terminal_success(StatusCode::OK));
        assert!(is_terminal_success(StatusCode::NOT_MODIFIED));
        assert!(is_retriable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable(StatusCode::BAD_GATEWAY));
        assert!(!is_retriable(StatusCode::NOT_FOUND));
        assert!(!is_retriable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
