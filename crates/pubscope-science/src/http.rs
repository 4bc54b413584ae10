use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pubscope_core::config::RegistryConfig;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, ScienceError};

const MAX_RETRY_AFTER_SECS: u64 = 60;

/// `pubscope/<version>`, with a `mailto:` contact when one is configured.
pub fn user_agent(polite_email: Option<&str>) -> String {
    let base = format!("pubscope/{}", env!("CARGO_PKG_VERSION"));
    match polite_email {
        Some(email) if !email.trim().is_empty() => format!("{base} (mailto:{})", email.trim()),
        _ => base,
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// HTTP client shared by every registry and harvester call.
///
/// Requests are spaced at least `min_interval` apart. 429, 5xx and network
/// errors are retried with exponential backoff up to `max_attempts` total
/// attempts and then surface as [`ScienceError::Transient`]. A 404 is terminal
/// and surfaces as [`ScienceError::NotFound`] without retrying.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    requests: AtomicUsize,
    max_attempts: u32,
    backoff_base: Duration,
}

impl RateLimitedClient {
    pub fn new(
        min_interval: Duration,
        max_attempts: u32,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            requests: AtomicUsize::new(0),
            max_attempts: max_attempts.max(1),
            backoff_base: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.max_attempts,
            Duration::from_secs(config.timeout_secs),
            &user_agent(config.polite_email.as_deref()),
        )
    }

    /// Base delay for the `base * 2^attempt` backoff schedule.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }

    /// HTTP requests sent so far, retries included.
    pub fn requests_sent(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with(url, |text| Ok(Some(text))).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_with(url, |text| parse_json(&text).map(Some)).await
    }

    /// Like [`get_json`](Self::get_json), but a body failing `complete` is
    /// retried like a 5xx, out of the same attempt budget.
    pub async fn get_json_complete<T, F>(&self, url: &str, complete: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        self.get_with(url, |text| {
            let value: T = parse_json(&text)?;
            Ok(complete(&value).then_some(value))
        })
        .await
    }

    /// Request loop. `accept` turns a 2xx body into a value; `Ok(None)` means
    /// the body was incomplete and the request is retried.
    async fn get_with<T, F>(&self, url: &str, accept: F) -> Result<T>
    where
        F: Fn(String) -> Result<Option<T>>,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            self.requests.fetch_add(1, Ordering::Relaxed);
            let resp = self.client.get(url).send().await;
            let (message, wait) = match resp {
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(ScienceError::NotFound(url.to_string()));
                }
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
                        .unwrap_or_else(|| self.backoff_for(attempt));
                    ("HTTP 429".to_string(), wait)
                }
                Ok(r) if r.status().is_server_error() => {
                    (format!("HTTP {}", r.status().as_u16()), self.backoff_for(attempt))
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => match r.text().await {
                    Ok(text) => match accept(text)? {
                        Some(value) => return Ok(value),
                        None => ("incomplete response".to_string(), self.backoff_for(attempt)),
                    },
                    Err(e) => (e.to_string(), self.backoff_for(attempt)),
                },
                Err(e) => (e.to_string(), self.backoff_for(attempt)),
            };

            attempt += 1;
            if attempt >= self.max_attempts {
                warn!(url, attempts = attempt, %message, "giving up");
                return Err(ScienceError::Transient {
                    url: url.to_string(),
                    attempts: attempt,
                    message,
                });
            }
            debug!(url, attempt, ?wait, %message, "retrying");
            sleep(wait).await;
        }
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| ScienceError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn client(max_attempts: u32) -> RateLimitedClient {
        RateLimitedClient::new(
            Duration::ZERO,
            max_attempts,
            Duration::from_secs(5),
            "pubscope-test",
        )
        .unwrap()
        .with_backoff(Duration::ZERO)
    }

    #[test]
    fn user_agent_includes_contact() {
        assert!(user_agent(Some("ops@example.org")).ends_with("(mailto:ops@example.org)"));
        assert!(!user_agent(None).contains("mailto"));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let c = RateLimitedClient::new(Duration::ZERO, 3, Duration::from_secs(1), "t")
            .unwrap()
            .with_backoff(Duration::from_millis(100));
        assert_eq!(c.backoff_for(0), Duration::from_millis(100));
        assert_eq!(c.backoff_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn not_found_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works/10.1/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/works/10.1/missing", server.url());
        let err = client(3).get(&url).await.unwrap_err();
        assert!(matches!(err, ScienceError::NotFound(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_transient() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let url = format!("{}/flaky", server.url());
        let err = client(3).get(&url).await.unwrap_err();
        match err {
            ScienceError::Transient { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected transient, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/limited")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/limited", server.url());
        let body: Value = client(3).get_json(&url).await.unwrap();
        assert_eq!(body["status"], "ok");
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bad")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/bad", server.url());
        let err = client(3).get(&url).await.unwrap_err();
        assert!(matches!(err, ScienceError::ApiError(_, _)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn incomplete_bodies_share_the_attempt_budget() {
        let mut server = mockito::Server::new_async().await;
        let partial = server
            .mock("GET", "/partial")
            .with_status(200)
            .with_body(r#"{"title":null}"#)
            .expect(1)
            .create_async()
            .await;
        let flaky = server
            .mock("GET", "/partial")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let c = client(3);
        let url = format!("{}/partial", server.url());
        let err = c
            .get_json_complete(&url, |body: &Value| body["title"].is_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::Transient { attempts: 3, .. }));
        assert_eq!(c.requests_sent(), 3);
        partial.assert_async().await;
        flaky.assert_async().await;
    }
}
