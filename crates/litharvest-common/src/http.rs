//! Rate-limited HTTP client shared by every source adapter.
//!
//! Each client picks a browser-like identity once and keeps it for its whole
//! lifetime. Every attempt is preceded by a randomized courtesy delay, and
//! throttling responses (see [`RetryPolicy`]) are retried with exponential
//! backoff. Failures come back as [`RequestFailure`] values; nothing here
//! panics or propagates past `fetch`.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, DNT, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::HttpConfig;
use crate::error::Result;
use crate::retry::RetryPolicy;

/// User agents a client may present.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
];

const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";
const REFERER_VALUE: &str = "https://www.google.com/";

// ── Identity ─────────────────────────────────────────────────────────────────

/// Headers that make up a client's apparent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub referer: &'static str,
    pub do_not_track: bool,
}

impl Identity {
    /// Draw a user agent from the pool and a random DNT flag.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            user_agent: USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]),
            accept_language: ACCEPT_LANGUAGE_VALUE,
            referer: REFERER_VALUE,
            do_not_track: rng.gen_bool(0.5),
        }
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(self.user_agent)?);
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(self.accept_language)?);
        headers.insert(REFERER, HeaderValue::from_str(self.referer)?);
        headers.insert(DNT, HeaderValue::from_static(if self.do_not_track { "1" } else { "0" }));
        Ok(headers)
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

/// Uniform random pause taken before every attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourtesyDelay {
    min: Duration,
    max: Duration,
}

impl CourtesyDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// No pause at all.
    pub fn none() -> Self {
        Self { min: Duration::ZERO, max: Duration::ZERO }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Default for CourtesyDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3))
    }
}

/// Everything a [`RateLimitedClient`] needs besides its identity.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub courtesy: CourtesyDelay,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            courtesy: CourtesyDelay::default(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&HttpConfig> for HttpSettings {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            courtesy: CourtesyDelay::new(
                Duration::try_from_secs_f64(cfg.courtesy_delay_min_secs).unwrap_or_default(),
                Duration::try_from_secs_f64(cfg.courtesy_delay_max_secs).unwrap_or_default(),
            ),
            retry: RetryPolicy::new(cfg.max_attempts, Duration::from_millis(cfg.backoff_base_ms)),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────────────

/// A successful (2xx) response with its body read.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub body: String,
}

/// Why a request produced no page.
#[derive(Debug, Clone, Error)]
pub enum RequestFailure {
    #[error("{endpoint} still throttling after {attempts} attempts (last status {status})")]
    Exhausted { endpoint: String, status: StatusCode, attempts: u32 },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("network error talking to {endpoint}: {message}")]
    Network { endpoint: String, message: String },
}

// ── Client ───────────────────────────────────────────────────────────────────

/// HTTP client with courtesy delay, stable identity and throttle backoff.
///
/// Not meant to be shared between concurrently running adapters; build one
/// per adapter.
#[derive(Debug)]
pub struct RateLimitedClient {
    client: Client,
    identity: Identity,
    settings: HttpSettings,
}

impl RateLimitedClient {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Self::with_identity(settings, Identity::random())
    }

    pub fn with_identity(settings: HttpSettings, identity: Identity) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(identity.header_map()?)
            .build()?;
        Ok(Self { client, identity, settings })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// GET `endpoint` with `params` as the query string.
    #[instrument(skip(self, params))]
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<FetchedPage, RequestFailure> {
        let policy = &self.settings.retry;
        let mut attempt: u32 = 0;

        loop {
            tokio::time::sleep(self.settings.courtesy.sample()).await;

            let resp = match self.client.get(endpoint).query(params).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    error!(endpoint, attempt = attempt + 1, error = %e, "Request failed");
                    return Err(RequestFailure::Network {
                        endpoint: endpoint.to_string(),
                        message: e.to_string(),
                    });
                }
            };

            let status = resp.status();
            if status.is_success() {
                return match resp.text().await {
                    Ok(body) => {
                        debug!(endpoint, %status, bytes = body.len(), "Fetched");
                        Ok(FetchedPage { status, body })
                    }
                    Err(e) => {
                        error!(endpoint, %status, attempt = attempt + 1, error = %e, "Response body unreadable");
                        Err(RequestFailure::Network {
                            endpoint: endpoint.to_string(),
                            message: e.to_string(),
                        })
                    }
                };
            }

            if !policy.is_retryable(status) {
                error!(endpoint, %status, attempt = attempt + 1, "Request rejected");
                return Err(RequestFailure::Status { endpoint: endpoint.to_string(), status });
            }

            if !policy.has_attempt_after(attempt) {
                error!(endpoint, %status, attempts = attempt + 1, "Retry budget exhausted");
                return Err(RequestFailure::Exhausted {
                    endpoint: endpoint.to_string(),
                    status,
                    attempts: attempt + 1,
                });
            }

            let delay = policy.backoff(attempt);
            warn!(
                endpoint,
                %status,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Throttled, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
