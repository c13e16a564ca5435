//! Rate-limited HTTP fetch gateway with retry and backoff.
//!
//! All outbound requests go through one [`FetchClient`]; its sliding-window
//! limiter is shared state for the whole crawl, so the outbound rate stays
//! bounded no matter how many call sites exist.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Retries were exhausted on network errors or 5xx responses.
    #[error("request to {url} failed after {attempts} attempts")]
    Exhausted {
        url: String,
        attempts: u32,
        last_status: Option<StatusCode>,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// The server rejected the request outright (4xx other than 429).
    #[error("request to {url} rejected with status {status}")]
    Rejected { url: String, status: StatusCode },
}

/// Sliding-window rate limiter: at most `max_calls` requests per `period`.
///
/// Append-and-prune runs under one lock so the window stays consistent
/// across concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until a request slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.period)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    None
                } else {
                    // Oldest entry decides when the window opens again.
                    let oldest = *calls.front().expect("window is non-empty");
                    Some(self.period.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!(?delay, "rate limit window full, waiting");
                    sleep(delay).await;
                }
            }
        }
    }
}

/// HTTP gateway every crawl request goes through.
#[derive(Debug)]
pub struct FetchClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    max_retries: u32,
    net_backoff: Duration,
    server_backoff: Duration,
    rate_limit_fallback: Duration,
}

impl FetchClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            limiter: RateLimiter::new(config.max_calls, config.period),
            max_retries: config.max_retries.max(1),
            net_backoff: config.net_backoff,
            server_backoff: config.server_backoff,
            rate_limit_fallback: config.rate_limit_fallback,
        })
    }

    /// Rate-limited GET returning the body text.
    ///
    /// Network errors and 5xx responses are retried with linear backoff up
    /// to the attempt budget. 429 responses sleep for `Retry-After` (or a
    /// fixed fallback) and retry without consuming an attempt: being told
    /// to slow down is expected and should not abort a crawl.
    ///
    /// # Errors
    ///
    /// [`FetchError::Rejected`] on any other 4xx, [`FetchError::Exhausted`]
    /// once the attempt budget is spent.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt: u32 = 1;

        loop {
            self.limiter.acquire().await;

            let response = match self.http.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(url, attempt, max_retries = self.max_retries, error = %e, "network error");
                    if attempt >= self.max_retries {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_status: None,
                            source: Some(e),
                        });
                    }
                    sleep(self.net_backoff * attempt).await;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = retry_after(&response).unwrap_or(self.rate_limit_fallback);
                warn!(url, delay_secs = delay.as_secs(), "429 received, sleeping before retry");
                sleep(delay).await;
                continue;
            }

            if status.is_server_error() {
                warn!(url, attempt, max_retries = self.max_retries, %status, "server error");
                if attempt >= self.max_retries {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last_status: Some(status),
                        source: None,
                    });
                }
                sleep(self.server_backoff * attempt).await;
                attempt += 1;
                continue;
            }

            if status.is_client_error() {
                return Err(FetchError::Rejected {
                    url: url.to_string(),
                    status,
                });
            }

            match response.text().await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(url, attempt, error = %e, "failed to read response body");
                    if attempt >= self.max_retries {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_status: Some(status),
                            source: Some(e),
                        });
                    }
                    sleep(self.net_backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Parse a numeric `Retry-After` header, if present.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
