//! Exponential-backoff retry shared by the HTTP providers

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{Error, Result};

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum RequestError {
    /// Worth retrying (connection failure, 429, 5xx)
    Transient(Error),
    /// Retrying would fail the same way
    Permanent(Error),
}

impl RequestError {
    fn into_inner(self) -> Error {
        match self {
            RequestError::Transient(e) | RequestError::Permanent(e) => e,
        }
    }
}

/// Retry settings for one provider
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Run `operation`, retrying transient failures with exponential backoff.
    pub async fn run<F, Fut, T>(&self, what: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(RequestError::Transient(e)) if attempt < self.max_retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        what,
                        attempt + 1,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into_inner()),
            }
        }
    }
}

/// Map a send error: timeouts and connection failures are transient.
pub fn classify_send_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RequestError::Transient(Error::Http(err))
    } else {
        RequestError::Permanent(Error::Http(err))
    }
}

/// Pass successful responses through; turn error statuses into a `RequestError`
/// built by `make_error` from the status line and body.
pub async fn check_status<E>(
    response: reqwest::Response,
    make_error: E,
) -> std::result::Result<reqwest::Response, RequestError>
where
    E: FnOnce(String) -> Error,
{
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    let err = make_error(format!("HTTP {}: {}", status, body.trim()));

    if status.as_u16() == 429 || status.is_server_error() {
        Err(RequestError::Transient(err))
    } else {
        Err(RequestError::Permanent(err))
    }
}
