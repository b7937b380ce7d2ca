use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_client_error()) && !self.is_rate_limited()
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_server_error())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Status { .. } => self.is_rate_limited() || self.is_server_error(),
            HttpError::Timeout { .. } | HttpError::Transport { .. } => true,
            HttpError::Decode { .. } => false,
        }
    }
}

/// Per-request knobs. `Default` matches what the scrapers want for
/// list/detail calls; the scheduler and matcher build their own.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Exponential backoff: base doubles per attempt, capped at max.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    exp.min(max)
}

/// Uniform jitter in `[0, max_ms)`, used between fetch batches.
pub fn jitter(max_ms: u64) -> Duration {
    Duration::from_millis(rand::rng().random_range(0..max_ms.max(1)))
}

/// Resilient HTTP client shared by all scrapers and the AI scorer.
/// Retries transport errors, 429 and 5xx with exponential backoff;
/// other 4xx are surfaced immediately.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, HttpError> {
        let inner = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| HttpError::Transport {
                url: String::new(),
                source: e,
            })?;
        Ok(Self { inner })
    }

    pub async fn get_json(
        &self,
        url: &str,
        headers: Option<HeaderMap>,
        opts: &RequestOptions,
    ) -> Result<Value, HttpError> {
        self.request_json(Method::GET, url, headers, None, opts)
            .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: Option<HeaderMap>,
        body: &Value,
        opts: &RequestOptions,
    ) -> Result<Value, HttpError> {
        self.request_json(Method::POST, url, headers, Some(body.clone()), opts)
            .await
    }

    async fn request_json(
        &self,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<Value>,
        opts: &RequestOptions,
    ) -> Result<Value, HttpError> {
        let mut last_err: Option<HttpError> = None;

        for attempt in 0..=opts.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1, opts.base_delay, opts.max_delay);
                tracing::debug!("Retrying {url} (attempt {attempt}) after {delay:?}");
                tokio::time::sleep(delay).await;
            }

            match self
                .execute_once(method.clone(), url, headers.clone(), body.as_ref(), opts)
                .await
            {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < opts.max_retries => {
                    tracing::debug!("Request to {url} failed, will retry: {e}");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Loop always returns or stores an error before exhausting.
        Err(last_err.unwrap_or(HttpError::Timeout {
            url: url.to_string(),
            timeout_ms: opts.timeout.as_millis() as u64,
        }))
    }

    async fn execute_once(
        &self,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<&Value>,
        opts: &RequestOptions,
    ) -> Result<Value, HttpError> {
        let mut req = self
            .inner
            .request(method, url)
            .header("Accept", HeaderValue::from_static("application/json"));
        if let Some(h) = headers {
            req = req.headers(h);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = tokio::time::timeout(opts.timeout, req.send())
            .await
            .map_err(|_| HttpError::Timeout {
                url: url.to_string(),
                timeout_ms: opts.timeout.as_millis() as u64,
            })?
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status,
                url: url.to_string(),
            });
        }

        tokio::time::timeout(opts.timeout, resp.json::<Value>())
            .await
            .map_err(|_| HttpError::Timeout {
                url: url.to_string(),
                timeout_ms: opts.timeout.as_millis() as u64,
            })?
            .map_err(|e| HttpError::Decode {
                url: url.to_string(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let max = Duration::from_secs(4);
        assert_eq!(backoff_delay(0, base, max), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, base, max), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, base, max), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, base, max), Duration::from_secs(4));
    }

    #[test]
    fn classification_helpers() {
        let rate_limited = HttpError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            url: "http://x".into(),
        };
        assert!(rate_limited.is_rate_limited());
        assert!(!rate_limited.is_client_error());
        assert!(rate_limited.is_retryable());

        let not_found = HttpError::Status {
            status: StatusCode::NOT_FOUND,
            url: "http://x".into(),
        };
        assert!(not_found.is_client_error());
        assert!(!not_found.is_retryable());

        let bad_gateway = HttpError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "http://x".into(),
        };
        assert!(bad_gateway.is_server_error());
        assert!(bad_gateway.is_retryable());

        let timeout = HttpError::Timeout {
            url: "http://x".into(),
            timeout_ms: 1000,
        };
        assert!(timeout.is_retryable());
    }
}
