//! Retry logic for external API calls
//!
//! Calls to the share client and library managers retry a small fixed number
//! of times with linear backoff. Authentication failures and "not found" are
//! final and never retried.

use std::time::Duration;

use backoff::backoff::Backoff;
use reqwest::{Response, StatusCode};
use tracing::warn;
use url::Url;

/// Errors from the HTTP collaborators
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("authentication failed ({0})")]
    Unauthorized(StatusCode),
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("invalid base url {0:?}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Worth trying again: transport problems, 408, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Status { status, .. } => {
                let code = status.as_u16();
                code == 408 || code == 429 || status.is_server_error()
            }
            _ => false,
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before retry `n` is `interval * n`
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn to_backoff(&self) -> LinearBackoff {
        LinearBackoff {
            interval: self.interval,
            max_retries: self.max_retries,
            attempt: 0,
        }
    }
}

/// `interval`, `2 * interval`, ... until `max_retries` is used up
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    interval: Duration,
    max_retries: u32,
    attempt: u32,
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        self.attempt += 1;
        Some(self.interval * self.attempt)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Execute an async operation with retry logic
pub async fn retry_async<T, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, ClientError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ClientError>>,
{
    let mut backoff = config.to_backoff();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => match backoff.next_backoff() {
                Some(wait) => {
                    warn!(
                        operation = %operation_name,
                        attempt = attempts,
                        error = %e,
                        retry_in_ms = wait.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }
            },
        }
    }
}

/// Turn a response into `Ok(Some)`, `Ok(None)` for 404, or a typed error
pub fn check_status(response: Response) -> Result<Option<Response>, ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ClientError::Unauthorized(status));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(ClientError::Status {
            status,
            url: response.url().to_string(),
        });
    }
    Ok(Some(response))
}

/// Parse a user-supplied base url. A missing scheme gets `http://` and the
/// path always ends in `/` so relative joins keep it.
pub fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidUrl(raw.to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let mut url = Url::parse(&with_scheme).map_err(|_| ClientError::InvalidUrl(raw.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Read a JSON body, reporting undecodable payloads as [`ClientError::Decode`]
pub async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let url = response.url().to_string();
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode {
        url,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_linear_backoff() {
        let mut backoff = RetryConfig {
            max_retries: 3,
            interval: Duration::from_millis(100),
        }
        .to_backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(300)));
        assert_eq!(backoff.next_backoff(), None);
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_transient_classification() {
        let err = ClientError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: "http://x".to_string(),
        };
        assert!(err.is_transient());
        assert!(!ClientError::Unauthorized(StatusCode::UNAUTHORIZED).is_transient());
    }

    #[test]
    fn test_normalize_base_url() {
        let url = normalize_base_url("sonarr:8989/").unwrap();
        assert_eq!(url.as_str(), "http://sonarr:8989/");
        let url = normalize_base_url("https://host/sonarr").unwrap();
        assert_eq!(url.as_str(), "https://host/sonarr/");
        assert_eq!(
            url.join("api/v3/series").unwrap().as_str(),
            "https://host/sonarr/api/v3/series"
        );
        assert!(normalize_base_url("  ").is_err());
    }

    #[tokio::test]
    async fn test_retry_stops_on_auth_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = RetryConfig {
            max_retries: 3,
            interval: Duration::from_millis(1),
        };
        let result: Result<(), ClientError> = retry_async(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Unauthorized(StatusCode::UNAUTHORIZED))
            },
            &config,
            "test",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = RetryConfig {
            max_retries: 2,
            interval: Duration::from_millis(1),
        };
        let result: Result<(), ClientError> = retry_async(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    url: "http://x".to_string(),
                })
            },
            &config,
            "test",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
