use anyhow::{Context, Result as AnyResult};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthManager;
use crate::error::{ApiError, Result};

/// Backoff settings for the request executor
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per logical call
    pub max_attempts: u32,

    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the uniform jitter added to backoff (milliseconds)
    pub jitter_ms: u64,

    /// Cap applied to 429 delays
    pub rate_limit_cap: Duration,

    /// Cap applied to 502/503/504 delays
    pub transient_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            jitter_ms: 200,
            rate_limit_cap: Duration::from_secs(10),
            transient_cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default caps and a custom attempt budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Exponential backoff: base * 2^attempt + U[0, jitter)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(delay.saturating_add(jitter))
    }

    /// Delay before retrying a 429
    ///
    /// A numeric `Retry-After` wins over the backoff formula; both are capped.
    pub fn rate_limit_delay(&self, retry_after: Option<&str>, attempt: u32) -> Duration {
        let delay = retry_after
            .and_then(parse_retry_after)
            .unwrap_or_else(|| self.backoff_delay(attempt));
        delay.min(self.rate_limit_cap)
    }

    /// Delay before retrying a 502/503/504
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt).min(self.transient_cap)
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds
///
/// HTTP-date values and negative numbers are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502..=504)
}

/// HTTP client for the resource API with auth and retry handling
pub struct ApiHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API root, without trailing slash
    base_url: String,

    /// Authentication manager
    auth_manager: Arc<AuthManager>,

    /// Retry behaviour
    policy: RetryPolicy,
}

impl ApiHttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        auth_manager: Arc<AuthManager>,
        request_timeout: u64,
        policy: RetryPolicy,
    ) -> AnyResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_manager,
            policy,
        })
    }

    /// Join the base URL and an endpoint path
    pub fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    /// Authentication manager shared with this client
    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth_manager
    }

    /// Execute one logical call
    /// Automatically handles:
    /// - missing token: logs in first
    /// - 401: logs in again and reissues the call once per attempt
    /// - 429: honours Retry-After, else exponential backoff (capped at 10s)
    /// - 502/503/504: exponential backoff (capped at 5s)
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        self.auth_manager.ensure_token().await?;

        let url = self.url(endpoint);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<(u16, String)> = None;

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        for attempt in 0..max_attempts {
            tracing::debug!(
                attempt = attempt + 1,
                max_attempts = max_attempts,
                "Executing request attempt"
            );

            let mut response = self.send(&method, &url, params, body).await?;

            // 401: refresh the session once in this cycle and reissue
            if response.status() == StatusCode::UNAUTHORIZED {
                tracing::warn!(url = %url, "Received 401, logging in again and reissuing");
                self.auth_manager.login().await?;
                response = self.send(&method, &url, params, body).await?;
            }

            let status = response.status();
            if status.is_success() {
                tracing::debug!(status = %status, "Request successful");
                return Ok(response);
            }

            let is_last = attempt + 1 >= max_attempts;

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let error_text = response.text().await.unwrap_or_default();
                last_error = Some((status.as_u16(), error_text));

                if !is_last {
                    let delay = self.policy.rate_limit_delay(retry_after.as_deref(), attempt);
                    tracing::warn!(
                        "Received {}, retrying after {}ms (attempt {}/{})",
                        status,
                        delay.as_millis(),
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            if is_transient(status) {
                let error_text = response.text().await.unwrap_or_default();
                last_error = Some((status.as_u16(), error_text));

                if !is_last {
                    let delay = self.policy.transient_delay(attempt);
                    tracing::warn!(
                        "Received {}, retrying after {}ms (attempt {}/{})",
                        status,
                        delay.as_millis(),
                        attempt + 1,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            // Non-retryable error
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                attempt = attempt + 1,
                "HTTP request failed with error response"
            );
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let (status, message) = last_error.unwrap_or((0, String::new()));
        tracing::error!(
            status = status,
            url = %url,
            total_attempts = max_attempts,
            "HTTP request failed after all retries"
        );
        Err(ApiError::RetriesExhausted {
            status,
            message,
            attempts: max_attempts,
        })
    }

    /// GET an endpoint and decode its JSON body; an empty body yields `None`
    pub async fn get_json(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Value>> {
        let response = self.execute(Method::GET, endpoint, params, None).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ApiError::Decode(format!("{} returned invalid JSON: {}", endpoint, e)))
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut builder = self.client.request(method.clone(), url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        if let Some(header) = self.auth_manager.authorization_header().await {
            builder = builder.header(AUTHORIZATION, header);
        }

        builder.send().await.map_err(|e| {
            let err = ApiError::from_transport(&e);
            tracing::warn!(error = %e, url = %url, "HTTP request error");
            err
        })
    }
}

/// Join a base URL and an endpoint, tolerating missing or doubled slashes
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    }
}
