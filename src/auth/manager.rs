use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::login;
use super::types::{Credentials, SessionToken};

/// Authentication manager
/// Owns the session token; the request executor reads it through a shared handle
pub struct AuthManager {
    /// Login credentials (fixed for the run)
    credentials: Credentials,

    /// Absolute login URL
    login_url: String,

    /// Current session token, replaced wholesale on each login
    session: Arc<RwLock<Option<SessionToken>>>,

    /// HTTP client for login requests
    client: Client,

    /// Number of successful logins performed
    logins: AtomicU32,
}

impl AuthManager {
    /// Create a new AuthManager for testing with a pre-issued token
    /// Available in test builds and integration tests
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(login_url: impl Into<String>, token: Option<&str>) -> Result<Self> {
        let manager = Self::new(
            login_url,
            Credentials::new("test-user", "test-password"),
            30,
        )?;

        if let Some(token) = token {
            let session = SessionToken {
                value: token.to_string(),
                scheme: super::types::DEFAULT_SCHEME.to_string(),
                obtained_at: chrono::Utc::now(),
            };
            // No other handle exists yet
            if let Ok(mut guard) = manager.session.try_write() {
                *guard = Some(session);
            }
        }

        Ok(manager)
    }

    /// Create a new AuthManager; no login is performed until requested
    pub fn new(
        login_url: impl Into<String>,
        credentials: Credentials,
        login_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(login_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            login_url: login_url.into(),
            session: Arc::new(RwLock::new(None)),
            client,
            logins: AtomicU32::new(0),
        })
    }

    /// Log in and replace the stored session token
    ///
    /// On failure the previous token (if any) is left untouched.
    pub async fn login(&self) -> crate::error::Result<()> {
        tracing::debug!("Logging in...");

        let token =
            login::request_token(&self.client, &self.login_url, &self.credentials).await?;

        tracing::info!(
            "✅ Authentication successful (token: {}..., scheme: {})",
            token.preview(),
            token.scheme
        );

        *self.session.write().await = Some(token);
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Log in only if no token is held yet
    pub async fn ensure_token(&self) -> crate::error::Result<()> {
        if self.has_token().await {
            return Ok(());
        }
        self.login().await
    }

    /// Whether a session token is currently held
    pub async fn has_token(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// Snapshot of the current token
    pub async fn current(&self) -> Option<SessionToken> {
        self.session.read().await.clone()
    }

    /// `Authorization` header value for the current token
    pub async fn authorization_header(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(SessionToken::header_value)
    }

    /// Number of successful logins since construction
    pub fn login_count(&self) -> u32 {
        self.logins.load(Ordering::SeqCst)
    }
}
