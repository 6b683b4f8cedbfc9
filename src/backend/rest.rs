//! Supabase REST Client
//!
//! HTTP client for the managed backend's auth (GoTrue) and data
//! (PostgREST) endpoints. Implements [`AuthService`] and
//! [`AuthorizedDataAccess`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::RwLock;
use std::time::Duration;

use super::{AuthRedirect, AuthService, AuthorizedDataAccess, BackendError, BackendResult};
use crate::model::{Bookmark, BookmarkId, Identity, NewBookmark};

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., "https://abc.supabase.co")
    pub base_url: String,
    /// Public anon key, sent as `apikey` on every request
    pub anon_key: String,
    /// Table holding bookmark rows
    pub table: String,
    /// Where the OAuth provider sends the browser back to
    pub redirect_to: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts for transient failures
    pub max_retries: u32,
    /// Base backoff between attempts; attempt `n` waits `n² × base`
    pub retry_base_ms: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            table: "bookmarks".to_string(),
            redirect_to: None,
            request_timeout_ms: 10_000,
            max_retries: 3,
            retry_base_ms: 1000,
        }
    }
}

/// Auth + data access client for the managed backend
pub struct SupabaseClient {
    client: Client,
    config: SupabaseConfig,
    access_token: RwLock<Option<String>>,
}

impl SupabaseClient {
    /// Create a client without a session
    pub fn new(config: SupabaseConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        let mut config = config;
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            config,
            access_token: RwLock::new(None),
        })
    }

    /// Create a client carrying a user access token
    pub fn with_access_token(config: SupabaseConfig, token: impl Into<String>) -> BackendResult<Self> {
        let client = Self::new(config)?;
        client.set_access_token(Some(token.into()));
        Ok(client)
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Current user access token, if signed in
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .map(|token| token.clone())
            .unwrap_or_default()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.access_token.write() {
            *guard = token;
        }
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, self.config.table)
    }

    /// Attach `apikey` and bearer headers
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone());

        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    /// Send a request, retrying according to `policy`
    async fn send<F>(&self, policy: RetryPolicy, build: F) -> BackendResult<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = BackendError::Unavailable;

        for attempt in 0..attempts {
            let last_attempt = attempt + 1 == attempts;

            if attempt > 0 {
                // Quadratic backoff: 1×, 4×, 9× the base delay
                let delay = self.config.retry_base_ms * (attempt as u64).pow(2);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = match self.authorize(build()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = BackendError::from_transport(e);
                    if policy.retries_transport(&err) {
                        tracing::debug!(attempt, error = %err, "Transient request failure");
                        last_error = err;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if policy == RetryPolicy::ConnectOnly || last_attempt {
                    return Err(BackendError::RateLimited);
                }
                if let Some(delay) = self.retry_after(&response) {
                    tokio::time::sleep(delay).await;
                }
                last_error = BackendError::RateLimited;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            let err = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    BackendError::Unauthorized(message)
                }
                _ => BackendError::Api {
                    status: status.as_u16(),
                    message,
                },
            };

            if policy == RetryPolicy::Transient && err.is_transient() {
                tracing::debug!(attempt, error = %err, "Transient API failure");
                last_error = err;
                continue;
            }
            return Err(err);
        }

        Err(last_error)
    }

    /// Server-requested delay, capped at the request timeout
    fn retry_after(&self, response: &Response) -> Option<Duration> {
        let requested = Duration::from_secs(retry_after_secs(response)?);
        Some(requested.min(Duration::from_millis(self.config.request_timeout_ms)))
    }
}

/// Which failures a request may be resent after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Reads and deletes: connect errors, timeouts, 429 and 5xx
    Transient,
    /// Inserts: only when the request never reached the server
    ConnectOnly,
}

impl RetryPolicy {
    fn retries_transport(&self, err: &BackendError) -> bool {
        match self {
            RetryPolicy::Transient => err.is_transient(),
            RetryPolicy::ConnectOnly => matches!(err, BackendError::Unavailable),
        }
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn current_identity(&self) -> BackendResult<Option<Identity>> {
        if self.access_token().is_none() {
            return Ok(None);
        }

        let url = format!("{}/auth/v1/user", self.config.base_url);
        let response = match self.send(RetryPolicy::Transient, || self.client.get(&url)).await {
            Ok(response) => response,
            // Expired or revoked token means no session
            Err(BackendError::Unauthorized(reason)) => {
                tracing::debug!(reason = %reason, "Stored session rejected");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let identity: Identity = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(Some(identity))
    }

    async fn oauth_redirect(&self, provider: &str) -> BackendResult<AuthRedirect> {
        let mut url = format!(
            "{}/auth/v1/authorize?provider={}",
            self.config.base_url,
            urlencoding::encode(provider)
        );

        if let Some(redirect_to) = &self.config.redirect_to {
            url.push_str("&redirect_to=");
            url.push_str(&urlencoding::encode(redirect_to));
        }

        Ok(AuthRedirect {
            provider: provider.to_string(),
            url,
        })
    }

    async fn sign_out(&self) -> BackendResult<()> {
        if self.access_token().is_none() {
            return Ok(());
        }

        let url = format!("{}/auth/v1/logout", self.config.base_url);
        let result = self.send(RetryPolicy::Transient, || self.client.post(&url)).await;

        // The local session ends either way
        self.set_access_token(None);

        match result {
            Ok(_) | Err(BackendError::Unauthorized(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AuthorizedDataAccess for SupabaseClient {
    async fn list_bookmarks(&self) -> BackendResult<Vec<Bookmark>> {
        let url = self.rest_url();
        let response = self
            .send(RetryPolicy::Transient, || {
                self.client
                    .get(&url)
                    .query(&[("select", "*"), ("order", "created_at.desc")])
            })
            .await?;

        let bookmarks: Vec<Bookmark> = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        tracing::debug!(count = bookmarks.len(), "Fetched bookmarks");
        Ok(bookmarks)
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> BackendResult<()> {
        let url = self.rest_url();
        let rows = [bookmark];

        // A resent insert after the server committed would duplicate the row
        self.send(RetryPolicy::ConnectOnly, || {
            self.client
                .post(&url)
                .header("Prefer", "return=minimal")
                .json(&rows)
        })
        .await?;

        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> BackendResult<()> {
        let url = self.rest_url();
        let filter = format!("eq.{}", id);

        self.send(RetryPolicy::Transient, || self.client.delete(&url).query(&[("id", filter.as_str())]))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupabaseConfig::default();
        assert_eq!(config.base_url, "http://localhost:54321");
        assert_eq!(config.table, "bookmarks");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = SupabaseClient::new(SupabaseConfig {
            base_url: "https://abc.supabase.co/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.rest_url(), "https://abc.supabase.co/rest/v1/bookmarks");
    }

    #[tokio::test]
    async fn test_oauth_redirect_url() {
        let client = SupabaseClient::new(SupabaseConfig {
            base_url: "https://abc.supabase.co".to_string(),
            redirect_to: Some("http://localhost:3000/".to_string()),
            ..Default::default()
        })
        .unwrap();

        let redirect = client.oauth_redirect("google").await.unwrap();
        assert_eq!(redirect.provider, "google");
        assert_eq!(
            redirect.url,
            "https://abc.supabase.co/auth/v1/authorize?provider=google&redirect_to=http%3A%2F%2Flocalhost%3A3000%2F"
        );
    }

    #[tokio::test]
    async fn test_no_token_means_no_session() {
        // Unroutable base URL: a request would fail, so None proves none was sent
        let client = SupabaseClient::new(SupabaseConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 1,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.current_identity().await.unwrap(), None);
        assert!(client.sign_out().await.is_ok());
    }

    #[test]
    fn test_insert_policy_retries_only_unsent_requests() {
        let policy = RetryPolicy::ConnectOnly;
        assert!(policy.retries_transport(&BackendError::Unavailable));
        assert!(!policy.retries_transport(&BackendError::Timeout));

        assert!(RetryPolicy::Transient.retries_transport(&BackendError::Timeout));
    }

    #[test]
    fn test_access_token_roundtrip() {
        let client = SupabaseClient::with_access_token(SupabaseConfig::default(), "jwt").unwrap();
        assert_eq!(client.access_token().as_deref(), Some("jwt"));

        client.set_access_token(None);
        assert!(client.access_token().is_none());
    }
}
