use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::AuthError;

#[derive(Clone, Debug)]
pub struct AccessToken {
    pub value: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value.expose_secret())
    }

    /// A token inside the buffer window counts as stale; it must be
    /// refreshed before the next carrier call rather than risking an
    /// in-flight 401.
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at - buffer > now
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<AccessToken, AuthError>;
}

/// Issues one token that never refreshes. Test and development double.
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                value: value.into().into(),
                expires_at: Utc::now() + Duration::hours(12),
            },
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }
}

/// Fetches a fresh token from the tenant's auth endpoint.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, AuthError>;
}

/// Caching provider with single-flight refresh.
///
/// All callers serialize on the cache mutex: the first stale reader
/// performs the refresh while concurrent callers wait on the same lock and
/// then observe the already-refreshed token instead of issuing duplicate
/// refresh requests.
pub struct CachedTokenProvider<F> {
    fetcher: F,
    refresh_buffer: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl<F> CachedTokenProvider<F> {
    pub fn new(fetcher: F, refresh_buffer: Duration) -> Self {
        Self { fetcher, refresh_buffer, cached: Mutex::new(None) }
    }
}

#[async_trait]
impl<F> TokenProvider for CachedTokenProvider<F>
where
    F: TokenFetcher,
{
    async fn token(&self) -> Result<AccessToken, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now(), self.refresh_buffer) {
                return Ok(token.clone());
            }
            debug!("cached carrier token inside refresh buffer, refreshing");
        }

        let fresh = self.fetcher.fetch().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Client-credentials fetcher against the carrier's token endpoint.
pub struct HttpTokenFetcher {
    http: reqwest::Client,
    token_url: String,
    tenant: String,
    client_id: SecretString,
    client_secret: SecretString,
}

impl HttpTokenFetcher {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        tenant: impl Into<String>,
        client_id: SecretString,
        client_secret: SecretString,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            tenant: tenant.into(),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self) -> Result<AccessToken, AuthError> {
        if self.client_id.expose_secret().is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("tenant", self.tenant.as_str()),
                ("client_id", self.client_id.expose_secret()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::TokenRejected { status: status.as_u16(), body });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| AuthError::MalformedToken)?;
        let access_token = parsed.access_token.ok_or(AuthError::MalformedToken)?;
        let expires_in = parsed.expires_in.unwrap_or(3600);

        Ok(AccessToken {
            value: access_token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use crate::errors::AuthError;

    use super::{AccessToken, CachedTokenProvider, StaticTokenProvider, TokenFetcher, TokenProvider};

    struct CountingFetcher {
        calls: Arc<AtomicU32>,
        ttl_secs: i64,
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> Result<AccessToken, AuthError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken {
                value: format!("token-{call}").into(),
                expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
            })
        }
    }

    #[test]
    fn freshness_honors_the_buffer_window() {
        let now = Utc::now();
        let token = AccessToken { value: "t".to_string().into(), expires_at: now + Duration::seconds(30) };

        assert!(token.is_fresh(now, Duration::seconds(10)));
        assert!(!token.is_fresh(now, Duration::seconds(30)), "inside the buffer counts as stale");
    }

    #[tokio::test]
    async fn fresh_token_is_served_from_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = CachedTokenProvider::new(
            CountingFetcher { calls: calls.clone(), ttl_secs: 3_600 },
            Duration::seconds(60),
        );

        provider.token().await.expect("first token");
        provider.token().await.expect("second token");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second read must hit the cache");
    }

    #[tokio::test]
    async fn stale_token_triggers_a_refresh() {
        let calls = Arc::new(AtomicU32::new(0));
        // TTL shorter than the buffer, so every read is stale.
        let provider = CachedTokenProvider::new(
            CountingFetcher { calls: calls.clone(), ttl_secs: 10 },
            Duration::seconds(60),
        );

        provider.token().await.expect("first token");
        provider.token().await.expect("second token");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Arc::new(CachedTokenProvider::new(
            CountingFetcher { calls: calls.clone(), ttl_secs: 3_600 },
            Duration::seconds(60),
        ));

        let tasks = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.token().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.expect("join").expect("token");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "single-flight refresh");
    }

    #[tokio::test]
    async fn static_provider_always_returns_its_token() {
        let provider = StaticTokenProvider::new("fixed");
        let token = provider.token().await.expect("token");
        assert_eq!(token.bearer(), "Bearer fixed");
    }
}
