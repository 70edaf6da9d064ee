use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use lineup_core::config::CarrierConfig;

use crate::auth::{CachedTokenProvider, HttpTokenFetcher, TokenProvider};
use crate::errors::CheckoutError;
use crate::types::{PurchaseResponse, QuoteResponse, StatusResponse, TransactionRequest};

/// The carrier's three-call transaction surface. Implemented over HTTP in
/// production and by scripted fakes in orchestrator tests.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn quote(&self, request: &TransactionRequest) -> Result<QuoteResponse, CheckoutError>;
    async fn purchase(
        &self,
        request: &TransactionRequest,
    ) -> Result<PurchaseResponse, CheckoutError>;
    async fn status(&self, transaction_id: &str) -> Result<StatusResponse, CheckoutError>;
}

pub struct HttpCarrierClient<P> {
    http: reqwest::Client,
    base_url: String,
    token_provider: P,
}

impl HttpCarrierClient<CachedTokenProvider<HttpTokenFetcher>> {
    /// Production wiring: shared HTTP client, client-credentials token
    /// fetcher against the carrier's token endpoint, cached single-flight
    /// refresh inside the configured buffer window.
    pub fn from_config(config: &CarrierConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let fetcher = HttpTokenFetcher::new(
            http.clone(),
            format!("{base_url}/oauth/token"),
            config.tenant.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        let provider = CachedTokenProvider::new(
            fetcher,
            chrono::Duration::seconds(config.token_refresh_buffer_secs as i64),
        );
        Ok(Self::new(http, base_url, provider))
    }
}

impl<P> HttpCarrierClient<P>
where
    P: TokenProvider,
{
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token_provider: P) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, token_provider }
    }

    /// Every carrier call starts here: the provider refreshes tokens inside
    /// the buffer window, so a request never goes out with a token about to
    /// expire mid-flight.
    async fn bearer(&self) -> Result<String, CheckoutError> {
        Ok(self.token_provider.token().await?.bearer())
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, String), CheckoutError> {
        let bearer = self.bearer().await?;
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "carrier request");

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| transport_error(path, e))?;
        Ok((status, text))
    }
}

fn transport_error(path: &str, error: reqwest::Error) -> CheckoutError {
    let body = error.to_string();
    if path.starts_with("/quotes") {
        CheckoutError::Quote { status: None, body }
    } else if path.starts_with("/purchases") {
        CheckoutError::Purchase { status: None, body }
    } else {
        CheckoutError::Status { status: None, body }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    body: &str,
    on_error: impl FnOnce(String) -> CheckoutError,
) -> Result<T, CheckoutError> {
    serde_json::from_str(body).map_err(|e| on_error(format!("undecodable response: {e}")))
}

#[async_trait]
impl<P> CarrierApi for HttpCarrierClient<P>
where
    P: TokenProvider,
{
    async fn quote(&self, request: &TransactionRequest) -> Result<QuoteResponse, CheckoutError> {
        let (status, body) = self.post_json("/quotes", request).await?;
        if !(200..300).contains(&status) {
            warn!(status, "quote call failed");
            return Err(CheckoutError::Quote { status: Some(status), body });
        }
        decode(&body, |body| CheckoutError::Quote { status: Some(status), body })
    }

    async fn purchase(
        &self,
        request: &TransactionRequest,
    ) -> Result<PurchaseResponse, CheckoutError> {
        let (status, body) = self.post_json("/purchases", request).await?;
        if !(200..300).contains(&status) {
            warn!(status, "purchase call failed");
            return Err(CheckoutError::Purchase { status: Some(status), body });
        }
        decode(&body, |body| CheckoutError::Purchase { status: Some(status), body })
    }

    async fn status(&self, transaction_id: &str) -> Result<StatusResponse, CheckoutError> {
        let bearer = self.bearer().await?;
        let url = format!("{}/purchases/{transaction_id}/status", self.base_url);
        debug!(%url, "carrier status request");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await
            .map_err(|e| CheckoutError::Status { status: None, body: e.to_string() })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CheckoutError::Status { status: None, body: e.to_string() })?;

        if status == 404 {
            return Err(CheckoutError::NotFound { transaction_id: transaction_id.to_string() });
        }
        if !(200..300).contains(&status) {
            warn!(status, "status call failed");
            return Err(CheckoutError::Status { status: Some(status), body });
        }
        decode(&body, |body| CheckoutError::Status { status: Some(status), body })
    }
}
