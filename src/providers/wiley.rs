//! Wiley Text & Data Mining client.
//!
//! API documentation: <https://onlinelibrary.wiley.com/library-info/resources/text-and-datamining>
//!
//! Requires a TDM token (`WILEY_TDM_TOKEN`), sent as a bearer token.

use async_trait::async_trait;

use crate::providers::{classify_status, ensure_pdf, retry_after_seconds, ProviderClient, ProviderError};
use crate::utils::HttpClient;

const WILEY_API_BASE: &str = "https://onlinelibrary.wiley.com/api/tdm/v1";

/// Wiley TDM provider.
#[derive(Debug, Clone)]
pub struct WileyClient {
    client: HttpClient,
    token: Option<String>,
    base_url: String,
}

impl WileyClient {
    pub fn new(client: HttpClient, token: Option<String>) -> Self {
        Self {
            client,
            token,
            base_url: WILEY_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for WileyClient {
    fn id(&self) -> &str {
        "wiley"
    }

    fn name(&self) -> &str {
        "Wiley"
    }

    fn credentialed(&self) -> bool {
        self.token.is_some()
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        let token = self.token.as_deref().ok_or(ProviderError::NoCredential)?;

        let url = format!("{}/articles/{}/pdf", self.base_url, urlencoding::encode(doi));
        tracing::debug!(%doi, %url, "wiley: fetching PDF");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/pdf")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "Wiley"));
        }

        let bytes = response.bytes().await?.to_vec();
        ensure_pdf(bytes, "Wiley")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentialed_tracks_token_presence() {
        let with = WileyClient::new(HttpClient::new(), Some("tok".into()));
        let without = WileyClient::new(HttpClient::new(), None);
        assert!(with.credentialed());
        assert!(!without.credentialed());
    }

    #[tokio::test]
    async fn fetch_without_token_is_no_credential() {
        let client = WileyClient::new(HttpClient::new(), None);
        let err = client.fetch_pdf("10.1002/anie.202100001").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoCredential));
    }
}
