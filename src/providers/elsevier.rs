//! Elsevier Text & Data Mining client.
//!
//! API documentation: <https://dev.elsevier.com/tdm.html>
//!
//! Requires an API key (`ELSEVIER_API_KEY`), sent in the `X-ELS-APIKey`
//! header. The article endpoint serves the PDF directly when asked with
//! `httpAccept=application/pdf`.

use async_trait::async_trait;

use crate::providers::{classify_status, ensure_pdf, retry_after_seconds, ProviderClient, ProviderError};
use crate::utils::HttpClient;

const ELSEVIER_API_BASE: &str = "https://api.elsevier.com";

/// Elsevier TDM provider.
#[derive(Debug, Clone)]
pub struct ElsevierClient {
    client: HttpClient,
    api_key: Option<String>,
    base_url: String,
}

impl ElsevierClient {
    pub fn new(client: HttpClient, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: ELSEVIER_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for ElsevierClient {
    fn id(&self) -> &str {
        "elsevier"
    }

    fn name(&self) -> &str {
        "Elsevier"
    }

    fn credentialed(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NoCredential)?;

        let url = format!(
            "{}/content/article/doi/{}?httpAccept=application/pdf",
            self.base_url,
            urlencoding::encode(doi)
        );
        tracing::debug!(%doi, "elsevier: fetching PDF");

        let response = self
            .client
            .get(&url)
            .header("X-ELS-APIKey", api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "Elsevier"));
        }

        let bytes = response.bytes().await?.to_vec();
        ensure_pdf(bytes, "Elsevier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_without_key_is_no_credential() {
        let client = ElsevierClient::new(HttpClient::new(), None);
        let err = client.fetch_pdf("10.1016/j.cell.2020.01.001").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoCredential));
    }

    #[tokio::test]
    async fn html_body_is_treated_as_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body("<html>entitlement required</html>")
            .create_async()
            .await;

        let client = ElsevierClient::new(HttpClient::new(), Some("key".into()))
            .with_base_url(server.url());
        let err = client.fetch_pdf("10.1016/j.cell.2020.01.001").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn forbidden_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let client = ElsevierClient::new(HttpClient::new(), Some("bad-key".into()))
            .with_base_url(server.url());
        let err = client.fetch_pdf("10.1016/j.cell.2020.01.001").await.unwrap_err();
        assert!(matches!(err, ProviderError::Fatal(_)));
    }
}
