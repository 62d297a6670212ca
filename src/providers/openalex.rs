//! OpenAlex open-access client.
//!
//! API documentation: <https://docs.openalex.org>
//!
//! No credential required; a mailto address joins the polite pool and is
//! recommended but optional. The work record's best OA location carries the
//! PDF URL when an open copy exists.

use async_trait::async_trait;
use serde::Deserialize;

use crate::providers::{
    classify_status, download_pdf_url, retry_after_seconds, ProviderClient, ProviderError,
};
use crate::utils::HttpClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// OpenAlex aggregator provider.
#[derive(Debug, Clone)]
pub struct OpenAlexClient {
    client: HttpClient,
    mailto: Option<String>,
    base_url: String,
}

impl OpenAlexClient {
    pub fn new(client: HttpClient, mailto: Option<String>) -> Self {
        Self {
            client,
            mailto,
            base_url: OPENALEX_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for OpenAlexClient {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    // OpenAlex works without a credential; mailto only upgrades rate limits.
    fn credentialed(&self) -> bool {
        true
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        let mut url = format!("{}/works/doi:{}", self.base_url, urlencoding::encode(doi));
        if let Some(mailto) = &self.mailto {
            url = format!("{}?mailto={}", url, urlencoding::encode(mailto));
        }
        tracing::debug!(%doi, "openalex: looking up work");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "OpenAlex"));
        }

        let work: OpenAlexWork = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("OpenAlex: bad JSON: {}", e)))?;

        let pdf_url = work
            .best_oa_location
            .and_then(|loc| loc.pdf_url)
            .ok_or_else(|| ProviderError::NotFound(format!("OpenAlex: no OA PDF for {}", doi)))?;

        download_pdf_url(&self.client, &pdf_url, "OpenAlex").await
    }
}

/// OpenAlex work response (the fields we need)
#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    pdf_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_oa_location_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/works/doi:".into()))
            .with_status(200)
            .with_body(r#"{"best_oa_location":null}"#)
            .create_async()
            .await;

        let client = OpenAlexClient::new(HttpClient::new(), None).with_base_url(server.url());
        let err = client.fetch_pdf("10.1021/jacs.0c01234").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn downloads_best_oa_pdf() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            r#"{{"best_oa_location":{{"pdf_url":"{}/oa.pdf"}}}}"#,
            server.url()
        );
        server
            .mock("GET", mockito::Matcher::Regex("^/works/doi:".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
        server
            .mock("GET", "/oa.pdf")
            .with_status(200)
            .with_body(b"%PDF-1.4 oa".to_vec())
            .create_async()
            .await;

        let client = OpenAlexClient::new(HttpClient::new(), Some("a@b.org".into()))
            .with_base_url(server.url());
        let bytes = client.fetch_pdf("10.1021/jacs.0c01234").await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
