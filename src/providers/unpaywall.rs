//! Unpaywall client.
//!
//! API documentation: <https://unpaywall.org/api/v2>
//!
//! Requires an email address (`UNPAYWALL_EMAIL`; free, no key needed). The
//! v2 record's best OA location carries `url_for_pdf` when a free copy
//! exists.

use async_trait::async_trait;
use serde::Deserialize;

use crate::providers::{
    classify_status, download_pdf_url, retry_after_seconds, ProviderClient, ProviderError,
};
use crate::utils::HttpClient;

const UNPAYWALL_API_BASE: &str = "https://api.unpaywall.org";

/// Unpaywall aggregator provider.
#[derive(Debug, Clone)]
pub struct UnpaywallClient {
    client: HttpClient,
    email: Option<String>,
    base_url: String,
}

impl UnpaywallClient {
    pub fn new(client: HttpClient, email: Option<String>) -> Self {
        Self {
            client,
            email,
            base_url: UNPAYWALL_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for UnpaywallClient {
    fn id(&self) -> &str {
        "unpaywall"
    }

    fn name(&self) -> &str {
        "Unpaywall"
    }

    fn credentialed(&self) -> bool {
        self.email.is_some()
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        let email = self.email.as_deref().ok_or(ProviderError::NoCredential)?;

        let url = format!(
            "{}/v2/{}?email={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(email)
        );
        tracing::debug!(%doi, "unpaywall: looking up OA status");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "Unpaywall"));
        }

        let record: UnpaywallRecord = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Unpaywall: bad JSON: {}", e)))?;

        let pdf_url = record
            .best_oa_location
            .and_then(|loc| loc.url_for_pdf)
            .ok_or_else(|| ProviderError::NotFound(format!("Unpaywall: no OA PDF for {}", doi)))?;

        download_pdf_url(&self.client, &pdf_url, "Unpaywall").await
    }
}

/// Unpaywall API response (the fields we need)
#[derive(Debug, Deserialize)]
struct UnpaywallRecord {
    best_oa_location: Option<UnpaywallLocation>,
}

#[derive(Debug, Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_email_is_no_credential() {
        let client = UnpaywallClient::new(HttpClient::new(), None);
        let err = client.fetch_pdf("10.1021/jacs.0c01234").await.unwrap_err();
        assert!(matches!(err, ProviderError::NoCredential));
    }

    #[tokio::test]
    async fn closed_access_record_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/v2/".into()))
            .with_status(200)
            .with_body(r#"{"best_oa_location":null}"#)
            .create_async()
            .await;

        let client = UnpaywallClient::new(HttpClient::new(), Some("a@b.org".into()))
            .with_base_url(server.url());
        let err = client.fetch_pdf("10.1021/jacs.0c01234").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
