//! Springer Nature open-access client.
//!
//! API documentation: <https://dev.springernature.com>
//!
//! Requires a free API key (`SPRINGER_API_KEY`). The metadata record for an
//! OA article carries the PDF link; fetching it is a second hop.

use async_trait::async_trait;
use serde::Deserialize;

use crate::providers::{
    classify_status, download_pdf_url, retry_after_seconds, ProviderClient, ProviderError,
};
use crate::utils::HttpClient;

const SPRINGER_API_BASE: &str = "https://api.springernature.com";

/// Springer Nature OA provider.
#[derive(Debug, Clone)]
pub struct SpringerClient {
    client: HttpClient,
    api_key: Option<String>,
    base_url: String,
}

impl SpringerClient {
    pub fn new(client: HttpClient, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: SPRINGER_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for SpringerClient {
    fn id(&self) -> &str {
        "springer"
    }

    fn name(&self) -> &str {
        "Springer"
    }

    fn credentialed(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        let api_key = self.api_key.as_deref().ok_or(ProviderError::NoCredential)?;

        let url = format!(
            "{}/openaccess/json?q=doi:\"{}\"&api_key={}",
            self.base_url,
            urlencoding::encode(doi),
            urlencoding::encode(api_key)
        );
        tracing::debug!(%doi, "springer: looking up OA record");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "Springer"));
        }

        let payload: SpringerResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Springer: bad JSON: {}", e)))?;

        let record = payload
            .records
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("Springer: no OA record for {}", doi)))?;

        let pdf_url = record
            .url
            .iter()
            .find(|u| u.format.as_deref() == Some("pdf"))
            .or_else(|| record.url.first())
            .map(|u| u.value.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("Springer: no PDF link for {}", doi)))?;

        download_pdf_url(&self.client, &pdf_url, "Springer").await
    }
}

/// Springer OA API response
#[derive(Debug, Deserialize)]
struct SpringerResponse {
    #[serde(default)]
    records: Vec<SpringerRecord>,
}

#[derive(Debug, Deserialize)]
struct SpringerRecord {
    #[serde(default)]
    url: Vec<SpringerUrl>,
}

#[derive(Debug, Deserialize)]
struct SpringerUrl {
    format: Option<String>,
    value: String,
}
