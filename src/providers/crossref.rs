//! Crossref client.
//!
//! Uses the Crossref REST API for DOI metadata lookup, then follows any
//! full-text `link` entry typed `application/pdf`. A polite-pool mailto
//! (`CROSSREF_MAILTO`) is required; it is sent in the User-Agent as Crossref
//! asks.

use async_trait::async_trait;
use serde::Deserialize;

use crate::providers::{
    classify_status, download_pdf_url, retry_after_seconds, ProviderClient, ProviderError,
};
use crate::utils::HttpClient;

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// Crossref aggregator provider.
#[derive(Debug, Clone)]
pub struct CrossrefClient {
    client: HttpClient,
    mailto: Option<String>,
    base_url: String,
}

impl CrossrefClient {
    pub fn new(mailto: Option<String>) -> Self {
        let client = match &mailto {
            Some(mailto) => HttpClient::with_user_agent(&format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                mailto
            )),
            None => HttpClient::new(),
        };
        Self {
            client,
            mailto,
            base_url: CROSSREF_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for CrossrefClient {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "Crossref"
    }

    fn credentialed(&self) -> bool {
        self.mailto.is_some()
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        if self.mailto.is_none() {
            return Err(ProviderError::NoCredential);
        }

        let url = format!("{}/works/{}", self.base_url, urlencoding::encode(doi));
        tracing::debug!(%doi, "crossref: looking up work");

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), "Crossref"));
        }

        let payload: CrossrefResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("Crossref: bad JSON: {}", e)))?;

        let links = payload.message.link.unwrap_or_default();
        let pdf_link = links
            .iter()
            .find(|l| {
                l.content_type.as_deref() == Some("application/pdf")
                    && l.intended_application.as_deref() != Some("similarity-checking")
            })
            .or_else(|| links.iter().find(|l| l.url.to_lowercase().ends_with(".pdf")))
            .map(|l| l.url.clone())
            .ok_or_else(|| {
                ProviderError::NotFound(format!("Crossref: no full-text PDF link for {}", doi))
            })?;

        download_pdf_url(&self.client, &pdf_link, "Crossref").await
    }
}

/// Crossref works response (the fields we need)
#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefWork,
}

#[derive(Debug, Deserialize)]
struct CrossrefWork {
    link: Option<Vec<CrossrefLink>>,
}

#[derive(Debug, Deserialize)]
struct CrossrefLink {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
    #[serde(rename = "intended-application")]
    intended_application: Option<String>,
}
