//! Provider clients: one thin `fetch(doi) -> PDF bytes` wrapper per source.
//!
//! This module defines the [`ProviderClient`] trait that all providers
//! implement. Each provider is a configuration plus a single capability
//! (`fetch_pdf`) with tagged-variant failures; the resolution chain selects
//! and orders providers through the [`ProviderRegistry`].
//!
//! Providers fall into two groups:
//!
//! - **Publisher TDM APIs** (Wiley, Elsevier, Springer): require a credential
//!   and serve their own catalog only.
//! - **Open-access aggregators** (OpenAlex, Crossref, Unpaywall): can serve
//!   any DOI that has an OA copy and form the fixed fallback tail.

mod crossref;
mod elsevier;
mod openalex;
mod registry;
mod springer;
mod unpaywall;
mod wiley;

pub mod mock;

pub use crossref::CrossrefClient;
pub use elsevier::ElsevierClient;
pub use mock::MockProvider;
pub use openalex::OpenAlexClient;
pub use registry::ProviderRegistry;
pub use springer::SpringerClient;
pub use unpaywall::UnpaywallClient;
pub use wiley::WileyClient;

use crate::utils::HttpClient;
use async_trait::async_trait;

/// The ProviderClient trait defines the contract every source wrapper
/// satisfies toward the resolution chain: given a normalized DOI, return the
/// PDF bytes or a typed failure.
///
/// Implementations must not retry internally; retry-across-providers is the
/// chain's fallback strategy.
#[async_trait]
pub trait ProviderClient: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this provider (e.g. "wiley", "crossref").
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Whether the credential this provider requires is present.
    ///
    /// The chain records `skipped-no-credential` for providers returning
    /// false, without issuing a network call or consuming a rate-limit slot.
    fn credentialed(&self) -> bool {
        true
    }

    /// Fetch the full-text PDF for a normalized DOI.
    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Typed failures a provider can return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Required credential is absent; the provider was never called.
    #[error("credential not configured")]
    NoCredential,

    /// The provider does not have this DOI (or has no OA copy of it).
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider signalled a rate limit (429).
    #[error("rate limited")]
    RateLimited {
        /// Seconds suggested by a Retry-After header, when present.
        retry_after: Option<u64>,
    },

    /// Network-level or 5xx failure; the chain advances past it.
    #[error("transient error: {0}")]
    Transient(String),

    /// Unrecoverable provider failure (e.g. rejected credential); the chain
    /// disables the provider for the remainder of the batch.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Transient(format!("network: {}", err))
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

/// Map an HTTP error status to the provider failure taxonomy.
///
/// 404 means the provider cannot serve the DOI; 401/403 means the credential
/// is broken for the whole batch; 429 waits; 5xx advances the chain.
pub(crate) fn classify_status(status: reqwest::StatusCode, context: &str) -> ProviderError {
    match status.as_u16() {
        404 => ProviderError::NotFound(context.to_string()),
        401 | 403 => ProviderError::Fatal(format!("{}: credential rejected ({})", context, status)),
        429 => ProviderError::RateLimited { retry_after: None },
        s if status.is_server_error() => {
            ProviderError::Transient(format!("{}: server error ({})", context, s))
        }
        _ => ProviderError::Transient(format!("{}: unexpected status {}", context, status)),
    }
}

/// Parse a Retry-After header into whole seconds, if present and numeric.
pub(crate) fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Reject payloads that are not actually PDFs.
///
/// Aggregators frequently advertise a PDF URL that resolves to an HTML
/// interstitial; treating those as not-found lets the chain fall through to
/// the next provider instead of saving garbage.
pub(crate) fn ensure_pdf(bytes: Vec<u8>, context: &str) -> Result<Vec<u8>, ProviderError> {
    if bytes.starts_with(b"%PDF") {
        Ok(bytes)
    } else {
        Err(ProviderError::NotFound(format!(
            "{}: response body is not a PDF",
            context
        )))
    }
}

/// Shared second-hop download used by the aggregator clients: GET a resolved
/// PDF URL and validate the payload.
pub(crate) async fn download_pdf_url(
    client: &HttpClient,
    url: &str,
    context: &str,
) -> Result<Vec<u8>, ProviderError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/pdf")
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after_seconds(&response);
        return Err(ProviderError::RateLimited { retry_after });
    }
    if !response.status().is_success() {
        return Err(classify_status(response.status(), context));
    }

    let bytes = response.bytes().await?.to_vec();
    ensure_pdf(bytes, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::NOT_FOUND, "x"),
            ProviderError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::UNAUTHORIZED, "x"),
            ProviderError::Fatal(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "x"),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_GATEWAY, "x"),
            ProviderError::Transient(_)
        ));
    }

    #[test]
    fn pdf_magic_check() {
        assert!(ensure_pdf(b"%PDF-1.7 rest".to_vec(), "x").is_ok());
        assert!(matches!(
            ensure_pdf(b"<html>paywall</html>".to_vec(), "x"),
            Err(ProviderError::NotFound(_))
        ));
    }
}
