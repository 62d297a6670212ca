//! Registry for provider clients and per-DOI candidate ordering.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::models::DoiRecord;
use crate::providers::{
    CrossrefClient, ElsevierClient, OpenAlexClient, ProviderClient, SpringerClient, UnpaywallClient,
    WileyClient,
};
use crate::utils::HttpClient;

/// Open-access aggregators, appended in this order to every DOI's candidate
/// list regardless of inferred publisher.
pub const OA_TAIL: &[&str] = &["openalex", "crossref", "unpaywall"];

/// Registry of all available provider clients.
///
/// Providers without a credential stay registered: the resolution chain
/// needs to see them to record `skipped-no-credential` attempts.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    /// Create a registry with the six standard providers wired from config.
    pub fn new(config: &Config) -> Self {
        let http = HttpClient::new();
        let creds = &config.credentials;

        let mut registry = Self::empty();
        registry.register(Arc::new(WileyClient::new(
            http.clone(),
            creds.wiley_token.clone(),
        )));
        registry.register(Arc::new(ElsevierClient::new(
            http.clone(),
            creds.elsevier_api_key.clone(),
        )));
        registry.register(Arc::new(SpringerClient::new(
            http.clone(),
            creds.springer_api_key.clone(),
        )));
        registry.register(Arc::new(OpenAlexClient::new(
            http.clone(),
            creds.openalex_mailto.clone(),
        )));
        registry.register(Arc::new(CrossrefClient::new(creds.crossref_mailto.clone())));
        registry.register(Arc::new(UnpaywallClient::new(
            http,
            creds.unpaywall_email.clone(),
        )));
        registry
    }

    /// Create an empty registry (tests register mocks into it).
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider, replacing any existing one with the same id.
    pub fn register(&mut self, provider: Arc<dyn ProviderClient>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Get a provider by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn ProviderClient>> {
        self.providers.get(id)
    }

    /// Check if a provider exists.
    pub fn has(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ids of providers whose credential is present.
    pub fn credentialed_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .providers
            .values()
            .filter(|p| p.credentialed())
            .map(|p| p.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Ordered candidate list for one DOI: the inferred native publisher
    /// first (when registered), then the fixed OA tail. Unrecognized
    /// prefixes skip straight to the tail.
    pub fn candidates_for(&self, record: &DoiRecord) -> Vec<Arc<dyn ProviderClient>> {
        let mut candidates = Vec::with_capacity(1 + OA_TAIL.len());

        if let Some(publisher) = record.publisher {
            if let Some(native) = self.providers.get(publisher.provider_id()) {
                candidates.push(Arc::clone(native));
            }
        }

        for id in OA_TAIL {
            if candidates.iter().any(|c: &Arc<dyn ProviderClient>| c.id() == *id) {
                continue;
            }
            if let Some(provider) = self.providers.get(*id) {
                candidates.push(Arc::clone(provider));
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;

    fn registry_with(ids: &[&str]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::empty();
        for id in ids {
            registry.register(Arc::new(MockProvider::new(id)));
        }
        registry
    }

    #[test]
    fn standard_registry_has_six_providers() {
        let registry = ProviderRegistry::new(&Config::default());
        assert_eq!(registry.len(), 6);
        for id in ["wiley", "elsevier", "springer", "openalex", "crossref", "unpaywall"] {
            assert!(registry.has(id), "missing {}", id);
        }
    }

    #[test]
    fn wiley_doi_gets_native_client_first() {
        let registry = registry_with(&["wiley", "elsevier", "openalex", "crossref", "unpaywall"]);
        let record = DoiRecord::parse("10.1002/anie.202100001").unwrap();
        let order: Vec<String> = registry
            .candidates_for(&record)
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(order, ["wiley", "openalex", "crossref", "unpaywall"]);
    }

    #[test]
    fn unrecognized_prefix_goes_straight_to_oa_tail() {
        let registry = registry_with(&["wiley", "openalex", "crossref", "unpaywall"]);
        let record = DoiRecord::parse("10.1021/jacs.0c01234").unwrap();
        let order: Vec<String> = registry
            .candidates_for(&record)
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(order, ["openalex", "crossref", "unpaywall"]);
    }
}
