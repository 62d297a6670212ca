//! Mock provider for testing purposes.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::providers::{ProviderClient, ProviderError};

/// A mock provider that plays back scripted responses and counts calls.
///
/// With an empty script every fetch returns `NotFound`, so a default mock
/// behaves like a provider that cannot serve anything.
#[derive(Debug)]
pub struct MockProvider {
    id: String,
    credentialed: bool,
    script: Mutex<VecDeque<Result<Vec<u8>, ProviderError>>>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a credentialed mock with the given provider id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            credentialed: true,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock whose credential is absent.
    pub fn without_credential(id: &str) -> Self {
        Self {
            credentialed: false,
            ..Self::new(id)
        }
    }

    /// Queue the next response.
    pub fn respond_with(self, response: Result<Vec<u8>, ProviderError>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    /// Queue a successful PDF response.
    pub fn respond_pdf(self) -> Self {
        self.respond_with(Ok(b"%PDF-1.4 mock".to_vec()))
    }

    /// Number of fetch_pdf calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn credentialed(&self) -> bool {
        self.credentialed
    }

    async fn fetch_pdf(&self, doi: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(response) => response,
            None => Err(ProviderError::NotFound(format!("mock: {}", doi))),
        }
    }
}
