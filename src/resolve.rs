//! The resolution chain: ordered provider fallback for one DOI.
//!
//! Given a normalized DOI, the chain walks the candidate providers in order
//! (native publisher first, then the open-access tail) and returns the first
//! PDF any of them produces. Failures advance the chain; a rate limit waits
//! and retries the same provider; a fatal error disables the provider for
//! the remainder of the batch. Retry-across-providers is the fallback
//! strategy — no provider is retried for ordinary failures within one pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{AttemptOutcome, DoiRecord, ResolutionAttempt};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::throttle::RateLimiter;

/// Extra same-provider retries after a rate-limit response before the
/// outcome degrades to transient and the chain advances.
const RATE_LIMIT_RETRIES: u32 = 2;

/// Wait applied for a 429 without a Retry-After header.
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(61);

/// A PDF secured by some provider, with the full attempt trail.
#[derive(Debug)]
pub struct Resolved {
    pub provider: String,
    pub pdf: Vec<u8>,
    pub attempts: Vec<ResolutionAttempt>,
}

/// Terminal DOI failure: every candidate provider was tried or skipped.
///
/// Carries one attempt per candidate (never empty) so failure reports stay
/// actionable.
#[derive(Debug, thiserror::Error)]
#[error("chain exhausted after {} attempts", attempts.len())]
pub struct ChainExhausted {
    pub attempts: Vec<ResolutionAttempt>,
}

impl ChainExhausted {
    /// Compact "provider: outcome" trail for logs and checkpoint rows.
    pub fn describe(&self) -> String {
        self.attempts
            .iter()
            .map(|a| match &a.detail {
                Some(detail) => format!("{}: {}", a.provider, detail),
                None => format!("{}: {:?}", a.provider, a.outcome),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Walks providers for each DOI, tracking batch-scoped disabled providers.
#[derive(Debug)]
pub struct ResolutionChain {
    registry: ProviderRegistry,
    limiter: Arc<RateLimiter>,
    /// Providers disabled for the rest of the batch after a fatal error.
    disabled: HashSet<String>,
}

impl ResolutionChain {
    pub fn new(registry: ProviderRegistry, limiter: Arc<RateLimiter>) -> Self {
        Self {
            registry,
            limiter,
            disabled: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Providers currently disabled by fatal errors.
    pub fn disabled(&self) -> &HashSet<String> {
        &self.disabled
    }

    /// Resolve one DOI to a PDF, or exhaust the chain trying.
    ///
    /// `capped` holds ids of providers that reached their per-run success
    /// cap; they are skipped without a network call.
    pub async fn resolve(
        &mut self,
        record: &DoiRecord,
        capped: &HashSet<String>,
    ) -> Result<Resolved, ChainExhausted> {
        let mut attempts = Vec::new();

        for provider in self.registry.candidates_for(record) {
            let id = provider.id().to_string();

            if self.disabled.contains(&id) {
                tracing::debug!(doi = %record.doi, provider = %id, "provider disabled earlier, skipping");
                attempts.push(ResolutionAttempt::new(
                    &id,
                    AttemptOutcome::SkippedDisabled,
                    Some("disabled after fatal error".to_string()),
                    Duration::ZERO,
                ));
                continue;
            }

            if capped.contains(&id) {
                tracing::debug!(doi = %record.doi, provider = %id, "per-publisher cap reached, skipping");
                attempts.push(ResolutionAttempt::new(
                    &id,
                    AttemptOutcome::SkippedCapped,
                    Some("per-publisher cap reached".to_string()),
                    Duration::ZERO,
                ));
                continue;
            }

            // Skipping for a missing credential consumes no rate-limit slot.
            if !provider.credentialed() {
                tracing::debug!(doi = %record.doi, provider = %id, "no credential, skipping");
                attempts.push(ResolutionAttempt::new(
                    &id,
                    AttemptOutcome::SkippedNoCredential,
                    Some("credential not configured".to_string()),
                    Duration::ZERO,
                ));
                continue;
            }

            let mut rate_limit_budget = RATE_LIMIT_RETRIES;
            loop {
                self.limiter.acquire(&id).await;
                let started = Instant::now();
                let result = provider.fetch_pdf(&record.doi).await;
                let elapsed = started.elapsed();

                match result {
                    Ok(pdf) => {
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::Success,
                            None,
                            elapsed,
                        ));
                        tracing::info!(doi = %record.doi, provider = %id, "resolved PDF");
                        return Ok(Resolved {
                            provider: id,
                            pdf,
                            attempts,
                        });
                    }
                    Err(ProviderError::NoCredential) => {
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::SkippedNoCredential,
                            Some("credential not configured".to_string()),
                            elapsed,
                        ));
                        break;
                    }
                    Err(err @ ProviderError::NotFound(_)) => {
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::NotFound,
                            Some(err.to_string()),
                            elapsed,
                        ));
                        break;
                    }
                    Err(ProviderError::RateLimited { retry_after }) => {
                        if rate_limit_budget == 0 {
                            // Degrade to transient and let the tail try.
                            tracing::warn!(doi = %record.doi, provider = %id, "rate limit persists, advancing chain");
                            attempts.push(ResolutionAttempt::new(
                                &id,
                                AttemptOutcome::TransientError,
                                Some("rate limit persisted after retries".to_string()),
                                elapsed,
                            ));
                            break;
                        }
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::RateLimited,
                            Some("rate limited".to_string()),
                            elapsed,
                        ));
                        rate_limit_budget -= 1;
                        let wait = retry_after
                            .map(|secs| Duration::from_secs(secs + 1))
                            .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
                        tracing::warn!(
                            doi = %record.doi,
                            provider = %id,
                            wait_secs = wait.as_secs(),
                            "rate limited, waiting before retrying the same provider"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    Err(err @ ProviderError::Transient(_)) => {
                        tracing::warn!(doi = %record.doi, provider = %id, error = %err, "transient failure, advancing chain");
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::TransientError,
                            Some(err.to_string()),
                            elapsed,
                        ));
                        break;
                    }
                    Err(err @ ProviderError::Fatal(_)) => {
                        tracing::error!(doi = %record.doi, provider = %id, error = %err, "fatal provider error, disabling for this batch");
                        attempts.push(ResolutionAttempt::new(
                            &id,
                            AttemptOutcome::FatalError,
                            Some(err.to_string()),
                            elapsed,
                        ));
                        self.disabled.insert(id.clone());
                        break;
                    }
                }
            }
        }

        Err(ChainExhausted { attempts })
    }
}
