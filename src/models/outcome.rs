//! Outcome types for resolution attempts, checkpoint rows, and run summaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a single provider attempt within a resolution chain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Success,
    SkippedNoCredential,
    /// Provider reached its `--max-per-publisher` cap for this run.
    SkippedCapped,
    /// Provider was disabled earlier in the batch by a fatal error.
    SkippedDisabled,
    NotFound,
    RateLimited,
    TransientError,
    FatalError,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One provider attempt for one DOI. Attempts for a DOI are ordered; an
/// attempted DOI always carries at least one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    /// Error detail for non-success outcomes.
    pub detail: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Wall-clock time spent on the attempt (zero for skips).
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ResolutionAttempt {
    pub fn new(provider: &str, outcome: AttemptOutcome, detail: Option<String>, elapsed: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            outcome,
            detail,
            timestamp: chrono::Utc::now(),
            elapsed,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Terminal outcome of one DOI, as persisted in the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadOutcome {
    Success,
    Failure,
}

/// One checkpoint row: the last known result for a normalized DOI.
///
/// Serialized as a single JSON object per line so the checkpoint stays
/// human-diffable and appendable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub doi: String,
    pub outcome: DownloadOutcome,
    /// Winning provider id, when the outcome is success.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<String>,
    /// Directory holding the main PDF and any SI files.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<PathBuf>,
    /// Supplementary PDFs saved alongside the main PDF.
    #[serde(default)]
    pub si_files: usize,
    /// Failure reason, when the outcome is failure.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Unix seconds when the record was written.
    pub timestamp: u64,
}

impl DownloadRecord {
    pub fn success(doi: &str, provider: &str, path: PathBuf, si_files: usize) -> Self {
        Self {
            doi: doi.to_string(),
            outcome: DownloadOutcome::Success,
            provider: Some(provider.to_string()),
            path: Some(path),
            si_files,
            error: None,
            timestamp: unix_now(),
        }
    }

    pub fn failure(doi: &str, error: String) -> Self {
        Self {
            doi: doi.to_string(),
            outcome: DownloadOutcome::Failure,
            provider: None,
            path: None,
            si_files: 0,
            error: Some(error),
            timestamp: unix_now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DownloadOutcome::Success
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Attempt/success counters for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub attempted: usize,
    pub succeeded: usize,
}

/// Aggregate result of a batch run.
///
/// Derived state: the successes/failures maps are pure projections of the
/// checkpoint and can be rebuilt from it at any time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSummary {
    /// Per-provider counters, keyed by provider id (BTreeMap for stable output).
    pub providers: BTreeMap<String, ProviderStats>,
    /// DOI -> output directory for every successful DOI.
    pub successes: BTreeMap<String, PathBuf>,
    /// DOI -> last error for every failed DOI.
    pub failures: BTreeMap<String, String>,
    /// DOIs whose PDF succeeded but whose SI scrape found nothing.
    pub si_not_found: usize,
    /// DOIs skipped because the checkpoint already marked them successful.
    pub skipped_resume: usize,
}

impl JobSummary {
    pub fn record_attempt(&mut self, provider: &str) {
        self.providers.entry(provider.to_string()).or_default().attempted += 1;
    }

    pub fn record_success(&mut self, provider: &str) {
        self.providers.entry(provider.to_string()).or_default().succeeded += 1;
    }

    pub fn total_processed(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Overall success rate over processed DOIs, in [0, 1].
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            0.0
        } else {
            self.successes.len() as f64 / total as f64
        }
    }
}
