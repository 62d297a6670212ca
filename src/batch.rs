//! The download orchestrator: per-DOI pipeline and the batch loop around it.
//!
//! For each DOI: validate, consult the checkpoint, run the resolution chain,
//! lay out the output directory, scrape supplementary PDFs, record the
//! outcome, and update the running summary. DOIs are processed one at a
//! time in input order; strict provider pacing makes sequential execution
//! the point, not a limitation.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::Config;
use crate::models::{DoiRecord, DownloadRecord, JobSummary, MalformedDoi, Publisher};
use crate::providers::ProviderRegistry;
use crate::resolve::ResolutionChain;
use crate::supplements::SupplementScraper;
use crate::throttle::RateLimiter;
use crate::utils::HttpClient;

/// Batch-level failures. Provider-level failures never abort a batch; an
/// unwritable checkpoint or output directory does.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options controlling one batch invocation.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Root directory for article folders (PDF + SI) and the checkpoint.
    pub output_dir: PathBuf,

    /// Identity of the input list; names the checkpoint file.
    pub input_stem: String,

    /// Re-download even for a checkpointed success.
    pub overwrite: bool,

    /// Skip DOIs whose last checkpoint entry is a failure instead of
    /// re-attempting them.
    pub skip_failed: bool,

    /// Report the routing plan without network or checkpoint I/O.
    pub dry_run: bool,

    /// Window size for sliced batches; `None` processes the whole list.
    pub batch_size: Option<usize>,

    /// Zero-based window index used with `batch_size`.
    pub batch_index: usize,

    /// Cap on successful downloads attributed to one provider in this run.
    pub max_per_publisher: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads/pdfs"),
            input_stem: "dois".to_string(),
            overwrite: false,
            skip_failed: false,
            dry_run: false,
            batch_size: None,
            batch_index: 0,
            max_per_publisher: None,
        }
    }
}

/// Drives a batch of DOIs end-to-end.
pub struct BatchRunner {
    chain: ResolutionChain,
    scraper: SupplementScraper,
    options: BatchOptions,
    /// Cooperative interrupt: checked between DOIs, never mid-DOI, so the
    /// checkpoint stays consistent for everything already completed.
    shutdown: Option<Arc<AtomicBool>>,
}

impl BatchRunner {
    /// Build a runner with the six standard providers wired from config.
    pub fn new(config: &Config, options: BatchOptions, delay_floor: Option<f64>) -> Self {
        let registry = ProviderRegistry::new(config);
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone(), delay_floor));
        let chain = ResolutionChain::new(registry, limiter);
        let scraper = SupplementScraper::new(HttpClient::new(), config.downloads.max_si_links);
        Self {
            chain,
            scraper,
            options,
            shutdown: None,
        }
    }

    /// Build a runner from pre-assembled parts (tests inject mocks here).
    pub fn with_parts(
        chain: ResolutionChain,
        scraper: SupplementScraper,
        options: BatchOptions,
    ) -> Self {
        Self {
            chain,
            scraper,
            options,
            shutdown: None,
        }
    }

    /// Install a flag that stops the loop before the next DOI when set.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Run the batch over a raw DOI list and return the aggregate summary.
    pub async fn run(&mut self, raw_dois: &[String]) -> Result<JobSummary, BatchError> {
        let entries = normalize_input(raw_dois);
        let window = slice_window(&entries, self.options.batch_size, self.options.batch_index);
        tracing::info!(
            total = entries.len(),
            window = window.len(),
            batch_index = self.options.batch_index,
            "starting batch"
        );

        if self.options.dry_run {
            self.log_plan(window);
            return Ok(JobSummary::default());
        }

        std::fs::create_dir_all(&self.options.output_dir)?;
        let mut checkpoint =
            CheckpointStore::for_input(&self.options.output_dir, &self.options.input_stem)?;

        let mut summary = JobSummary::default();
        let mut success_counts: HashMap<String, usize> = HashMap::new();

        let progress = ProgressBar::new(window.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .expect("valid progress template"),
        );

        for entry in window {
            if let Some(flag) = &self.shutdown {
                if flag.load(Ordering::SeqCst) {
                    tracing::warn!("interrupt received, stopping before the next DOI");
                    break;
                }
            }

            match entry {
                Err(malformed) => {
                    tracing::warn!(input = %malformed.0, "malformed DOI, never attempted");
                    let record =
                        DownloadRecord::failure(&malformed.0, format!("{}", malformed));
                    summary
                        .failures
                        .insert(record.doi.clone(), malformed.to_string());
                    checkpoint.record(record)?;
                }
                Ok(record) => {
                    self.process_doi(record, &mut checkpoint, &mut summary, &mut success_counts)
                        .await?;
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        log_summary(&summary);
        Ok(summary)
    }

    async fn process_doi(
        &mut self,
        record: &DoiRecord,
        checkpoint: &mut CheckpointStore,
        summary: &mut JobSummary,
        success_counts: &mut HashMap<String, usize>,
    ) -> Result<(), BatchError> {
        let doi = record.doi.as_str();

        if !self.options.overwrite {
            if checkpoint.is_done(doi) {
                tracing::debug!(%doi, "already checkpointed as success, skipping");
                summary.skipped_resume += 1;
                if let Some(prior) = checkpoint.get(doi) {
                    if let Some(path) = &prior.path {
                        summary.successes.insert(doi.to_string(), path.clone());
                    }
                }
                return Ok(());
            }
            if self.options.skip_failed {
                if let Some(prior) = checkpoint.get(doi) {
                    if !prior.is_success() {
                        tracing::debug!(%doi, "previously failed and retries disabled, skipping");
                        summary.failures.insert(
                            doi.to_string(),
                            prior.error.clone().unwrap_or_else(|| "unknown".to_string()),
                        );
                        return Ok(());
                    }
                }
            }
        }

        let capped: HashSet<String> = match self.options.max_per_publisher {
            Some(cap) => success_counts
                .iter()
                .filter(|(_, count)| **count >= cap)
                .map(|(id, _)| id.clone())
                .collect(),
            None => HashSet::new(),
        };

        match self.chain.resolve(record, &capped).await {
            Ok(resolved) => {
                for attempt in &resolved.attempts {
                    if attempt_consumed_request(attempt.outcome) {
                        summary.record_attempt(&attempt.provider);
                    }
                }

                let slug = record.slug();
                let article_dir = self.options.output_dir.join(&slug);
                std::fs::create_dir_all(&article_dir)?;
                let pdf_path = article_dir.join(format!("{}.pdf", slug));
                std::fs::write(&pdf_path, &resolved.pdf)?;
                tracing::info!(%doi, provider = %resolved.provider, path = %pdf_path.display(), "saved PDF");

                let si_files = self.scraper.fetch_supplements(doi, &article_dir).await;
                if si_files.is_empty() {
                    summary.si_not_found += 1;
                }

                summary.record_success(&resolved.provider);
                *success_counts.entry(resolved.provider.clone()).or_default() += 1;
                summary.successes.insert(doi.to_string(), article_dir.clone());
                checkpoint.record(DownloadRecord::success(
                    doi,
                    &resolved.provider,
                    article_dir,
                    si_files.len(),
                ))?;
            }
            Err(exhausted) => {
                for attempt in &exhausted.attempts {
                    if attempt_consumed_request(attempt.outcome) {
                        summary.record_attempt(&attempt.provider);
                    }
                }
                let reason = format!("chain exhausted: {}", exhausted.describe());
                tracing::warn!(%doi, %reason, "no provider could serve this DOI");
                summary.failures.insert(doi.to_string(), reason.clone());
                checkpoint.record(DownloadRecord::failure(doi, reason))?;
            }
        }
        Ok(())
    }

    fn log_plan(&self, window: &[Result<DoiRecord, MalformedInput>]) {
        let mut by_publisher: HashMap<&str, usize> = HashMap::new();
        let mut malformed = 0usize;
        for entry in window {
            match entry {
                Ok(record) => {
                    let key = record
                        .publisher
                        .map(publisher_label)
                        .unwrap_or("open-access only");
                    *by_publisher.entry(key).or_default() += 1;
                }
                Err(_) => malformed += 1,
            }
        }

        let mut plan: Vec<String> = by_publisher
            .iter()
            .map(|(publisher, count)| format!("{}={}", publisher, count))
            .collect();
        plan.sort();
        tracing::info!(
            providers = ?self.chain.registry().credentialed_ids(),
            plan = %plan.join(", "),
            malformed,
            "dry run: routing plan (no downloads attempted)"
        );
    }
}

fn publisher_label(publisher: Publisher) -> &'static str {
    match publisher {
        Publisher::Wiley => "wiley",
        Publisher::Elsevier => "elsevier",
        Publisher::Springer => "springer",
    }
}

/// Outcomes that correspond to an actual provider request.
fn attempt_consumed_request(outcome: crate::models::AttemptOutcome) -> bool {
    use crate::models::AttemptOutcome::*;
    !matches!(outcome, SkippedNoCredential | SkippedCapped | SkippedDisabled)
}

/// Raw input that failed DOI validation; kept so the failure report can
/// name it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed DOI: {0}")]
pub struct MalformedInput(pub String);

/// Normalize and de-duplicate a raw DOI list, preserving input order.
///
/// Malformed entries are kept (as errors) so they surface in the failure
/// report instead of vanishing.
fn normalize_input(raw_dois: &[String]) -> Vec<Result<DoiRecord, MalformedInput>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for raw in raw_dois {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match DoiRecord::parse(trimmed) {
            Ok(record) => {
                if seen.insert(record.doi.clone()) {
                    entries.push(Ok(record));
                }
            }
            Err(MalformedDoi(input)) => {
                if seen.insert(input.clone()) {
                    entries.push(Err(MalformedInput(input)));
                }
            }
        }
    }
    entries
}

/// Select the `[index*size, (index+1)*size)` window of the input list.
/// Slicing happens before any checkpoint filtering.
fn slice_window<T>(entries: &[T], batch_size: Option<usize>, batch_index: usize) -> &[T] {
    match batch_size {
        None => entries,
        Some(0) => &[],
        Some(size) => {
            let start = batch_index.saturating_mul(size).min(entries.len());
            let end = start.saturating_add(size).min(entries.len());
            &entries[start..end]
        }
    }
}

fn log_summary(summary: &JobSummary) {
    if summary.providers.is_empty() && summary.total_processed() == 0 {
        tracing::info!("no downloads were attempted");
        return;
    }

    for (provider, stats) in &summary.providers {
        let rate = if stats.attempted > 0 {
            stats.succeeded as f64 / stats.attempted as f64 * 100.0
        } else {
            0.0
        };
        tracing::info!(
            provider,
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            "provider summary: {:.1}% of attempts succeeded",
            rate
        );
    }
    tracing::info!(
        successes = summary.successes.len(),
        failures = summary.failures.len(),
        skipped = summary.skipped_resume,
        si_not_found = summary.si_not_found,
        "batch summary: {:.1}% overall success rate",
        summary.success_rate() * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_duplicates_and_keeps_malformed() {
        let raw = vec![
            "10.1002/x".to_string(),
            "https://doi.org/10.1002/x".to_string(),
            "not a doi".to_string(),
            "# comment".to_string(),
            "".to_string(),
            "10.1016/y".to_string(),
        ];
        let entries = normalize_input(&raw);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].as_ref().unwrap().doi, "10.1002/x");
        assert!(entries[1].is_err());
        assert_eq!(entries[2].as_ref().unwrap().doi, "10.1016/y");
    }

    #[test]
    fn window_slicing_is_exact() {
        let entries: Vec<usize> = (0..1000).collect();
        let window = slice_window(&entries, Some(500), 1);
        assert_eq!(window.len(), 500);
        assert_eq!(window.first(), Some(&500));
        assert_eq!(window.last(), Some(&999));

        assert_eq!(slice_window(&entries, Some(500), 2).len(), 0);
        assert_eq!(slice_window(&entries, None, 7).len(), 1000);
        assert_eq!(slice_window(&entries, Some(300), 3).len(), 100);
    }
}
