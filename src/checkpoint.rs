//! Durable, resumable record of DOI-level progress.
//!
//! The checkpoint is a JSONL file: one [`DownloadRecord`] per line, appended
//! after every DOI completes and fsynced before the call returns, so a crash
//! loses at most the in-flight DOI. Later lines win on load, which is what
//! makes `--overwrite` re-runs upsert naturally. The file location is a
//! deterministic function of the input list's identity, so re-running the
//! same list finds the same checkpoint.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::models::{DownloadRecord, JobSummary};

/// Errors from checkpoint persistence. These abort the batch: silently
/// losing progress state is worse than stopping.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Append-only, single-writer store of per-DOI outcomes.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: HashMap<String, DownloadRecord>,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint for a given input list identity.
    ///
    /// The file lands at `<output_root>/<input_stem>.checkpoint.jsonl`.
    pub fn for_input(output_root: &Path, input_stem: &str) -> Result<Self, CheckpointError> {
        let path = output_root.join(format!("{}.checkpoint.jsonl", input_stem));
        Self::open(path)
    }

    /// Open a checkpoint at an explicit path, loading prior state if any.
    pub fn open(path: PathBuf) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let state = Self::load(&path)?;
        if !state.is_empty() {
            tracing::info!(
                path = %path.display(),
                entries = state.len(),
                "loaded existing checkpoint"
            );
        }
        Ok(Self { path, state })
    }

    fn load(path: &Path) -> Result<HashMap<String, DownloadRecord>, CheckpointError> {
        let mut state = HashMap::new();
        if !path.exists() {
            return Ok(state);
        }

        let reader = BufReader::new(File::open(path)?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DownloadRecord>(&line) {
                // Later lines win.
                Ok(record) => {
                    state.insert(record.doi.clone(), record);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        %err,
                        "skipping unparsable checkpoint line"
                    );
                }
            }
        }
        Ok(state)
    }

    /// Upsert a DOI's outcome and durably flush before returning.
    pub fn record(&mut self, record: DownloadRecord) -> Result<(), CheckpointError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{}", line)?;
        file.sync_all()?;
        self.state.insert(record.doi.clone(), record);
        Ok(())
    }

    /// True only for a DOI whose last record is a success. Failures stay
    /// eligible for re-attempts on later runs.
    pub fn is_done(&self, doi: &str) -> bool {
        self.state.get(doi).map(|r| r.is_success()).unwrap_or(false)
    }

    /// Last known record for a DOI, if any.
    pub fn get(&self, doi: &str) -> Option<&DownloadRecord> {
        self.state.get(doi)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the summary projection from checkpoint content alone.
    ///
    /// Per-provider attempted counts are an in-run quantity and are not
    /// persisted; the rebuilt summary carries succeeded counts and the
    /// success/failure maps.
    pub fn summary(&self) -> JobSummary {
        let mut summary = JobSummary::default();
        for record in self.state.values() {
            if record.is_success() {
                if let (Some(provider), Some(path)) = (&record.provider, &record.path) {
                    summary.record_success(provider);
                    summary.successes.insert(record.doi.clone(), path.clone());
                }
                if record.si_files == 0 {
                    summary.si_not_found += 1;
                }
            } else {
                summary.failures.insert(
                    record.doi.clone(),
                    record.error.clone().unwrap_or_else(|| "unknown".to_string()),
                );
            }
        }
        summary
    }
}
