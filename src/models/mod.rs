//! Core data models for DOI resolution and batch downloads.

mod doi;
mod outcome;

pub use doi::{doi_slug, infer_publisher, normalize_doi, DoiRecord, MalformedDoi, Publisher};
pub use outcome::{
    AttemptOutcome, DownloadOutcome, DownloadRecord, JobSummary, ProviderStats, ResolutionAttempt,
};
