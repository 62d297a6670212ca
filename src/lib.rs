//! # doi-harvest
//!
//! Bulk DOI-to-PDF resolution with publisher TDM APIs and open-access
//! fallbacks.
//!
//! ## Architecture
//!
//! - [`models`]: DOI parsing, attempt outcomes, checkpoint rows, summaries
//! - [`providers`]: Provider clients with an extensible trait-based registry
//! - [`resolve`]: The ordered provider fallback chain
//! - [`throttle`]: Per-provider strict request pacing
//! - [`checkpoint`]: Durable JSONL progress state for resumable runs
//! - [`supplements`]: Supplementary-material scraping from DOI landing pages
//! - [`batch`]: The per-DOI pipeline and batch orchestration
//! - [`config`]: Environment-derived credentials and settings

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod models;
pub mod providers;
pub mod resolve;
pub mod supplements;
pub mod throttle;
pub mod utils;

// Re-export commonly used types
pub use batch::{BatchOptions, BatchRunner};
pub use models::DoiRecord;
pub use providers::{ProviderClient, ProviderRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
