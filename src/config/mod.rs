//! Configuration management.
//!
//! Everything is environment-derived: credentials are read once at startup
//! and treated as opaque by the engine (only presence/absence matters for
//! routing).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Credentials for the provider APIs
    #[serde(default)]
    pub credentials: Credentials,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Rate limiting settings
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            downloads: DownloadConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

/// Credentials for the provider APIs.
///
/// A provider whose credential is absent stays registered but is skipped by
/// the resolution chain with a `skipped-no-credential` attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Wiley TDM bearer token
    #[serde(default)]
    pub wiley_token: Option<String>,

    /// Elsevier TDM API key
    #[serde(default)]
    pub elsevier_api_key: Option<String>,

    /// Springer Nature API key
    #[serde(default)]
    pub springer_api_key: Option<String>,

    /// Crossref polite-pool mailto (required for Crossref)
    #[serde(default)]
    pub crossref_mailto: Option<String>,

    /// Unpaywall contact email (falls back to the Crossref mailto)
    #[serde(default)]
    pub unpaywall_email: Option<String>,

    /// OpenAlex polite-pool mailto (optional)
    #[serde(default)]
    pub openalex_mailto: Option<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        let crossref_mailto = std::env::var("CROSSREF_MAILTO").ok();
        let unpaywall_email = std::env::var("UNPAYWALL_EMAIL")
            .ok()
            .or_else(|| crossref_mailto.clone());
        Self {
            wiley_token: std::env::var("WILEY_TDM_TOKEN").ok(),
            elsevier_api_key: std::env::var("ELSEVIER_API_KEY").ok(),
            springer_api_key: std::env::var("SPRINGER_API_KEY").ok(),
            crossref_mailto,
            unpaywall_email,
            openalex_mailto: std::env::var("OPENALEX_MAILTO").ok(),
        }
    }
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory for article folders (PDF + SI)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Cap on SI candidate links examined per DOI landing page
    #[serde(default = "default_max_si_links")]
    pub max_si_links: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_si_links: default_max_si_links(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads/pdfs")
}

fn default_max_si_links() -> usize {
    10
}

/// Minimum inter-request interval per provider, globally floored at 1 second
/// to respect the strictest publisher cap (1 PDF/sec).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per-provider minimum intervals, in seconds
    #[serde(default = "default_intervals")]
    pub intervals: BTreeMap<String, f64>,

    /// Interval used for providers not listed above, in seconds
    #[serde(default = "default_fallback_interval")]
    pub fallback_interval: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            intervals: default_intervals(),
            fallback_interval: default_fallback_interval(),
        }
    }
}

/// The global pacing floor: never issue requests to one provider less than
/// this far apart, whatever the configuration says.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

fn default_intervals() -> BTreeMap<String, f64> {
    [
        ("wiley", 1.5),
        ("elsevier", 1.5),
        ("springer", 1.5),
        ("openalex", 1.0),
        ("crossref", 2.0),
        ("unpaywall", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_fallback_interval() -> f64 {
    1.5
}

impl RateLimitConfig {
    /// Interval for a provider, after applying the global floor and an
    /// optional uniform floor from `--delay`.
    pub fn interval_for(&self, provider: &str, delay_floor: Option<f64>) -> Duration {
        let configured = self
            .intervals
            .get(provider)
            .copied()
            .unwrap_or(self.fallback_interval);
        let floored = configured
            .max(delay_floor.unwrap_or(0.0))
            .max(MIN_INTERVAL.as_secs_f64());
        Duration::from_secs_f64(floored)
    }
}
