//! Supplementary-material discovery and download.
//!
//! After a main PDF is secured, the DOI's landing page (one page, no
//! crawling) is scanned for links that look like supplementary information.
//! Candidates get a lightweight content-type check first; only PDF payloads
//! are downloaded, so archives and datasets are never transferred. Every
//! failure here is non-fatal to the DOI's outcome.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::utils::HttpClient;

const DOI_RESOLVER_BASE: &str = "https://doi.org";

/// Keywords matched as case-insensitive substrings against link text,
/// labelling attributes, and the href.
const SUPPLEMENT_KEYWORDS: &[&str] = &[
    "supplement",
    "supporting",
    "appendix",
    "additional file",
    "extended data",
    "extra file",
    "dataset",
];

/// Anchor attributes that often carry the human-readable label.
const LABEL_ATTRS: &[&str] = &["title", "aria-label", "data-title", "data-label", "data-track-label"];

/// Discovers and downloads SI PDFs from DOI landing pages.
#[derive(Debug, Clone)]
pub struct SupplementScraper {
    client: HttpClient,
    doi_base: String,
    max_links: usize,
}

impl SupplementScraper {
    pub fn new(client: HttpClient, max_links: usize) -> Self {
        Self {
            client,
            doi_base: DOI_RESOLVER_BASE.to_string(),
            max_links,
        }
    }

    /// Override the DOI resolver base URL (used by tests against a local
    /// server).
    pub fn with_doi_base(mut self, base: impl Into<String>) -> Self {
        self.doi_base = base.into();
        self
    }

    /// Best-effort SI download for one DOI into `dest_dir`.
    ///
    /// Returns the saved paths; an empty list means nothing was found or the
    /// scrape failed, which is logged and never propagated.
    pub async fn fetch_supplements(&self, doi: &str, dest_dir: &Path) -> Vec<PathBuf> {
        let landing_url = format!("{}/{}", self.doi_base, doi);
        let response = match self
            .client
            .get(&landing_url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%doi, %err, "failed to load DOI landing page");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(%doi, status = %response.status(), "DOI landing page lookup failed");
            return Vec::new();
        }

        let base_url = response.url().clone();
        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(%doi, %err, "failed to read DOI landing page");
                return Vec::new();
            }
        };

        let candidates = extract_candidate_links(&html, &base_url);
        if candidates.is_empty() {
            tracing::info!(%doi, "no supplementary candidates detected");
            return Vec::new();
        }

        let mut saved = Vec::new();
        let mut used_names = HashSet::new();
        if let Err(err) = std::fs::create_dir_all(dest_dir) {
            tracing::warn!(%doi, %err, "cannot create SI output directory");
            return Vec::new();
        }

        for (index, candidate) in candidates.iter().take(self.max_links).enumerate() {
            match self
                .download_asset(candidate, base_url.as_str(), dest_dir, &mut used_names, index + 1)
                .await
            {
                Ok(Some(path)) => saved.push(path),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%doi, url = %candidate, %err, "failed to download supplementary asset");
                }
            }
        }
        saved
    }

    /// Download one candidate if (and only if) it resolves to a PDF payload.
    ///
    /// The content-type gate runs before any body bytes are read, so non-PDF
    /// targets cost a header exchange at most.
    async fn download_asset(
        &self,
        url: &str,
        referer: &str,
        dest_dir: &Path,
        used_names: &mut HashSet<String>,
        index: usize,
    ) -> Result<Option<PathBuf>, reqwest::Error> {
        let path_is_pdf = url_path_extension(url).as_deref() == Some("pdf");

        // HEAD first; some hosts reject it, in which case the GET below
        // still checks headers before touching the body.
        let mut head_says_pdf = None;
        if let Ok(head) = self.client.head(url).send().await {
            if head.status().is_success() {
                head_says_pdf = Some(is_pdf_content_type(content_type(&head)));
            }
        }
        if head_says_pdf == Some(false) && !path_is_pdf {
            tracing::debug!(%url, "ignoring non-PDF supplementary asset");
            return Ok(None);
        }

        let response = self
            .client
            .get(url)
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::ACCEPT, "application/pdf")
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(%url, status = %response.status(), "supplementary asset request failed");
            return Ok(None);
        }

        let ct = content_type(&response);
        if !is_pdf_content_type(ct.clone()) && !path_is_pdf {
            // Body is dropped unread.
            tracing::debug!(%url, content_type = ct.as_deref().unwrap_or("unknown"), "ignoring non-PDF supplementary asset");
            return Ok(None);
        }

        let disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let filename = select_filename(url, disposition.as_deref(), index, used_names);

        let bytes = response.bytes().await?;
        let destination = dest_dir.join(&filename);
        if let Err(err) = std::fs::write(&destination, &bytes) {
            tracing::warn!(path = %destination.display(), %err, "failed to write supplementary file");
            return Ok(None);
        }
        tracing::info!(path = %destination.display(), "saved supplementary file");
        Ok(Some(destination))
    }
}

/// Extract absolute candidate URLs from landing-page HTML, in document
/// order, de-duplicated.
fn extract_candidate_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").expect("valid selector");

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for anchor in document.select(&anchor_selector) {
        let href = match anchor.value().attr("href") {
            Some(href) => href.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') || href.to_lowercase().starts_with("mailto:") {
            continue;
        }

        let absolute = match base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => continue,
        };
        if seen.contains(&absolute) {
            continue;
        }

        let mut parts: Vec<String> = vec![anchor.text().collect::<Vec<_>>().join(" ")];
        for attr in LABEL_ATTRS {
            if let Some(value) = anchor.value().attr(attr) {
                parts.push(value.to_string());
            }
        }
        parts.push(href.to_string());
        let haystack = parts.join(" ").to_lowercase();

        if looks_like_supplement(&haystack, href) {
            seen.insert(absolute.clone());
            candidates.push(absolute);
        }
    }
    candidates
}

fn looks_like_supplement(haystack: &str, href: &str) -> bool {
    // "Article PDF" links without supplement wording are the main text.
    if haystack.contains("article") && haystack.contains("pdf") && !haystack.contains("supp") {
        return false;
    }

    if SUPPLEMENT_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return true;
    }

    // "si" only counts as a standalone token; as a substring it matches far
    // too much ("version", "basic", ...).
    static SI_TOKEN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let si = SI_TOKEN.get_or_init(|| Regex::new(r"(^|[^a-z0-9])si([^a-z0-9]|$)").expect("valid regex"));
    if si.is_match(haystack) {
        return true;
    }

    url_path_extension(href).as_deref() == Some("pdf")
}

fn url_path_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_lowercase())
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_lowercase())
}

fn is_pdf_content_type(ct: Option<String>) -> bool {
    ct.map(|ct| ct.contains("pdf")).unwrap_or(false)
}

/// Pick an output filename: Content-Disposition, else URL basename, else a
/// numbered fallback; always sanitized, `.pdf`-suffixed, and unique within
/// the destination directory.
fn select_filename(
    url: &str,
    content_disposition: Option<&str>,
    index: usize,
    used_names: &mut HashSet<String>,
) -> String {
    let mut filename = content_disposition
        .and_then(filename_from_content_disposition)
        .unwrap_or_default();

    if filename.is_empty() {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        filename = path.rsplit('/').next().unwrap_or("").to_string();
    }
    if filename.is_empty() {
        filename = format!("supplementary_{}", index);
    }

    filename = sanitize_filename(&filename);
    if !filename.to_lowercase().ends_with(".pdf") {
        let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(&filename);
        filename = format!("{}.pdf", stem);
    }

    // Disambiguate collisions with a numeric suffix.
    let mut candidate = filename.clone();
    let mut counter = 2;
    while used_names.contains(&candidate.to_lowercase()) {
        let stem = filename.strip_suffix(".pdf").unwrap_or(&filename);
        candidate = format!("{}_{}.pdf", stem, counter);
        counter += 1;
    }
    used_names.insert(candidate.to_lowercase());
    candidate
}

fn filename_from_content_disposition(header: &str) -> Option<String> {
    static UTF8_NAME: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static PLAIN_NAME: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

    let utf8 = UTF8_NAME.get_or_init(|| Regex::new(r"filename\*=UTF-8''([^;]+)").expect("valid regex"));
    if let Some(captures) = utf8.captures(header) {
        return Some(captures[1].trim().to_string());
    }

    let plain = PLAIN_NAME.get_or_init(|| Regex::new(r#"filename="?([^";]+)"?"#).expect("valid regex"));
    plain.captures(header).map(|c| c[1].trim().to_string())
}

fn sanitize_filename(candidate: &str) -> String {
    static UNSAFE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid regex"));
    let cleaned = unsafe_chars.replace_all(candidate, "_");
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "supplementary".to_string()
    } else {
        cleaned.to_string()
    }
}
