//! DOI normalization, validation, publisher inference, and output slugs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Publishers with a native TDM client.
///
/// DOIs whose prefix is not in the table below go straight to the
/// open-access fallback tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Publisher {
    Wiley,
    Elsevier,
    Springer,
}

impl Publisher {
    /// Provider id of this publisher's native client.
    pub fn provider_id(&self) -> &'static str {
        match self {
            Publisher::Wiley => "wiley",
            Publisher::Elsevier => "elsevier",
            Publisher::Springer => "springer",
        }
    }
}

const WILEY_PREFIXES: &[&str] = &["10.1002", "10.1111"];
// 10.1011 is rare but reserved by Elsevier
const ELSEVIER_PREFIXES: &[&str] = &["10.1016", "10.1011"];
const SPRINGER_PREFIXES: &[&str] = &["10.1007", "10.1038", "10.1186"];

fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^10\.\d{4,9}/[\x21-\x7e]+$").expect("valid DOI regex"))
}

/// A normalized DOI plus its inferred publisher.
///
/// Identity is the normalized DOI string: two differently-formatted inputs
/// referring to the same work collapse to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DoiRecord {
    pub doi: String,
    pub publisher: Option<Publisher>,
}

impl DoiRecord {
    /// Parse a raw DOI string, normalizing and validating it.
    ///
    /// Accepts bare DOIs, `doi:` prefixes, and `doi.org` / `dx.doi.org` URLs.
    pub fn parse(raw: &str) -> Result<Self, MalformedDoi> {
        let doi = normalize_doi(raw);
        if !doi_pattern().is_match(&doi) {
            return Err(MalformedDoi(raw.trim().to_string()));
        }
        let publisher = infer_publisher(&doi);
        Ok(Self { doi, publisher })
    }

    /// Filesystem-safe directory slug for this DOI.
    pub fn slug(&self) -> String {
        doi_slug(&self.doi)
    }
}

/// Input string that does not look like a `prefix/suffix` DOI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed DOI: {0}")]
pub struct MalformedDoi(pub String);

/// Lower-case a DOI and strip URL and `doi:` prefixes. The `/` separating
/// prefix from suffix is preserved.
pub fn normalize_doi(raw: &str) -> String {
    let mut s = raw.trim();
    let lowered = s.to_ascii_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        if lowered.starts_with(prefix) {
            s = &s[prefix.len()..];
            break;
        }
    }
    s.trim().to_ascii_lowercase()
}

/// Infer the native publisher from the DOI prefix table.
pub fn infer_publisher(doi: &str) -> Option<Publisher> {
    if WILEY_PREFIXES.iter().any(|p| doi.starts_with(p)) {
        Some(Publisher::Wiley)
    } else if ELSEVIER_PREFIXES.iter().any(|p| doi.starts_with(p)) {
        Some(Publisher::Elsevier)
    } else if SPRINGER_PREFIXES.iter().any(|p| doi.starts_with(p)) {
        Some(Publisher::Springer)
    } else {
        None
    }
}

/// Deterministic, collision-free, filesystem-safe transform of a DOI.
///
/// `/` maps to `_`; every other byte outside `[a-z0-9.-]` (including a
/// literal `_`) is percent-encoded, so an underscore in the output can only
/// have come from the prefix/suffix separator. Distinct DOIs always yield
/// distinct slugs.
pub fn doi_slug(doi: &str) -> String {
    let mut out = String::with_capacity(doi.len());
    for byte in doi.bytes() {
        match byte {
            b'/' => out.push('_'),
            b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => out.push(byte as char),
            other => out.push_str(&format!("%{:02x}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_url_forms() {
        for raw in [
            "10.1038/s41586-020-2649-2",
            "https://doi.org/10.1038/s41586-020-2649-2",
            "http://dx.doi.org/10.1038/s41586-020-2649-2",
            "doi:10.1038/s41586-020-2649-2",
            "  10.1038/S41586-020-2649-2  ",
        ] {
            let record = DoiRecord::parse(raw).unwrap();
            assert_eq!(record.doi, "10.1038/s41586-020-2649-2");
        }
    }

    #[test]
    fn rejects_malformed_input() {
        for raw in ["", "not-a-doi", "10.1038", "11.1038/suffix", "10.12/short-prefix"] {
            assert!(DoiRecord::parse(raw).is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn publisher_inference_follows_prefix_table() {
        assert_eq!(infer_publisher("10.1002/anie.202100001"), Some(Publisher::Wiley));
        assert_eq!(infer_publisher("10.1111/jpn.13456"), Some(Publisher::Wiley));
        assert_eq!(infer_publisher("10.1016/j.cell.2020.01.001"), Some(Publisher::Elsevier));
        assert_eq!(infer_publisher("10.1038/s41586-020-2649-2"), Some(Publisher::Springer));
        assert_eq!(infer_publisher("10.1186/s12859-020-3456-3"), Some(Publisher::Springer));
        assert_eq!(infer_publisher("10.1021/jacs.0c01234"), None);
    }

    #[test]
    fn slug_is_deterministic_and_filesystem_safe() {
        let record = DoiRecord::parse("10.1038/s41586-020-2649-2").unwrap();
        assert_eq!(record.slug(), "10.1038_s41586-020-2649-2");
        assert_eq!(record.slug(), doi_slug(&record.doi));
    }

    #[test]
    fn slug_is_injective_for_underscore_vs_slash() {
        // A literal underscore must not collide with the encoded separator.
        assert_ne!(doi_slug("10.1002/a_b"), doi_slug("10.1002/a/b"));
        assert_eq!(doi_slug("10.1002/a_b"), "10.1002_a%5fb");
    }

    #[test]
    fn slug_encodes_unsafe_characters() {
        assert_eq!(doi_slug("10.1002/(sici)1097"), "10.1002_%28sici%291097");
    }
}
