//! DOI normalization, validation and extraction.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// DOI validation errors
#[derive(Error, Debug, PartialEq)]
pub enum DoiError {
    #[error("Invalid DOI format: {0}")]
    InvalidDoi(String),
}

const RESOLVER_PREFIXES: [&str; 6] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Canonical form of a DOI: trimmed, lower-cased, without resolver prefixes
///
/// Returns `None` when nothing is left after stripping.
pub fn normalize_doi(doi: &str) -> Option<String> {
    let mut doi = doi.trim().to_lowercase();

    for prefix in RESOLVER_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim().to_string();
        }
    }

    if doi.is_empty() {
        None
    } else {
        Some(doi)
    }
}

/// Validate and normalize a DOI
///
/// DOIs have the format "10.xxxx/xxxxxx" where xxxx is a registrant code
/// and xxxxxx is an item ID.
pub fn validate_doi(doi: &str) -> Result<String, DoiError> {
    let doi =
        normalize_doi(doi).ok_or_else(|| DoiError::InvalidDoi("empty DOI".to_string()))?;

    if !doi.starts_with("10.") {
        return Err(DoiError::InvalidDoi("DOI must start with '10.'".to_string()));
    }

    if !doi.contains('/') {
        return Err(DoiError::InvalidDoi("DOI must contain a slash".to_string()));
    }

    if doi.contains("..") {
        return Err(DoiError::InvalidDoi("path traversal detected".to_string()));
    }

    Ok(doi)
}

fn doi_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)10\.\d{4,9}/[^\s\x22<>]+").ok())
        .as_ref()
}

/// Pull the first DOI out of free text (e.g. a PDF header line)
///
/// Trailing punctuation picked up from the surrounding sentence is dropped.
pub fn extract_doi(text: &str) -> Option<String> {
    let found = doi_pattern()?.find(text)?;
    let doi = found
        .as_str()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '}' | '\''));

    validate_doi(doi).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_prefixes() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1038/Nature12345").as_deref(),
            Some("10.1038/nature12345")
        );
        assert_eq!(
            normalize_doi("http://dx.doi.org/10.1/ABC").as_deref(),
            Some("10.1/abc")
        );
        assert_eq!(normalize_doi(" doi:10.1/x ").as_deref(), Some("10.1/x"));
        assert_eq!(normalize_doi("   "), None);
        assert_eq!(normalize_doi("doi:"), None);
    }

    #[test]
    fn test_validate_doi_valid() {
        assert!(validate_doi("10.1234/abc123").is_ok());
        assert_eq!(
            validate_doi("DOI:10.1234/ABC123").unwrap(),
            "10.1234/abc123"
        );
        assert_eq!(
            validate_doi("https://doi.org/10.1234/abc123").unwrap(),
            "10.1234/abc123"
        );
    }

    #[test]
    fn test_validate_doi_invalid() {
        assert!(validate_doi("").is_err());
        assert!(validate_doi("10.1234").is_err());
        assert!(validate_doi("9.1234/abc").is_err());
        assert!(validate_doi("10.1234/../abc").is_err());
    }

    #[test]
    fn test_extract_doi_from_text() {
        assert_eq!(
            extract_doi("Available at https://doi.org/10.1016/j.cell.2020.01.001.").as_deref(),
            Some("10.1016/j.cell.2020.01.001")
        );
        assert_eq!(
            extract_doi("(DOI: 10.1093/NAR/gkz1001), received 2019").as_deref(),
            Some("10.1093/nar/gkz1001")
        );
        assert_eq!(extract_doi("no identifier here"), None);
    }
}
