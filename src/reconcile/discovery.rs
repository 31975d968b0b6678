//! DOI discovery for references that only carry a title, authors and a year.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{CanonicalPaper, ProviderQuery, SearchFilters};
use crate::search::SearchService;
use crate::standardize;

/// Candidates fetched from OpenAlex per reference
const CANDIDATES: usize = 3;

/// A bibliography entry as listed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperReference {
    pub title: String,
    /// Free-text author list, e.g. "Smith, J. and Jones, K." or "Smith et al."
    pub authors: String,
    pub year: Option<i32>,
}

impl PaperReference {
    pub fn new(title: impl Into<String>, authors: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            title: title.into(),
            authors: authors.into(),
            year,
        }
    }

    /// Read one entry leniently; the year may be a number or a string
    pub fn from_value(value: &Value) -> Self {
        Self {
            title: standardize::text(value.get("title")).unwrap_or_default(),
            authors: standardize::text(value.get("authors")).unwrap_or_default(),
            year: standardize::text(value.get("year")).and_then(|y| y.trim().parse().ok()),
        }
    }

    fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.authors.trim().is_empty() && self.year.is_some()
    }
}

/// Whether an open-access copy was found for a discovered DOI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "url", rename_all = "snake_case")]
pub enum PdfLookup {
    Found(String),
    NotFound,
    NoDoi,
}

/// A reference together with what discovery found for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPaper {
    #[serde(flatten)]
    pub reference: PaperReference,
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfLookup>,
}

fn et_al_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)\s+et\s+al\.?").ok())
        .as_ref()
}

/// Last name of the first author in a free-text author list
///
/// "et al." is dropped, the list is cut at the first comma or " and ", and
/// the last word of what remains is taken.
pub fn first_author_surname(authors: &str) -> Option<String> {
    let cleaned = match et_al_pattern() {
        Some(re) => re.replace_all(authors, "").into_owned(),
        None => authors.to_string(),
    };
    let cleaned = cleaned.trim().trim_matches('.');

    let first = cleaned.split(',').next().unwrap_or_default();
    let first = first.split(" and ").next().unwrap_or_default();
    first
        .split_whitespace()
        .last()
        .map(|word| word.trim_matches('.').to_string())
        .filter(|word| !word.is_empty())
}

/// How well a candidate matches the reference, `None` when it has no DOI
///
/// Every candidate starts at 1. An exact title (ignoring case) adds 3, a title
/// containing or contained in the reference title adds 2, and an author whose
/// name contains or is contained in `author` adds 1.
pub fn match_score(candidate: &CanonicalPaper, title: &str, author: Option<&str>) -> Option<u32> {
    candidate.doi.as_ref()?;

    let mut score = 1;
    let wanted = title.trim().to_lowercase();
    let found = candidate.title.trim().to_lowercase();
    if !candidate.has_placeholder_title() && !found.is_empty() {
        if found == wanted {
            score += 3;
        } else if found.contains(&wanted) || wanted.contains(&found) {
            score += 2;
        }
    }

    if let Some(author) = author.map(str::to_lowercase).filter(|a| !a.is_empty()) {
        let matched = candidate
            .authors
            .iter()
            .filter(|a| !a.is_placeholder())
            .map(|a| a.name.to_lowercase())
            .any(|name| name.contains(&author) || author.contains(&name));
        if matched {
            score += 1;
        }
    }

    Some(score)
}

/// Find the DOI of a paper from its title, first author and year
///
/// OpenAlex is searched by title, narrowed by year and author surname, and the
/// best-scoring candidate that carries a DOI wins; earlier candidates win ties.
pub async fn discover_doi(
    service: &SearchService,
    title: &str,
    author: Option<&str>,
    year: Option<i32>,
) -> Option<String> {
    if title.trim().is_empty() {
        return None;
    }
    let surname = author.and_then(|a| {
        if a.split_whitespace().count() > 1 {
            first_author_surname(a)
        } else {
            Some(a.trim().to_string()).filter(|a| !a.is_empty())
        }
    });

    let query = ProviderQuery::new(title)
        .page_size(CANDIDATES)
        .filters(SearchFilters {
            year_from: year,
            year_to: year,
            author: surname.clone(),
            ..SearchFilters::default()
        });

    let candidates = match service.search_provider("openalex", query).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("DOI discovery for '{}' failed: {}", title, e);
            return None;
        }
    };

    let mut best: Option<(u32, CanonicalPaper)> = None;
    for candidate in candidates {
        let Some(score) = match_score(&candidate, title, surname.as_deref()) else {
            continue;
        };
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    match best {
        Some((score, paper)) => {
            info!("Found DOI for '{}' with match score {}", title, score);
            paper.doi
        }
        None => {
            warn!(
                "No DOI found for '{}' by {} ({:?})",
                title,
                surname.as_deref().unwrap_or("unknown author"),
                year
            );
            None
        }
    }
}

/// Discover DOIs for a list of references, in order
///
/// References missing a title, authors or year are passed through without a
/// lookup. Requests go out one at a time; the provider's rate limiter paces them.
pub async fn discover_dois(
    service: &SearchService,
    references: Vec<PaperReference>,
) -> Vec<DiscoveredPaper> {
    let mut results = Vec::with_capacity(references.len());
    for reference in references {
        let doi = if reference.is_complete() {
            let surname = first_author_surname(&reference.authors);
            discover_doi(service, &reference.title, surname.as_deref(), reference.year).await
        } else {
            debug!("Skipping incomplete reference '{}'", reference.title);
            None
        };
        results.push(DiscoveredPaper {
            reference,
            doi,
            pdf: None,
        });
    }
    results
}

/// Fill in `pdf` for every discovered paper
pub async fn attach_pdf_urls(service: &SearchService, papers: &mut [DiscoveredPaper]) {
    for paper in papers.iter_mut() {
        paper.pdf = Some(match &paper.doi {
            Some(doi) => match super::resolve_pdf_url(service, doi).await {
                Some(url) => PdfLookup::Found(url),
                None => PdfLookup::NotFound,
            },
            None => PdfLookup::NoDoi,
        });
    }
}
