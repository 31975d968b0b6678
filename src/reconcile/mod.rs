//! Reconciliation of document-extracted metadata with provider metadata.
//!
//! Metadata pulled out of an uploaded document is noisy; provider metadata
//! for the same paper is authoritative for a fixed set of fields. [`merge`]
//! applies that rule, [`enhance`] finds the provider record to merge with and
//! [`resolve_pdf_url`] looks for a freely retrievable copy. References that
//! only carry a title, authors and year get a DOI from [`discover_doi`].

mod discovery;

pub use discovery::{
    attach_pdf_urls, discover_doi, discover_dois, first_author_surname, match_score,
    DiscoveredPaper, PaperReference, PdfLookup,
};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::{Author, CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag, SearchFilters};
use crate::search::{LookupOutcome, SearchService};
use crate::standardize::{self, StandardizeError};
use crate::utils::{extract_doi, validate_doi};

/// Page size for the title-based fallback search
const TITLE_SEARCH_SIZE: usize = 5;

/// Metadata as produced by the upload extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl DocumentMetadata {
    /// Read extractor output leniently
    ///
    /// Authors may be a list or a single delimited string, the year a number
    /// or a string, and the DOI any text containing one.
    pub fn from_value(value: &Value) -> Result<Self, StandardizeError> {
        if !value.is_object() {
            return Err(StandardizeError::malformed(
                &ProviderTag::Document,
                "document metadata is not a JSON object",
            ));
        }

        let authors = match value.get("authors") {
            Some(raw) if !raw.is_null() => standardize::parse_authors(raw)
                .into_iter()
                .filter(|a| !a.is_placeholder())
                .map(|a| a.name)
                .collect(),
            _ => Vec::new(),
        };

        let year = standardize::text(value.get("year")).and_then(|y| y.parse().ok());

        Ok(Self {
            title: standardize::text(value.get("title")),
            authors,
            year,
            journal: standardize::first_text(value.get("journal")),
            doi: standardize::text(value.get("doi"))
                .and_then(|d| extract_doi(&d).or_else(|| validate_doi(&d).ok())),
            abstract_text: standardize::text(value.get("abstract")),
        })
    }

    /// Canonical form with the same defaults as provider records
    pub fn into_paper(self) -> CanonicalPaper {
        PaperBuilder::new(self.title.unwrap_or_default(), ProviderTag::Document)
            .doi(self.doi)
            .authors(self.authors.into_iter().map(Author::new).collect())
            .year(self.year)
            .journal(self.journal)
            .abstract_text(self.abstract_text)
            .build()
    }
}

fn present(text: &Option<String>) -> bool {
    text.as_deref().is_some_and(|t| !t.trim().is_empty())
}

/// Overwrite `base` with `api` when `api` is present, logging real conflicts
fn overwrite<T: PartialEq + std::fmt::Debug + Clone>(
    field: &str,
    base: &mut T,
    base_present: bool,
    api: &T,
    api_present: bool,
) {
    if !api_present {
        return;
    }
    if base_present && base != api {
        debug!(
            field,
            document = ?base,
            provider = ?api,
            "Reconciliation conflict, provider value wins"
        );
    }
    *base = api.clone();
}

/// Merge provider metadata into document metadata
///
/// The provider wins for title, DOI, authors, journal, publication date,
/// abstract, volume, issue, publisher, URL, open-access URL and open-access
/// flag whenever its value is present. Placeholders and `false` never count as
/// present. Every other field keeps the document's value.
pub fn merge(document: CanonicalPaper, api: &CanonicalPaper) -> CanonicalPaper {
    let mut merged = document;

    let base_title = !merged.has_placeholder_title();
    overwrite(
        "title",
        &mut merged.title,
        base_title,
        &api.title,
        !api.has_placeholder_title() && !api.title.trim().is_empty(),
    );

    let base_doi = present(&merged.doi);
    overwrite("doi", &mut merged.doi, base_doi, &api.doi, present(&api.doi));

    let base_authors = !merged.has_placeholder_authors();
    overwrite(
        "authors",
        &mut merged.authors,
        base_authors,
        &api.authors,
        !api.authors.is_empty() && !api.has_placeholder_authors(),
    );

    let base_journal = present(&merged.journal);
    overwrite("journal", &mut merged.journal, base_journal, &api.journal, present(&api.journal));

    let base_date = merged.publication_date.is_some();
    overwrite(
        "publication_date",
        &mut merged.publication_date,
        base_date,
        &api.publication_date,
        api.publication_date.is_some(),
    );

    let base_abstract = present(&merged.r#abstract);
    overwrite(
        "abstract",
        &mut merged.r#abstract,
        base_abstract,
        &api.r#abstract,
        present(&api.r#abstract),
    );

    let base_volume = present(&merged.volume);
    overwrite("volume", &mut merged.volume, base_volume, &api.volume, present(&api.volume));

    let base_issue = present(&merged.issue);
    overwrite("issue", &mut merged.issue, base_issue, &api.issue, present(&api.issue));

    let base_publisher = present(&merged.publisher);
    overwrite(
        "publisher",
        &mut merged.publisher,
        base_publisher,
        &api.publisher,
        present(&api.publisher),
    );

    let base_url = present(&merged.url);
    overwrite("url", &mut merged.url, base_url, &api.url, present(&api.url));

    let base_oa_url = present(&merged.open_access_url);
    overwrite(
        "open_access_url",
        &mut merged.open_access_url,
        base_oa_url,
        &api.open_access_url,
        present(&api.open_access_url),
    );

    let base_oa = merged.is_open_access;
    overwrite(
        "is_open_access",
        &mut merged.is_open_access,
        base_oa,
        &api.is_open_access,
        api.is_open_access,
    );

    if let Some(date) = api.publication_date {
        merged.year = Some(date.year());
    }

    merged
}

/// Enrich document metadata with a provider record for the same paper
///
/// Looks the DOI up through the provider chain when there is one, otherwise
/// searches OpenAlex by title (narrowed by first author and year) and takes the
/// top hit. Any miss or failure returns the document unchanged.
pub async fn enhance(service: &SearchService, document: DocumentMetadata) -> CanonicalPaper {
    let year = document.year;
    let base = document.into_paper();

    if let Some(doi) = base.doi.clone() {
        info!("Enhancing metadata using DOI {}", doi);
        return match service.lookup_by_doi(&doi).await {
            LookupOutcome::Found(api) => merge(base, &api),
            LookupOutcome::NotFound => {
                warn!("DOI {} not found at any provider, keeping document metadata", doi);
                base
            }
        };
    }

    if base.has_placeholder_title() {
        debug!("Document has neither DOI nor title, nothing to enhance");
        return base;
    }

    info!("Searching OpenAlex by title: {}", base.title);
    let query = ProviderQuery::new(base.title.clone())
        .page_size(TITLE_SEARCH_SIZE)
        .filters(SearchFilters {
            year_from: year,
            year_to: year,
            author: base.first_author().map(str::to_string),
            ..SearchFilters::default()
        });

    match service.search_provider("openalex", query).await {
        Ok(papers) => match papers.into_iter().next() {
            Some(api) => merge(base, &api),
            None => {
                warn!("No OpenAlex match for title '{}'", base.title);
                base
            }
        },
        Err(e) => {
            warn!("Title search failed, keeping document metadata: {}", e);
            base
        }
    }
}

/// Find a freely retrievable URL for a DOI
///
/// OpenAlex is asked first and its OA URL used when the work is open access;
/// otherwise Unpaywall's best open-access location is used.
pub async fn resolve_pdf_url(service: &SearchService, doi: &str) -> Option<String> {
    match service.lookup_at("openalex", doi).await {
        Ok(work) if work.is_open_access && present(&work.open_access_url) => {
            return work.open_access_url;
        }
        Ok(_) => debug!("OpenAlex has no open-access copy of {}", doi),
        Err(e) => debug!("OpenAlex lookup of {} failed: {}", doi, e),
    }

    match service.lookup_at("unpaywall", doi).await {
        Ok(record) => record.open_access_url.filter(|u| !u.trim().is_empty()),
        Err(e) => {
            debug!("Unpaywall lookup of {} failed: {}", doi, e);
            None
        }
    }
}
