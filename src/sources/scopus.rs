//! Elsevier Scopus provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::models::{Author, CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag, SortBy};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, StandardizeError};
use crate::utils::HttpClient;

const SCOPUS_API_BASE: &str = "https://api.elsevier.com";

/// Scopus search caps `count` at 25 for standard keys
const MAX_COUNT: usize = 25;

/// Scopus provider
///
/// Subscription index; every request needs an Elsevier API key.
#[derive(Debug, Clone)]
pub struct ScopusSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    retry_base: Duration,
}

impl ScopusSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(settings.request_timeout(), settings.requests_per_second)?,
            base_url: settings.base_url_or(SCOPUS_API_BASE),
            api_key: settings.api_key().map(str::to_string),
            retry_base: settings.retry_base(),
        })
    }

    fn api_key(&self) -> Result<&str, SourceError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| SourceError::MissingCredential("scopus api_key".to_string()))
    }

    async fn query_entries(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<(Vec<Value>, usize), SourceError> {
        let key = self.api_key()?;
        let url = format!("{}/content/search/scopus", self.base_url);

        let data: ScopusResponse = self
            .client
            .send_json(
                self.client
                    .get(&url)
                    .query(&params)
                    .header("X-ELS-APIKey", key)
                    .header("Accept", "application/json"),
            )
            .await?;

        let total = standardize::count(data.results.total_results.as_ref()) as usize;
        // An empty result set comes back as a single entry carrying an "error" key
        let entries = data
            .results
            .entry
            .into_iter()
            .filter(|e| e.get("error").is_none())
            .collect();

        Ok((entries, total))
    }
}

/// Scopus advanced-search expression for a generic provider query
fn build_query(query: &ProviderQuery) -> String {
    let mut clauses = vec![format!("TITLE-ABS-KEY({})", query.query)];

    if let Some(from) = query.filters.year_from {
        clauses.push(format!("PUBYEAR > {}", from.saturating_sub(1)));
    }
    if let Some(to) = query.filters.year_to {
        clauses.push(format!("PUBYEAR < {}", to.saturating_add(1)));
    }
    if let Some(author) = &query.filters.author {
        clauses.push(format!("AUTH({})", author));
    }
    if let Some(journal) = &query.filters.journal {
        clauses.push(format!("SRCTITLE({})", journal));
    }
    if query.filters.open_access_only {
        clauses.push("OPENACCESS(1)".to_string());
    }

    clauses.join(" AND ")
}

#[async_trait]
impl Source for ScopusSource {
    fn id(&self) -> &str {
        "scopus"
    }

    fn name(&self) -> &str {
        "Scopus"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::Scopus
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_page_size(&self) -> usize {
        MAX_COUNT
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        let count = query.page_size.clamp(1, MAX_COUNT);
        let mut params = vec![
            ("query", build_query(query)),
            ("count", count.to_string()),
            ("start", ((query.page.max(1) - 1) * count).to_string()),
        ];
        let sort = match query.sort {
            SortBy::Date => Some("-coverDate"),
            SortBy::Cited => Some("-citedby-count"),
            SortBy::Relevance => Some("relevancy"),
            SortBy::Title => None,
        };
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
        }
        tracing::debug!("Scopus search params: {:?}", params);

        let (entries, total) = self.query_entries(params).await?;
        let records = entries
            .into_iter()
            .map(|entry| RawRecord::new(ProviderTag::Scopus, entry))
            .collect();

        Ok(RawPage::new(records, total))
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let params = vec![("query", format!("DOI({})", doi)), ("count", "1".to_string())];

        let (entries, _) = self.query_entries(params).await?;
        entries
            .into_iter()
            .next()
            .map(|entry| RawRecord::new(ProviderTag::Scopus, entry))
            .ok_or_else(|| SourceError::NotFound(doi.to_string()))
    }
}

/// Standardize one Scopus search entry
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let entry: ScopusEntry = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::Scopus, e))?;

    let doi = standardize::text(entry.doi.as_ref()).and_then(|d| crate::utils::normalize_doi(&d));
    let url = doi
        .as_ref()
        .map(|d| format!("https://doi.org/{}", d))
        .or_else(|| standardize::text(entry.prism_url.as_ref()));

    let affiliations: Vec<String> = match &entry.affiliation {
        Value::Array(items) => items
            .iter()
            .filter_map(|a| standardize::text(a.get("affilname")))
            .collect(),
        _ => Vec::new(),
    };

    // Search results carry only the first author as dc:creator
    let authors = match standardize::text(entry.creator.as_ref()) {
        Some(creator) => vec![Author::with_affiliation(
            creator,
            affiliations.first().cloned(),
        )],
        None => affiliations
            .into_iter()
            .map(|aff| Author::with_affiliation(crate::models::UNKNOWN_AUTHOR, Some(aff)))
            .collect(),
    };

    let flag = match &entry.openaccess {
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        Some(Value::Bool(b)) => *b,
        _ => false,
    } || entry.openaccess_flag.as_ref().and_then(Value::as_bool).unwrap_or(false);

    Ok(
        PaperBuilder::new(
            standardize::text(entry.title.as_ref()).unwrap_or_default(),
            ProviderTag::Scopus,
        )
        .doi(doi)
        .authors(authors)
        .publication_date(entry.cover_date.as_ref().and_then(standardize::parse_date))
        .journal(standardize::first_text(entry.publication_name.as_ref()))
        .volume(standardize::text(entry.volume.as_ref()))
        .issue(standardize::text(entry.issue.as_ref()))
        .pages(standardize::text(entry.page_range.as_ref()))
        .publisher(standardize::text(entry.publisher.as_ref()))
        .open_access(standardize::open_access(flag, url.as_deref(), None), None)
        .url(url)
        .citation_count(standardize::count(entry.cited_by.as_ref()))
        .abstract_text(standardize::text(entry.description.as_ref()))
        .build(),
    )
}

// ===== Scopus API Types =====

#[derive(Debug, Deserialize)]
struct ScopusResponse {
    #[serde(rename = "search-results")]
    results: ScopusResults,
}

#[derive(Debug, Deserialize)]
struct ScopusResults {
    #[serde(rename = "opensearch:totalResults")]
    total_results: Option<Value>,
    #[serde(default)]
    entry: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ScopusEntry {
    #[serde(rename = "dc:title")]
    title: Option<Value>,
    #[serde(rename = "prism:doi")]
    doi: Option<Value>,
    #[serde(rename = "prism:url")]
    prism_url: Option<Value>,
    #[serde(rename = "dc:creator")]
    creator: Option<Value>,
    #[serde(rename = "prism:publicationName")]
    publication_name: Option<Value>,
    #[serde(rename = "prism:volume")]
    volume: Option<Value>,
    #[serde(rename = "prism:issueIdentifier")]
    issue: Option<Value>,
    #[serde(rename = "prism:pageRange")]
    page_range: Option<Value>,
    #[serde(rename = "prism:coverDate")]
    cover_date: Option<Value>,
    #[serde(rename = "dc:publisher")]
    publisher: Option<Value>,
    #[serde(rename = "dc:description")]
    description: Option<Value>,
    #[serde(rename = "citedby-count")]
    cited_by: Option<Value>,
    openaccess: Option<Value>,
    #[serde(rename = "openaccessFlag")]
    openaccess_flag: Option<Value>,
    #[serde(default)]
    affiliation: Value,
}
