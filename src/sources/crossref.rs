//! Crossref provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::models::{CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag, SortBy};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, StandardizeError};
use crate::utils::HttpClient;

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// Crossref caps `rows` at 1000
const MAX_ROWS: usize = 1000;

/// Crossref provider
///
/// Uses the Crossref REST API for bibliographic search and DOI metadata.
#[derive(Debug, Clone)]
pub struct CrossrefSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
    retry_base: Duration,
}

impl CrossrefSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, SourceError> {
        let email = settings.email().map(str::to_string);
        let user_agent = match &email {
            Some(email) => format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                email
            ),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        Ok(Self {
            client: HttpClient::with_user_agent(
                &user_agent,
                settings.request_timeout(),
                settings.requests_per_second,
            )?,
            base_url: settings.base_url_or(CROSSREF_API_BASE),
            email,
            retry_base: settings.retry_base(),
        })
    }

    /// Native query parameters for a generic provider query
    fn search_params(&self, query: &ProviderQuery) -> Vec<(&'static str, String)> {
        let rows = query.page_size.clamp(1, MAX_ROWS);
        let mut params = vec![
            ("query", query.query.clone()),
            ("rows", rows.to_string()),
            ("offset", ((query.page.max(1) - 1) * rows).to_string()),
        ];

        let mut filters = Vec::new();
        if let Some(from) = query.filters.year_from {
            filters.push(format!("from-pub-date:{}", from));
        }
        if let Some(to) = query.filters.year_to {
            filters.push(format!("until-pub-date:{}", to));
        }
        if !filters.is_empty() {
            params.push(("filter", filters.join(",")));
        }

        if let Some(journal) = &query.filters.journal {
            params.push(("query.container-title", journal.clone()));
        }
        if let Some(author) = &query.filters.author {
            params.push(("query.author", author.clone()));
        }

        let sort = match query.sort {
            SortBy::Date => Some("published"),
            SortBy::Cited => Some("is-referenced-by-count"),
            SortBy::Relevance => Some("relevance"),
            SortBy::Title => None,
        };
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
            params.push(("order", "desc".to_string()));
        }

        if let Some(email) = &self.email {
            params.push(("mailto", email.clone()));
        }

        params
    }
}

#[async_trait]
impl Source for CrossrefSource {
    fn id(&self) -> &str {
        "crossref"
    }

    fn name(&self) -> &str {
        "Crossref"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::Crossref
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn max_page_size(&self) -> usize {
        MAX_ROWS
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        let url = format!("{}/works", self.base_url);
        let params = self.search_params(query);
        tracing::debug!("Crossref search params: {:?}", params);

        let data: CrossrefEnvelope<CrossrefWorks> = self
            .client
            .send_json(self.client.get(&url).query(&params))
            .await?;

        let records = data
            .message
            .items
            .into_iter()
            .map(|item| RawRecord::new(ProviderTag::Crossref, item))
            .collect();

        Ok(RawPage::new(records, data.message.total_results))
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let url = format!("{}/works/{}", self.base_url, urlencoding::encode(doi));
        let mut request = self.client.get(&url);
        if let Some(email) = &self.email {
            request = request.query(&[("mailto", email)]);
        }

        let data: CrossrefEnvelope<Value> = self.client.send_json(request).await?;
        if !data.message.is_object() {
            return Err(SourceError::NotFound(doi.to_string()));
        }

        Ok(RawRecord::new(ProviderTag::Crossref, data.message))
    }
}

/// Standardize one Crossref work item
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let item: CrossrefItem = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::Crossref, e))?;

    let title = standardize::first_text(item.title.as_ref()).unwrap_or_default();

    let date = [
        &item.published_print,
        &item.published_online,
        &item.issued,
        &item.created,
    ]
    .into_iter()
    .flatten()
    .find_map(standardize::parse_date);

    let abstract_text = item.r#abstract.as_deref().and_then(standardize::strip_markup);

    Ok(PaperBuilder::new(title, ProviderTag::Crossref)
        .doi(item.doi.as_deref().and_then(crate::utils::normalize_doi))
        .authors(standardize::parse_authors(&item.author))
        .publication_date(date)
        .journal(standardize::first_text(item.container_title.as_ref()))
        .volume(standardize::text(item.volume.as_ref()))
        .issue(standardize::text(item.issue.as_ref()))
        .pages(standardize::text(item.page.as_ref()))
        .publisher(standardize::text(item.publisher.as_ref()))
        .url(standardize::text(item.url.as_ref()))
        .keywords(standardize::text_list(item.subject.as_ref()))
        .citation_count(standardize::count(item.is_referenced_by_count.as_ref()))
        .references_count(standardize::count(item.references_count.as_ref()))
        .abstract_text(abstract_text)
        .build())
}

// ===== Crossref API Types =====

#[derive(Debug, Deserialize)]
struct CrossrefEnvelope<T> {
    message: T,
}

#[derive(Debug, Deserialize)]
struct CrossrefWorks {
    #[serde(rename = "total-results", default)]
    total_results: usize,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    title: Option<Value>,
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    author: Value,
    #[serde(rename = "published-print")]
    published_print: Option<Value>,
    #[serde(rename = "published-online")]
    published_online: Option<Value>,
    issued: Option<Value>,
    created: Option<Value>,
    #[serde(rename = "container-title")]
    container_title: Option<Value>,
    volume: Option<Value>,
    issue: Option<Value>,
    page: Option<Value>,
    publisher: Option<Value>,
    #[serde(rename = "URL")]
    url: Option<Value>,
    subject: Option<Value>,
    #[serde(rename = "is-referenced-by-count")]
    is_referenced_by_count: Option<Value>,
    #[serde(rename = "references-count")]
    references_count: Option<Value>,
    r#abstract: Option<String>,
}
