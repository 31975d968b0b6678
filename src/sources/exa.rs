//! Exa web discovery provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::models::{Author, CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, StandardizeError};
use crate::utils::HttpClient;

const EXA_API_BASE: &str = "https://api.exa.ai";

const MAX_RESULTS: usize = 100;

/// Exa provider
///
/// Neural web search restricted to the "research paper" category. Search only,
/// and every request needs an API key.
#[derive(Debug, Clone)]
pub struct ExaSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    retry_base: Duration,
}

impl ExaSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(settings.request_timeout(), settings.requests_per_second)?,
            base_url: settings.base_url_or(EXA_API_BASE),
            api_key: settings.api_key().map(str::to_string),
            retry_base: settings.retry_base(),
        })
    }

    fn request_body(query: &ProviderQuery) -> ExaSearchRequest {
        ExaSearchRequest {
            query: query.query.clone(),
            num_results: query.page_size.clamp(1, MAX_RESULTS),
            category: "research paper",
            start_published_date: query
                .filters
                .year_from
                .map(|y| format!("{}-01-01T00:00:00.000Z", y)),
            end_published_date: query
                .filters
                .year_to
                .map(|y| format!("{}-12-31T23:59:59.999Z", y)),
        }
    }
}

#[async_trait]
impl Source for ExaSource {
    fn id(&self) -> &str {
        "exa"
    }

    fn name(&self) -> &str {
        "Exa"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::Exa
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_page_size(&self) -> usize {
        MAX_RESULTS
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::MissingCredential("exa api_key".to_string()))?;

        let body = Self::request_body(query);
        tracing::debug!("Exa search body: {:?}", body);

        let data: ExaSearchResponse = self
            .client
            .send_json(
                self.client
                    .post(&format!("{}/search", self.base_url))
                    .header("x-api-key", key)
                    .json(&body),
            )
            .await?;

        let total = data.results.len();
        let records = data
            .results
            .into_iter()
            .map(|result| RawRecord::new(ProviderTag::Exa, result))
            .collect();

        Ok(RawPage::new(records, total))
    }
}

/// Standardize one Exa search result
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let result: ExaResult = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::Exa, e))?;

    let url = standardize::text(result.url.as_ref());

    // Exa gives a single comma-separated author string
    let authors = match standardize::text(result.author.as_ref()) {
        Some(author) => author
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(Author::new)
            .collect(),
        None => Vec::new(),
    };

    Ok(PaperBuilder::new(
        standardize::text(result.title.as_ref()).unwrap_or_default(),
        ProviderTag::Exa,
    )
    .doi(url.as_deref().and_then(crate::utils::extract_doi))
    .authors(authors)
    .publication_date(result.published_date.as_ref().and_then(standardize::parse_date))
    .url(url)
    .build())
}

// ===== Exa API Types =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaSearchRequest {
    query: String,
    num_results: usize,
    category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_published_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExaSearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    title: Option<Value>,
    url: Option<Value>,
    published_date: Option<Value>,
    author: Option<Value>,
}
