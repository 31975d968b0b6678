//! OpenAlex provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ProviderSettings;
use crate::models::{CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag, SortBy};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, path, StandardizeError};
use crate::utils::HttpClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// OpenAlex caps `per-page` at 200
const MAX_PER_PAGE: usize = 200;

/// Number of concepts kept as keywords
const MAX_KEYWORDS: usize = 5;

/// OpenAlex provider
///
/// Uses the OpenAlex works API. A contact email puts requests in the polite pool.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
    retry_base: Duration,
}

impl OpenAlexSource {
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
            base_url: settings.base_url_or(OPENALEX_API_BASE),
            email,
            retry_base: settings.retry_base(),
        })
    }

    /// Native query parameters for a generic provider query
    fn search_params(&self, query: &ProviderQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("search", query.query.clone()),
            ("per-page", query.page_size.clamp(1, MAX_PER_PAGE).to_string()),
            ("page", query.page.max(1).to_string()),
        ];

        let mut filters = Vec::new();
        if let Some(from) = query.filters.year_from {
            filters.push(format!("publication_year:>{}", from.saturating_sub(1)));
        }
        if let Some(to) = query.filters.year_to {
            filters.push(format!("publication_year:<{}", to.saturating_add(1)));
        }
        if let Some(journal) = &query.filters.journal {
            filters.push(format!(
                "primary_location.source.display_name.search:{}",
                filter_value(journal)
            ));
        }
        if let Some(author) = &query.filters.author {
            filters.push(format!("raw_author_name.search:{}", filter_value(author)));
        }
        if query.filters.open_access_only {
            filters.push("is_oa:true".to_string());
        }
        if !filters.is_empty() {
            params.push(("filter", filters.join(",")));
        }

        let sort = match query.sort {
            SortBy::Date => Some("publication_date:desc"),
            SortBy::Cited => Some("cited_by_count:desc"),
            SortBy::Title => Some("display_name:asc"),
            SortBy::Relevance => None,
        };
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
        }

        if let Some(email) = &self.email {
            params.push(("mailto", email.clone()));
        }

        params
    }
}

/// Commas separate filters, so they cannot appear inside a value
fn filter_value(value: &str) -> String {
    value.replace(',', " ")
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::OpenAlex
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn max_page_size(&self) -> usize {
        MAX_PER_PAGE
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        let url = format!("{}/works", self.base_url);
        let params = self.search_params(query);
        tracing::debug!("OpenAlex search params: {:?}", params);

        let data: WorksResponse = self
            .client
            .send_json(self.client.get(&url).query(&params))
            .await?;

        let records = data
            .results
            .into_iter()
            .map(|work| RawRecord::new(ProviderTag::OpenAlex, work))
            .collect();

        Ok(RawPage::new(records, data.meta.count))
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let url = format!("{}/works/https://doi.org/{}", self.base_url, doi);
        let mut request = self.client.get(&url);
        if let Some(email) = &self.email {
            request = request.query(&[("mailto", email)]);
        }

        let work: Value = self.client.send_json(request).await?;
        if !work.is_object() {
            return Err(SourceError::NotFound(doi.to_string()));
        }

        Ok(RawRecord::new(ProviderTag::OpenAlex, work))
    }
}

/// Standardize one OpenAlex work
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let work: OpenAlexWork = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::OpenAlex, e))?;

    let title = standardize::text(work.title.as_ref())
        .or_else(|| standardize::text(work.display_name.as_ref()))
        .unwrap_or_default();

    let authors = Value::Array(
        work.authorships
            .iter()
            .map(|a| {
                json!({
                    "name": path(a, &["author", "display_name"]),
                    "institutions": a.get("institutions"),
                })
            })
            .collect(),
    );

    let date = work
        .publication_date
        .as_ref()
        .and_then(standardize::parse_date)
        .or_else(|| work.publication_year.as_ref().and_then(standardize::parse_date));

    let location = work.primary_location.as_ref();
    let source = location.and_then(|l| l.get("source"));
    let landing_page = location.and_then(|l| standardize::text(l.get("landing_page_url")));
    let pdf_url = location.and_then(|l| standardize::text(l.get("pdf_url")));

    let oa_flag = work
        .open_access
        .as_ref()
        .and_then(|oa| oa.get("is_oa"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let oa_url = work
        .open_access
        .as_ref()
        .and_then(|oa| standardize::text(oa.get("oa_url")))
        .or_else(|| pdf_url.clone());
    let is_open_access = standardize::open_access(
        oa_flag,
        landing_page.as_deref(),
        oa_url.as_deref(),
    );

    let biblio = work.biblio.as_ref();
    let pages = match (
        biblio.and_then(|b| standardize::text(b.get("first_page"))),
        biblio.and_then(|b| standardize::text(b.get("last_page"))),
    ) {
        (Some(first), Some(last)) if first != last => Some(format!("{}-{}", first, last)),
        (Some(first), _) => Some(first),
        (None, last) => last,
    };

    let keywords = work
        .concepts
        .iter()
        .filter_map(|c| standardize::text(c.get("display_name")))
        .take(MAX_KEYWORDS)
        .collect();

    let references = work
        .referenced_works_count
        .as_ref()
        .map(|c| standardize::count(Some(c)))
        .unwrap_or(work.referenced_works.len() as u32);

    Ok(PaperBuilder::new(title, ProviderTag::OpenAlex)
        .doi(standardize::text(work.doi.as_ref()).and_then(|d| crate::utils::normalize_doi(&d)))
        .authors(standardize::parse_authors(&authors))
        .publication_date(date)
        .journal(source.and_then(|s| standardize::text(s.get("display_name"))))
        .publisher(source.and_then(|s| standardize::text(s.get("host_organization_name"))))
        .volume(biblio.and_then(|b| standardize::text(b.get("volume"))))
        .issue(biblio.and_then(|b| standardize::text(b.get("issue"))))
        .pages(pages)
        .url(landing_page.or_else(|| standardize::text(work.id.as_ref())))
        .keywords(keywords)
        .open_access(is_open_access, oa_url)
        .citation_count(standardize::count(work.cited_by_count.as_ref()))
        .references_count(references)
        .abstract_text(
            work.abstract_inverted_index
                .as_ref()
                .and_then(standardize::reconstruct_from_value),
        )
        .build())
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    meta: WorksMeta,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WorksMeta {
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    id: Option<Value>,
    doi: Option<Value>,
    title: Option<Value>,
    display_name: Option<Value>,
    #[serde(default)]
    authorships: Vec<Value>,
    publication_date: Option<Value>,
    publication_year: Option<Value>,
    primary_location: Option<Value>,
    biblio: Option<Value>,
    open_access: Option<Value>,
    cited_by_count: Option<Value>,
    #[serde(default)]
    referenced_works: Vec<Value>,
    referenced_works_count: Option<Value>,
    #[serde(default)]
    concepts: Vec<Value>,
    abstract_inverted_index: Option<Value>,
}
