//! Semantic Scholar provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::models::{CanonicalPaper, PaperBuilder, ProviderQuery, ProviderTag};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, StandardizeError};
use crate::utils::HttpClient;

const SEMANTIC_SCHOLAR_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Search endpoint caps `limit` at 100
const MAX_LIMIT: usize = 100;

const PAPER_FIELDS: &str = "paperId,title,abstract,year,publicationDate,authors,venue,journal,\
url,openAccessPdf,isOpenAccess,citationCount,referenceCount,externalIds,fieldsOfStudy";

/// Semantic Scholar provider
///
/// Works without a key at a low shared rate; an API key raises the limit.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    retry_base: Duration,
}

impl SemanticScholarSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(settings.request_timeout(), settings.requests_per_second)?,
            base_url: settings.base_url_or(SEMANTIC_SCHOLAR_API_BASE),
            api_key: settings.api_key().map(str::to_string),
            retry_base: settings.retry_base(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Native query parameters for a generic provider query
    fn search_params(&self, query: &ProviderQuery) -> Vec<(&'static str, String)> {
        let limit = query.page_size.clamp(1, MAX_LIMIT);
        let mut params = vec![
            ("query", query.query.clone()),
            ("limit", limit.to_string()),
            ("offset", ((query.page.max(1) - 1) * limit).to_string()),
            ("fields", PAPER_FIELDS.to_string()),
        ];

        if let Some(range) = year_range(query.filters.year_from, query.filters.year_to) {
            params.push(("year", range));
        }
        if let Some(venue) = &query.filters.journal {
            params.push(("venue", venue.clone()));
        }
        if query.filters.open_access_only {
            params.push(("openAccessPdf", String::new()));
        }

        params
    }
}

/// `F-T`, `F-` or `-T`
fn year_range(from: Option<i32>, to: Option<i32>) -> Option<String> {
    match (from, to) {
        (None, None) => None,
        (from, to) => Some(format!(
            "{}-{}",
            from.map(|y| y.to_string()).unwrap_or_default(),
            to.map(|y| y.to_string()).unwrap_or_default()
        )),
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic_scholar"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::SemanticScholar
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP
    }

    fn max_page_size(&self) -> usize {
        MAX_LIMIT
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let params = self.search_params(query);
        tracing::debug!("Semantic Scholar search params: {:?}", params);

        let data: SearchResponse = self
            .client
            .send_json(self.authorized(self.client.get(&url).query(&params)))
            .await?;

        let records = data
            .data
            .into_iter()
            .map(|paper| RawRecord::new(ProviderTag::SemanticScholar, paper))
            .collect();

        Ok(RawPage::new(records, data.total))
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let url = format!("{}/paper/DOI:{}", self.base_url, doi);
        let request = self.client.get(&url).query(&[("fields", PAPER_FIELDS)]);

        let paper: Value = self.client.send_json(self.authorized(request)).await?;
        if !paper.is_object() {
            return Err(SourceError::NotFound(doi.to_string()));
        }

        Ok(RawRecord::new(ProviderTag::SemanticScholar, paper))
    }
}

/// Standardize one Semantic Scholar paper
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let paper: S2Paper = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::SemanticScholar, e))?;

    let title = standardize::text(paper.title.as_ref()).unwrap_or_default();

    let doi = paper
        .external_ids
        .as_ref()
        .and_then(|ids| standardize::text(ids.get("DOI")))
        .and_then(|d| crate::utils::normalize_doi(&d));

    let date = paper
        .publication_date
        .as_ref()
        .and_then(standardize::parse_date)
        .or_else(|| paper.year.as_ref().and_then(standardize::parse_date));

    let journal_obj = paper.journal.as_ref();
    let journal = standardize::first_text(paper.venue.as_ref())
        .or_else(|| journal_obj.and_then(|j| standardize::text(j.get("name"))));

    let pdf_url = paper
        .open_access_pdf
        .as_ref()
        .and_then(|pdf| standardize::text(pdf.get("url")));
    let flag = paper
        .is_open_access
        .as_ref()
        .and_then(Value::as_bool)
        .unwrap_or(pdf_url.is_some());
    let url = standardize::text(paper.url.as_ref());
    let is_open_access = standardize::open_access(flag, url.as_deref(), pdf_url.as_deref());

    Ok(PaperBuilder::new(title, ProviderTag::SemanticScholar)
        .doi(doi)
        .authors(standardize::parse_authors(&paper.authors))
        .publication_date(date)
        .journal(journal)
        .volume(journal_obj.and_then(|j| standardize::text(j.get("volume"))))
        .pages(journal_obj.and_then(|j| standardize::text(j.get("pages"))))
        .url(url)
        .keywords(standardize::text_list(paper.fields_of_study.as_ref()))
        .open_access(is_open_access, pdf_url)
        .citation_count(standardize::count(paper.citation_count.as_ref()))
        .references_count(standardize::count(paper.reference_count.as_ref()))
        .abstract_text(standardize::text(paper.r#abstract.as_ref()))
        .build())
}

// ===== Semantic Scholar API Types =====

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<Value>,
    r#abstract: Option<Value>,
    year: Option<Value>,
    publication_date: Option<Value>,
    #[serde(default)]
    authors: Value,
    venue: Option<Value>,
    journal: Option<Value>,
    url: Option<Value>,
    open_access_pdf: Option<Value>,
    is_open_access: Option<Value>,
    citation_count: Option<Value>,
    reference_count: Option<Value>,
    external_ids: Option<Value>,
    fields_of_study: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchFilters;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_year_range() {
        assert_eq!(year_range(Some(2010), Some(2020)).as_deref(), Some("2010-2020"));
        assert_eq!(year_range(Some(2010), None).as_deref(), Some("2010-"));
        assert_eq!(year_range(None, Some(2020)).as_deref(), Some("-2020"));
        assert_eq!(year_range(None, None), None);
    }

    #[test]
    fn test_search_params_clamp_limit() {
        let source = SemanticScholarSource::new(&ProviderSettings::default()).unwrap();
        let query = ProviderQuery::new("graph neural networks")
            .page_size(300)
            .filters(SearchFilters {
                open_access_only: true,
                ..SearchFilters::default()
            });

        let params = source.search_params(&query);
        assert!(params.contains(&("limit", "100".to_string())));
        assert!(params.contains(&("openAccessPdf", String::new())));
        assert!(params.iter().all(|(k, _)| *k != "year"));
    }

    #[test]
    fn test_parse_record() {
        let paper = parse_record(&json!({
            "paperId": "649def34f8be52c8b66281af98ae884c09aef38b",
            "externalIds": {"DOI": "10.1145/3292500.3330701", "CorpusId": 1},
            "title": "Graph Neural Networks",
            "abstract": "We survey GNNs.",
            "year": 2019,
            "authors": [{"authorId": "1", "name": "Jie Zhou"}, {"authorId": "2", "name": "Ganqu Cui"}],
            "venue": "KDD",
            "url": "https://www.semanticscholar.org/paper/649def34",
            "openAccessPdf": {"url": "https://arxiv.org/pdf/1812.08434"},
            "citationCount": 4000,
            "referenceCount": 200,
            "fieldsOfStudy": ["Computer Science"]
        }))
        .unwrap();

        assert_eq!(paper.doi.as_deref(), Some("10.1145/3292500.3330701"));
        assert_eq!(paper.author_names(), vec!["Jie Zhou", "Ganqu Cui"]);
        assert_eq!(paper.publication_date, NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(paper.journal.as_deref(), Some("KDD"));
        assert!(paper.is_open_access);
        assert_eq!(
            paper.open_access_url.as_deref(),
            Some("https://arxiv.org/pdf/1812.08434")
        );
        assert_eq!(paper.citation_count, 4000);
        assert_eq!(paper.references_count, 200);
        assert_eq!(paper.keywords, vec!["Computer Science"]);
        assert_eq!(paper.r#abstract.as_deref(), Some("We survey GNNs."));
    }

    #[test]
    fn test_empty_venue_falls_back_to_journal_name() {
        let paper = parse_record(&json!({
            "title": "T",
            "venue": "",
            "journal": {"name": "Journal of X", "volume": "3", "pages": "1-9"},
            "openAccessPdf": null,
            "abstract": null
        }))
        .unwrap();

        assert_eq!(paper.journal.as_deref(), Some("Journal of X"));
        assert_eq!(paper.volume.as_deref(), Some("3"));
        assert!(!paper.is_open_access);
        assert_eq!(paper.r#abstract, None);
    }
}
