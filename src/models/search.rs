//! Search request and response models.

use serde::{Deserialize, Serialize};

use crate::models::CanonicalPaper;

/// Sort field for aggregated search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
    Cited,
    Title,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Date => "date",
            SortBy::Cited => "cited",
            SortBy::Title => "title",
        }
    }
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Ok(SortBy::Relevance),
            "date" => Ok(SortBy::Date),
            "cited" | "citations" => Ok(SortBy::Cited),
            "title" => Ok(SortBy::Title),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// Filters shared by every provider; each client maps them to its own syntax
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub open_access_only: bool,
}

/// An aggregated search request, as handed over by the routing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,

    #[serde(flatten)]
    pub filters: SearchFilters,

    #[serde(default)]
    pub sort: SortBy,

    /// Provider identifiers to query; `None` queries every configured provider
    #[serde(default)]
    pub providers: Option<Vec<String>>,
}

fn default_limit() -> usize {
    20
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            offset: 0,
            filters: SearchFilters::default(),
            sort: SortBy::default(),
            providers: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn years(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.filters.year_from = from;
        self.filters.year_to = to;
        self
    }

    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.filters.journal = Some(journal.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.filters.author = Some(author.into());
        self
    }

    pub fn open_access_only(mut self, only: bool) -> Self {
        self.filters.open_access_only = only;
        self
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// Query terms: whitespace tokens, case-folded
    pub fn terms(&self) -> Vec<String> {
        crate::search::query_terms(&self.query)
    }
}

/// The per-provider query a client receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    pub query: String,
    /// 1-based page number
    pub page: usize,
    pub page_size: usize,
    pub filters: SearchFilters,
    pub sort: SortBy,
}

impl ProviderQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            page_size: 20,
            filters: SearchFilters::default(),
            sort: SortBy::Relevance,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    /// Zero-based offset of the first record of this page
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.page_size
    }
}

/// Echo of the request, returned alongside results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    pub query: String,
    pub filters: SearchFilters,
    pub sort_by: SortBy,
    pub limit: usize,
    pub offset: usize,
}

/// Aggregated search response
///
/// `total_results == 0` covers both "nothing matched" and "no provider
/// answered"; the two are not distinguished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<CanonicalPaper>,
    pub total_results: usize,
    pub metadata: SearchMetadata,
}

impl SearchResponse {
    pub fn empty(request: &SearchRequest) -> Self {
        Self {
            results: Vec::new(),
            total_results: 0,
            metadata: SearchMetadata::from(request),
        }
    }
}

impl From<&SearchRequest> for SearchMetadata {
    fn from(request: &SearchRequest) -> Self {
        Self {
            query: request.query.clone(),
            filters: request.filters.clone(),
            sort_by: request.sort,
            limit: request.limit,
            offset: request.offset,
        }
    }
}
