//! Canonical paper model shared by every provider.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Title used when a provider record carries none.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Author name used when nothing recognizable could be parsed.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// The provider (or local extractor) a paper was standardized from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTag {
    Crossref,
    #[serde(rename = "openalex")]
    OpenAlex,
    SemanticScholar,
    Scopus,
    Exa,
    Unpaywall,
    /// Metadata extracted from an uploaded document
    Document,
    #[serde(untagged)]
    Other(String),
}

impl ProviderTag {
    /// Returns the display name of the provider
    pub fn name(&self) -> &str {
        match self {
            ProviderTag::Crossref => "Crossref",
            ProviderTag::OpenAlex => "OpenAlex",
            ProviderTag::SemanticScholar => "Semantic Scholar",
            ProviderTag::Scopus => "Scopus",
            ProviderTag::Exa => "Exa",
            ProviderTag::Unpaywall => "Unpaywall",
            ProviderTag::Document => "Document",
            ProviderTag::Other(s) => s,
        }
    }

    /// Returns the provider identifier (used for selection and config sections)
    pub fn id(&self) -> &str {
        match self {
            ProviderTag::Crossref => "crossref",
            ProviderTag::OpenAlex => "openalex",
            ProviderTag::SemanticScholar => "semantic_scholar",
            ProviderTag::Scopus => "scopus",
            ProviderTag::Exa => "exa",
            ProviderTag::Unpaywall => "unpaywall",
            ProviderTag::Document => "document",
            ProviderTag::Other(s) => s,
        }
    }

    /// Parse a provider identifier, accepting a few common spellings
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "crossref" => Some(ProviderTag::Crossref),
            "openalex" => Some(ProviderTag::OpenAlex),
            "semantic_scholar" | "semantic" | "semanticscholar" => {
                Some(ProviderTag::SemanticScholar)
            }
            "scopus" => Some(ProviderTag::Scopus),
            "exa" | "exa.ai" => Some(ProviderTag::Exa),
            "unpaywall" => Some(ProviderTag::Unpaywall),
            "document" => Some(ProviderTag::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One author of a paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
        }
    }

    pub fn with_affiliation(name: impl Into<String>, affiliation: Option<String>) -> Self {
        Self {
            name: name.into(),
            affiliation,
        }
    }

    /// The placeholder inserted when a record has no parseable authors
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_AUTHOR)
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == UNKNOWN_AUTHOR && self.affiliation.is_none()
    }
}

/// A research paper normalized from any provider
///
/// Every provider response is standardized into this shape; provider-specific
/// payloads never travel further than the standardization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPaper {
    pub title: String,

    /// Digital Object Identifier, lower-cased without any resolver prefix
    pub doi: Option<String>,

    /// Ordered author list; never empty once standardized
    pub authors: Vec<Author>,

    pub publication_date: Option<NaiveDate>,

    /// Plain publication year, kept alongside the date for document metadata
    pub year: Option<i32>,

    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub publisher: Option<String>,
    pub url: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub is_open_access: bool,
    pub open_access_url: Option<String>,

    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub references_count: u32,

    pub r#abstract: Option<String>,

    pub source_provider: ProviderTag,

    /// Only set while a search pass is ranking results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<u32>,
}

impl CanonicalPaper {
    /// Create a paper with only a title and provider; authors get the placeholder
    pub fn new(title: impl Into<String>, source_provider: ProviderTag) -> Self {
        let title = title.into();
        Self {
            title: if title.trim().is_empty() {
                UNKNOWN_TITLE.to_string()
            } else {
                title
            },
            doi: None,
            authors: vec![Author::unknown()],
            publication_date: None,
            year: None,
            journal: None,
            volume: None,
            issue: None,
            pages: None,
            publisher: None,
            url: None,
            keywords: Vec::new(),
            is_open_access: false,
            open_access_url: None,
            citation_count: 0,
            references_count: 0,
            r#abstract: None,
            source_provider,
            relevance_score: None,
        }
    }

    pub fn has_abstract(&self) -> bool {
        self.r#abstract
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }

    pub fn has_placeholder_title(&self) -> bool {
        self.title == UNKNOWN_TITLE
    }

    /// True when the author list holds nothing but the "Unknown" placeholder
    pub fn has_placeholder_authors(&self) -> bool {
        self.authors.iter().all(Author::is_placeholder)
    }

    pub fn first_author(&self) -> Option<&str> {
        self.authors
            .iter()
            .find(|a| !a.is_placeholder())
            .map(|a| a.name.as_str())
    }

    /// Score used for ranking, zero when the paper has not been scored
    pub fn score(&self) -> u32 {
        self.relevance_score.unwrap_or(0)
    }

    /// Returns the author names as a vector
    pub fn author_names(&self) -> Vec<&str> {
        self.authors.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Builder for constructing CanonicalPaper objects
///
/// `build` enforces the canonical invariants: a non-empty title, a non-empty
/// author list and a year consistent with the publication date.
#[derive(Debug, Clone)]
pub struct PaperBuilder {
    paper: CanonicalPaper,
}

impl PaperBuilder {
    pub fn new(title: impl Into<String>, source: ProviderTag) -> Self {
        Self {
            paper: CanonicalPaper::new(title, source),
        }
    }

    pub fn doi(mut self, doi: Option<String>) -> Self {
        self.paper.doi = doi;
        self
    }

    pub fn authors(mut self, authors: Vec<Author>) -> Self {
        self.paper.authors = authors;
        self
    }

    pub fn publication_date(mut self, date: Option<NaiveDate>) -> Self {
        self.paper.publication_date = date;
        self
    }

    pub fn year(mut self, year: Option<i32>) -> Self {
        self.paper.year = year;
        self
    }

    pub fn journal(mut self, journal: Option<String>) -> Self {
        self.paper.journal = journal;
        self
    }

    pub fn volume(mut self, volume: Option<String>) -> Self {
        self.paper.volume = volume;
        self
    }

    pub fn issue(mut self, issue: Option<String>) -> Self {
        self.paper.issue = issue;
        self
    }

    pub fn pages(mut self, pages: Option<String>) -> Self {
        self.paper.pages = pages;
        self
    }

    pub fn publisher(mut self, publisher: Option<String>) -> Self {
        self.paper.publisher = publisher;
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.paper.url = url;
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.paper.keywords = keywords;
        self
    }

    pub fn open_access(mut self, is_open_access: bool, url: Option<String>) -> Self {
        self.paper.is_open_access = is_open_access;
        self.paper.open_access_url = url;
        self
    }

    pub fn citation_count(mut self, count: u32) -> Self {
        self.paper.citation_count = count;
        self
    }

    pub fn references_count(mut self, count: u32) -> Self {
        self.paper.references_count = count;
        self
    }

    pub fn abstract_text(mut self, text: Option<String>) -> Self {
        self.paper.r#abstract = text;
        self
    }

    /// Build the paper
    pub fn build(self) -> CanonicalPaper {
        let mut paper = self.paper;
        if paper.authors.is_empty() {
            paper.authors.push(Author::unknown());
        }
        if let Some(date) = paper.publication_date {
            paper.year = Some(date.year());
        }
        paper
    }
}
