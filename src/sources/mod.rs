//! Provider clients with a shared trait-based architecture.
//!
//! This module defines the [`Source`] trait that every external metadata
//! provider implements. A client issues exactly one outbound request per
//! call and hands back provider-native [`RawRecord`]s; turning those into
//! [`CanonicalPaper`](crate::models::CanonicalPaper)s is the job of the
//! [`standardize`](crate::standardize) layer, and retrying is the job of
//! [`with_retry`](crate::utils::with_retry).
//!
//! # Feature Flags
//!
//! Individual providers can be disabled at compile time using Cargo features:
//!
//! - `crossref` - Crossref REST API (default: enabled)
//! - `openalex` - OpenAlex works API (default: enabled)
//! - `semantic_scholar` - Semantic Scholar Graph API (default: enabled)
//! - `scopus` - Elsevier Scopus search API, needs an API key (default: enabled)
//! - `exa` - Exa web discovery API, needs an API key (default: enabled)
//! - `unpaywall` - Unpaywall open-access resolver, DOI lookup only (default: enabled)
//!
//! # Runtime Configuration
//!
//! Every client is constructed from an immutable
//! [`ProviderSettings`](crate::config::ProviderSettings) value. Clients never
//! read the environment themselves; see [`crate::config`] for the layering of
//! defaults, TOML and `METAREVIEW_*` variables.

#[cfg(feature = "source-crossref")]
pub(crate) mod crossref;
#[cfg(feature = "source-exa")]
pub(crate) mod exa;
#[cfg(feature = "source-openalex")]
pub(crate) mod openalex;
mod registry;
#[cfg(feature = "source-scopus")]
pub(crate) mod scopus;
#[cfg(feature = "source-semantic-scholar")]
pub(crate) mod semantic_scholar;
#[cfg(feature = "source-unpaywall")]
pub(crate) mod unpaywall;

pub mod mock;

pub use mock::MockSource;
pub use registry::{SourceCapabilities, SourceRegistry};

#[cfg(feature = "source-crossref")]
pub use crossref::CrossrefSource;
#[cfg(feature = "source-exa")]
pub use exa::ExaSource;
#[cfg(feature = "source-openalex")]
pub use openalex::OpenAlexSource;
#[cfg(feature = "source-scopus")]
pub use scopus::ScopusSource;
#[cfg(feature = "source-semantic-scholar")]
pub use semantic_scholar::SemanticScholarSource;
#[cfg(feature = "source-unpaywall")]
pub use unpaywall::UnpaywallSource;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{ProviderQuery, ProviderTag};

/// A provider-native record, opaque outside the standardization layer
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub provider: ProviderTag,
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(provider: ProviderTag, payload: serde_json::Value) -> Self {
        Self { provider, payload }
    }
}

/// One page of provider-native records plus the provider's own total count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    pub total: usize,
}

impl RawPage {
    pub fn new(records: Vec<RawRecord>, total: usize) -> Self {
        Self { records, total }
    }
}

/// The Source trait defines the interface for all provider clients.
///
/// # Implementing a New Provider
///
/// 1. Create a struct holding its settings and an [`HttpClient`](crate::utils::HttpClient)
/// 2. Implement `id`, `name`, `tag` and whichever of `search`/`get_by_doi` it supports
/// 3. Add a `parse_record` function and a dispatch arm in [`crate::standardize`]
/// 4. Register it in [`SourceRegistry::from_config`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this provider (used for selection, e.g. "crossref")
    fn id(&self) -> &str;

    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Tag attached to every raw record this provider returns
    fn tag(&self) -> ProviderTag;

    /// Describe the capabilities of this provider
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::SEARCH
    }

    /// Whether this provider supports search
    fn supports_search(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::SEARCH)
    }

    /// Whether this provider supports lookup by DOI
    fn supports_doi_lookup(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::DOI_LOOKUP)
    }

    /// Whether all credentials this provider needs are present
    fn is_configured(&self) -> bool {
        true
    }

    /// Largest page the provider will serve in one request
    fn max_page_size(&self) -> usize {
        100
    }

    /// First backoff delay used when retrying this provider
    fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(1)
    }

    /// Fetch one page of records matching the query
    async fn search(&self, _query: &ProviderQuery) -> Result<RawPage, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Fetch a single record by its DOI (already normalized)
    async fn get_by_doi(&self, _doi: &str) -> Result<RawRecord, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a provider
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this provider
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// HTTP 429; carries the server's `Retry-After` hint when it sent one
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Request timed out in transport
    #[error("Request timed out")]
    Timeout,

    /// Connection could not be established
    #[error("Network error: {0}")]
    Network(String),

    /// Other 4xx; the request itself is wrong and will not succeed on retry
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A required API key or contact email is not configured
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The identifier is not known to the provider
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether the retry controller should try the call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. }
                | SourceError::ServerError { .. }
                | SourceError::Timeout
                | SourceError::Network(_)
        )
    }

    /// Whether this is a legitimate "absent" answer rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_))
    }

    /// Server-provided delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SourceError::Timeout;
        }
        if err.is_connect() {
            return SourceError::Network(err.to_string());
        }
        if err.is_decode() {
            return SourceError::Parse(err.to_string());
        }
        if let Some(status) = err.status() {
            return crate::utils::classify_status(status, None, &err.to_string());
        }
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
