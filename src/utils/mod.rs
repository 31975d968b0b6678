//! Utility modules supporting the provider clients and the search pipeline.
//!
//! - [`deduplicate_papers`]: Collapse papers sharing a DOI (or, without one, a title)
//! - [`HttpClient`]: HTTP client with a per-provider rate limiter and status classification
//! - [`normalize_doi`] / [`validate_doi`] / [`extract_doi`]: DOI handling
//! - [`RetryConfig`] / [`with_retry`]: Bounded exponential backoff for transient errors
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use metareview::sources::SourceError;
//! use metareview::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let config = RetryConfig::default().with_initial_delay(Duration::from_millis(500));
//! let data = with_retry(config, || async { fetch().await }).await?;
//! # Ok(())
//! # }
//! ```

mod dedup;
mod doi;
mod http;
mod retry;

pub use dedup::{dedup_key, deduplicate_papers};
pub use doi::{extract_doi, normalize_doi, validate_doi, DoiError};
pub use http::{classify_status, HttpClient};
pub use retry::{with_retry, RetryConfig, TransientError};
