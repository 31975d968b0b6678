//! # metareview
//!
//! Multi-provider paper search aggregation, metadata reconciliation and review
//! lifecycle tracking for systematic reviews and meta-analyses.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: The canonical paper record and search request/response types
//! - [`sources`]: Provider clients behind the [`Source`] trait
//! - [`standardize`]: Provider-native records to [`CanonicalPaper`]
//! - [`search`]: Parallel fan-out, relevance scoring, dedup and pagination
//! - [`reconcile`]: Merging document-extracted metadata with provider metadata
//! - [`lifecycle`]: The paper review status machine
//! - [`utils`]: HTTP client, retry/backoff, DOI handling and deduplication
//! - [`config`]: Configuration management

pub mod config;
pub mod lifecycle;
pub mod models;
pub mod reconcile;
pub mod search;
pub mod sources;
pub mod standardize;
pub mod utils;

// Re-export commonly used types
pub use models::{CanonicalPaper, SearchRequest, SearchResponse};
pub use search::{LookupOutcome, SearchService};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
