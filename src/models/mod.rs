//! Core data models for papers and search operations.

mod paper;
mod search;

pub use paper::{Author, CanonicalPaper, PaperBuilder, ProviderTag, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
pub use search::{
    ProviderQuery, SearchFilters, SearchMetadata, SearchRequest, SearchResponse, SortBy,
};
