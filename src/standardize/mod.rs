//! Standardization of provider-native records into [`CanonicalPaper`]s.
//!
//! Each provider module owns a `parse_record` function for its own payload
//! shape; this module dispatches on the record's [`ProviderTag`] and holds
//! the field rules every parser shares (authors, inverted-index abstracts,
//! dates, venue lists, the open-access rule). Provider-specific shapes never
//! leave this boundary.

mod abstract_text;
mod authors;
mod dates;

pub use abstract_text::{reconstruct_abstract, reconstruct_from_value, strip_markup};
pub use authors::{parse_author, parse_authors, split_author_string};
pub use dates::{parse_date, parse_date_str};

use serde_json::Value;

use crate::models::{CanonicalPaper, ProviderTag};
use crate::sources::RawRecord;

/// A raw record that could not be standardized
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StandardizeError {
    #[error("Malformed {provider} record: {reason}")]
    Malformed { provider: String, reason: String },

    #[error("No standardizer for provider '{0}'")]
    UnsupportedProvider(String),
}

impl StandardizeError {
    pub fn malformed(provider: &ProviderTag, reason: impl std::fmt::Display) -> Self {
        StandardizeError::Malformed {
            provider: provider.id().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Map one raw provider record to the canonical shape
pub fn standardize(record: &RawRecord) -> Result<CanonicalPaper, StandardizeError> {
    if !record.payload.is_object() {
        return Err(StandardizeError::malformed(
            &record.provider,
            "payload is not a JSON object",
        ));
    }

    match &record.provider {
        #[cfg(feature = "source-crossref")]
        ProviderTag::Crossref => crate::sources::crossref::parse_record(&record.payload),
        #[cfg(feature = "source-openalex")]
        ProviderTag::OpenAlex => crate::sources::openalex::parse_record(&record.payload),
        #[cfg(feature = "source-semantic-scholar")]
        ProviderTag::SemanticScholar => {
            crate::sources::semantic_scholar::parse_record(&record.payload)
        }
        #[cfg(feature = "source-scopus")]
        ProviderTag::Scopus => crate::sources::scopus::parse_record(&record.payload),
        #[cfg(feature = "source-exa")]
        ProviderTag::Exa => crate::sources::exa::parse_record(&record.payload),
        #[cfg(feature = "source-unpaywall")]
        ProviderTag::Unpaywall => crate::sources::unpaywall::parse_record(&record.payload),
        ProviderTag::Document => crate::reconcile::DocumentMetadata::from_value(&record.payload)
            .map(|doc| doc.into_paper()),
        other => Err(StandardizeError::UnsupportedProvider(other.id().to_string())),
    }
}

/// Standardize a batch, dropping (and logging) records that fail
pub fn standardize_all(records: &[RawRecord]) -> Vec<CanonicalPaper> {
    records
        .iter()
        .filter_map(|record| match standardize(record) {
            Ok(paper) => Some(paper),
            Err(e) => {
                tracing::warn!("Dropping record: {}", e);
                None
            }
        })
        .collect()
}

/// A non-blank text value; numbers are stringified, the literal "null" is absent
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    let s = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(s)
    }
}

/// A plain string or the first element of a list of strings
pub(crate) fn first_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => items.iter().find_map(|v| text(Some(v))),
        other => text(Some(other)),
    }
}

/// A non-negative count given as a number or numeric string; 0 otherwise
pub(crate) fn count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().map(|c| c.min(u32::MAX as u64) as u32).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Every string in a list (or a single string), blanks removed
pub(crate) fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| text(Some(v))).collect(),
        Some(other) => text(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Open access needs both the provider's flag and somewhere to retrieve it from
pub(crate) fn open_access(flag: bool, landing_page: Option<&str>, pdf: Option<&str>) -> bool {
    let retrievable = |u: Option<&str>| u.is_some_and(|u| !u.trim().is_empty());
    flag && (retrievable(landing_page) || retrievable(pdf))
}

/// Look up a nested value through a sequence of object keys
pub(crate) fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |v, key| v.get(*key))
}
