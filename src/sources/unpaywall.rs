//! Unpaywall open-access resolver.
//!
//! Lookup only: Unpaywall answers "where can I read this DOI for free".
//! API documentation: <https://unpaywall.org/products/api>

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::models::{CanonicalPaper, PaperBuilder, ProviderTag};
use crate::sources::{RawRecord, Source, SourceCapabilities, SourceError};
use crate::standardize::{self, StandardizeError};
use crate::utils::HttpClient;

const UNPAYWALL_API_BASE: &str = "https://api.unpaywall.org";

/// Unpaywall resolver
///
/// The API needs a contact email on every request (free, no key).
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
    retry_base: Duration,
}

impl UnpaywallSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(settings.request_timeout(), settings.requests_per_second)?,
            base_url: settings.base_url_or(UNPAYWALL_API_BASE),
            email: settings.email().map(str::to_string),
            retry_base: settings.retry_base(),
        })
    }
}

#[async_trait]
impl Source for UnpaywallSource {
    fn id(&self) -> &str {
        "unpaywall"
    }

    fn name(&self) -> &str {
        "Unpaywall"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::Unpaywall
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::DOI_LOOKUP
    }

    fn is_configured(&self) -> bool {
        self.email.is_some()
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        let email = self
            .email
            .as_deref()
            .ok_or_else(|| SourceError::MissingCredential("unpaywall email".to_string()))?;

        let url = format!("{}/v2/{}", self.base_url, doi);
        let record: Value = self
            .client
            .send_json(self.client.get(&url).query(&[("email", email)]))
            .await?;

        if !record.is_object() {
            return Err(SourceError::NotFound(doi.to_string()));
        }

        Ok(RawRecord::new(ProviderTag::Unpaywall, record))
    }
}

/// Best open-access URL of an Unpaywall record: the PDF if known, else the landing page
pub(crate) fn best_oa_url(value: &Value) -> Option<String> {
    let location = value.get("best_oa_location")?;
    standardize::text(location.get("url_for_pdf")).or_else(|| standardize::text(location.get("url")))
}

/// Standardize one Unpaywall DOI record
pub(crate) fn parse_record(value: &Value) -> Result<CanonicalPaper, StandardizeError> {
    let record: UnpaywallRecord = serde_json::from_value(value.clone())
        .map_err(|e| StandardizeError::malformed(&ProviderTag::Unpaywall, e))?;

    let url = standardize::text(record.doi_url.as_ref());
    let oa_url = best_oa_url(value);
    let flag = record.is_oa.as_ref().and_then(Value::as_bool).unwrap_or(false);
    let is_open_access = standardize::open_access(flag, url.as_deref(), oa_url.as_deref());

    Ok(PaperBuilder::new(
        standardize::text(record.title.as_ref()).unwrap_or_default(),
        ProviderTag::Unpaywall,
    )
    .doi(standardize::text(record.doi.as_ref()).and_then(|d| crate::utils::normalize_doi(&d)))
    .authors(standardize::parse_authors(&record.z_authors))
    .publication_date(record.published_date.as_ref().and_then(standardize::parse_date))
    .journal(standardize::text(record.journal_name.as_ref()))
    .publisher(standardize::text(record.publisher.as_ref()))
    .url(url)
    .open_access(is_open_access, if is_open_access { oa_url } else { None })
    .build())
}

// ===== Unpaywall API Types =====

#[derive(Debug, Deserialize)]
struct UnpaywallRecord {
    doi: Option<Value>,
    doi_url: Option<Value>,
    title: Option<Value>,
    journal_name: Option<Value>,
    published_date: Option<Value>,
    publisher: Option<Value>,
    is_oa: Option<Value>,
    #[serde(default)]
    z_authors: Value,
}
