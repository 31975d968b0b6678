//! Mock source for testing purposes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::models::{ProviderQuery, ProviderTag};
use crate::sources::{RawPage, RawRecord, Source, SourceCapabilities, SourceError};

/// A scriptable source that replays queued responses.
///
/// Queued results are consumed one per call; once the queue is empty, `search`
/// keeps returning the fallback page and `get_by_doi` answers `NotFound`.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    configured: bool,
    delay: Option<Duration>,
    retry_base: Duration,
    search_queue: Mutex<VecDeque<Result<RawPage, SourceError>>>,
    lookup_queue: Mutex<VecDeque<Result<RawRecord, SourceError>>>,
    fallback: Mutex<RawPage>,
    last_query: Mutex<Option<ProviderQuery>>,
    search_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockSource {
    /// Create a new mock source with search and DOI lookup capabilities.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: SourceCapabilities::SEARCH | SourceCapabilities::DOI_LOOKUP,
            configured: true,
            delay: None,
            retry_base: Duration::from_millis(1),
            search_queue: Mutex::new(VecDeque::new()),
            lookup_queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(RawPage::default()),
            last_query: Mutex::new(None),
            search_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Report missing credentials
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Page returned once the search queue is drained
    pub fn with_records(self, records: Vec<RawRecord>) -> Self {
        let total = records.len();
        *lock(&self.fallback) = RawPage::new(records, total);
        self
    }

    /// Queue one search result.
    pub fn push_search(&self, result: Result<RawPage, SourceError>) {
        lock(&self.search_queue).push_back(result);
    }

    /// Queue one DOI lookup result.
    pub fn push_lookup(&self, result: Result<RawRecord, SourceError>) {
        lock(&self.lookup_queue).push_back(result);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// The query most recently passed to `search`
    pub fn last_query(&self) -> Option<ProviderQuery> {
        lock(&self.last_query).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn tag(&self) -> ProviderTag {
        ProviderTag::Other(self.id.clone())
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn retry_base_delay(&self) -> Duration {
        self.retry_base
    }

    async fn search(&self, query: &ProviderQuery) -> Result<RawPage, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_query) = Some(query.clone());
        self.pause().await;

        let next = lock(&self.search_queue).pop_front();
        match next {
            Some(result) => result,
            None => Ok(lock(&self.fallback).clone()),
        }
    }

    async fn get_by_doi(&self, doi: &str) -> Result<RawRecord, SourceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let next = lock(&self.lookup_queue).pop_front();
        next.unwrap_or_else(|| Err(SourceError::NotFound(doi.to_string())))
    }
}

/// Helper function to create a document-shaped raw record for testing.
pub fn make_record(title: &str, doi: Option<&str>) -> RawRecord {
    let mut payload = json!({ "title": title, "authors": ["Test Author"] });
    if let Some(doi) = doi {
        payload["doi"] = json!(doi);
    }
    RawRecord::new(ProviderTag::Document, payload)
}
