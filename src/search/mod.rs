//! Multi-provider search aggregation.
//!
//! [`SearchService`] fans a request out to the selected providers in
//! parallel, each call wrapped in the retry controller and bounded by a
//! per-provider deadline. Whatever comes back is standardized, scored,
//! deduplicated, sorted, filtered and paginated by [`aggregate`], which is a
//! pure function of the collected papers.
//!
//! A provider that fails, even after retries, contributes nothing; the search
//! itself never fails.

mod relevance;

pub use relevance::{query_terms, score, score_all};

use std::cmp::Ordering;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::config::{Config, RetrySettings, SearchConfig};
use crate::models::{
    CanonicalPaper, ProviderQuery, SearchMetadata, SearchRequest, SearchResponse, SortBy,
};
use crate::sources::{RawRecord, Source, SourceError, SourceRegistry};
use crate::standardize;
use crate::utils::{deduplicate_papers, normalize_doi, with_retry};

/// Result of an identifier lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(CanonicalPaper),
    /// Every provider in the chain reported the DOI as absent (or failed)
    NotFound,
}

impl LookupOutcome {
    pub fn into_option(self) -> Option<CanonicalPaper> {
        match self {
            LookupOutcome::Found(paper) => Some(paper),
            LookupOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }
}

/// Aggregating search front-end over a [`SourceRegistry`]
#[derive(Debug, Clone)]
pub struct SearchService {
    registry: SourceRegistry,
    settings: SearchConfig,
    retry: RetrySettings,
}

impl SearchService {
    pub fn new(registry: SourceRegistry, config: &Config) -> Self {
        Self {
            registry,
            settings: config.search.clone(),
            retry: config.retry.clone(),
        }
    }

    /// Build the registry from the configuration and wrap it
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let registry = SourceRegistry::from_config(config)?;
        let deadline = config.search.provider_timeout();
        for source in registry.all() {
            if let Some(settings) = config.providers.get(&source.tag()) {
                let worst = config.retry.worst_case(settings);
                if worst > deadline {
                    warn!(
                        "{}: {} attempts may need {:?}, longer than the {:?} provider deadline",
                        source.id(),
                        config.retry.max_attempts,
                        worst,
                        deadline
                    );
                }
            }
        }
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Page size requested from one provider for this request
    pub fn fetch_size(&self, request: &SearchRequest, source: &dyn Source) -> usize {
        let wanted = request
            .limit
            .saturating_mul(self.settings.fetch_multiplier.max(1))
            .max(request.offset.saturating_add(request.limit));
        wanted.clamp(1, source.max_page_size().max(1))
    }

    /// Run an aggregated search
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        let sources = self.registry.select(request.providers.as_deref());
        if sources.is_empty() {
            warn!("No providers available for query '{}'", request.query);
            return SearchResponse::empty(request);
        }

        let calls = sources.into_iter().map(|source| {
            let query = ProviderQuery::new(request.query.clone())
                .page_size(self.fetch_size(request, source.as_ref()))
                .filters(request.filters.clone())
                .sort(request.sort);
            async move { self.fetch_from(source, query).await }
        });

        let records: Vec<RawRecord> = join_all(calls).await.into_iter().flatten().collect();
        let papers = standardize::standardize_all(&records);

        let response = aggregate(papers, request, self.settings.max_total_results);
        info!(
            "Search '{}' returned {} of {} results",
            request.query,
            response.results.len(),
            response.total_results
        );
        response
    }

    /// One provider's contribution; empty on any failure
    async fn fetch_from(&self, source: Arc<dyn Source>, query: ProviderQuery) -> Vec<RawRecord> {
        let policy = self.retry.policy(source.retry_base_delay());
        let call = with_retry(policy, || source.search(&query));

        match tokio::time::timeout(self.settings.provider_timeout(), call).await {
            Ok(Ok(page)) => {
                info!("{}: {} records (total {})", source.id(), page.records.len(), page.total);
                page.records
            }
            Ok(Err(e)) if e.is_not_found() => {
                debug!("{}: nothing found", source.id());
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("{}: provider degraded to empty result: {}", source.id(), e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "{}: no answer within {:?}, skipping",
                    source.id(),
                    self.settings.provider_timeout()
                );
                Vec::new()
            }
        }
    }

    /// Search a single named provider and standardize what it returns
    pub async fn search_provider(
        &self,
        provider: &str,
        query: ProviderQuery,
    ) -> Result<Vec<CanonicalPaper>, SourceError> {
        let source = self.registry.get_required(provider)?;
        let policy = self.retry.policy(source.retry_base_delay());
        let call = with_retry(policy, || source.search(&query));

        let page = tokio::time::timeout(self.settings.provider_timeout(), call)
            .await
            .map_err(|_| SourceError::Timeout)??;
        Ok(standardize::standardize_all(&page.records))
    }

    /// Look a DOI up at one named provider
    pub async fn lookup_at(&self, provider: &str, doi: &str) -> Result<CanonicalPaper, SourceError> {
        let source = self.registry.get_required(provider)?;
        let doi = normalize_doi(doi).ok_or_else(|| SourceError::BadRequest("empty DOI".into()))?;
        let policy = self.retry.policy(source.retry_base_delay());
        let call = with_retry(policy, || source.get_by_doi(&doi));

        let record = tokio::time::timeout(self.settings.provider_timeout(), call)
            .await
            .map_err(|_| SourceError::Timeout)??;
        standardize::standardize(&record).map_err(|e| SourceError::Parse(e.to_string()))
    }

    /// Resolve a DOI through the provider chain
    ///
    /// The first provider that answers wins. Absence, exhausted retries and
    /// unparseable records all move on to the next provider.
    pub async fn lookup_by_doi(&self, doi: &str) -> LookupOutcome {
        let Some(doi) = normalize_doi(doi) else {
            return LookupOutcome::NotFound;
        };

        for source in self.registry.lookup_chain() {
            match self.lookup_at(source.id(), &doi).await {
                Ok(paper) => {
                    info!("{}: resolved {}", source.id(), doi);
                    return LookupOutcome::Found(paper);
                }
                Err(e) if e.is_not_found() => debug!("{}: {} not found", source.id(), doi),
                Err(e) => warn!("{}: lookup of {} failed: {}", source.id(), doi, e),
            }
        }

        LookupOutcome::NotFound
    }
}

/// Merge, rank and paginate the standardized output of every provider
pub fn aggregate(
    mut papers: Vec<CanonicalPaper>,
    request: &SearchRequest,
    max_total: usize,
) -> SearchResponse {
    score_all(&mut papers, &request.terms());

    if request.sort == SortBy::Relevance {
        papers.retain(|p| p.score() > 0);
    }

    let mut papers = deduplicate_papers(papers);
    sort_papers(&mut papers, request.sort);

    if request.filters.open_access_only {
        papers.retain(|p| p.is_open_access);
    }

    let total_results = papers.len().min(max_total);
    let results = papers
        .into_iter()
        .skip(request.offset)
        .take(request.limit)
        .collect();

    SearchResponse {
        results,
        total_results,
        metadata: SearchMetadata::from(request),
    }
}

/// Stable sort by the requested field
pub fn sort_papers(papers: &mut [CanonicalPaper], sort: SortBy) {
    papers.sort_by(|a, b| compare(a, b, sort));
}

fn compare(a: &CanonicalPaper, b: &CanonicalPaper, sort: SortBy) -> Ordering {
    match sort {
        SortBy::Relevance => b
            .score()
            .cmp(&a.score())
            .then_with(|| b.citation_count.cmp(&a.citation_count)),
        // None sorts below any date, so undated papers go last
        SortBy::Date => b.publication_date.cmp(&a.publication_date),
        SortBy::Cited => b.citation_count.cmp(&a.citation_count),
        SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperBuilder, ProviderTag};
    use crate::sources::mock::make_record;
    use crate::sources::MockSource;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn paper(title: &str, doi: Option<&str>) -> CanonicalPaper {
        PaperBuilder::new(title, ProviderTag::Crossref)
            .doi(doi.map(String::from))
            .build()
    }

    fn service(sources: Vec<Arc<MockSource>>) -> SearchService {
        let mut registry = SourceRegistry::new();
        for source in sources {
            registry.register(source);
        }
        let mut config = Config::default();
        config.search.provider_timeout_secs = 1;
        SearchService::new(registry, &config)
    }

    #[test]
    fn test_pagination_past_the_end() {
        let papers = (0..50)
            .map(|i| paper(&format!("Graph paper {}", i), Some(&format!("10.1/{}", i))))
            .collect();
        let request = SearchRequest::new("graph").limit(10).offset(1000);

        let response = aggregate(papers, &request, 1000);
        assert!(response.results.is_empty());
        assert_eq!(response.total_results, 50);
        assert_eq!(response.metadata.offset, 1000);
    }

    #[test]
    fn test_total_is_capped() {
        let papers = (0..30)
            .map(|i| paper(&format!("Graph paper {}", i), None))
            .collect();
        let response = aggregate(papers, &SearchRequest::new("graph").limit(5), 25);
        assert_eq!(response.total_results, 25);
        assert_eq!(response.results.len(), 5);
    }

    #[test]
    fn test_relevance_sort_drops_unscored_and_ranks() {
        let mut cited = paper("Climate models", Some("10.1/a"));
        cited.citation_count = 40;
        let papers = vec![
            paper("Unrelated topic", Some("10.1/z")),
            paper("Climate models", Some("10.1/b")),
            cited,
            paper("Climate policy models", Some("10.1/c")),
        ];

        let response = aggregate(papers, &SearchRequest::new("climate policy"), 1000);
        let dois: Vec<_> = response
            .results
            .iter()
            .map(|p| p.doi.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(dois, vec!["10.1/c", "10.1/a", "10.1/b"]);
        assert_eq!(response.total_results, 3);
    }

    #[test]
    fn test_other_sorts_keep_unscored() {
        let mut old = paper("Alpha", Some("10.1/old"));
        old.publication_date = NaiveDate::from_ymd_opt(1999, 1, 1);
        let mut new = paper("Beta", Some("10.1/new"));
        new.publication_date = NaiveDate::from_ymd_opt(2021, 1, 1);
        let undated = paper("Gamma", Some("10.1/undated"));

        let request = SearchRequest::new("nothing matches").sort(SortBy::Date);
        let response = aggregate(vec![undated, old, new], &request, 1000);
        let titles: Vec<_> = response.results.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Beta", "Alpha", "Gamma"]);

        let request = SearchRequest::new("nothing").sort(SortBy::Title);
        let response = aggregate(
            vec![paper("beta", None), paper("Alpha", None)],
            &request,
            1000,
        );
        assert_eq!(response.results[0].title, "Alpha");
    }

    #[test]
    fn test_open_access_filter_applies_after_dedup() {
        let closed = paper("Graph", Some("10.1/x"));
        let mut open = paper("Graph theory", Some("10.1/y"));
        open.is_open_access = true;
        open.open_access_url = Some("https://example.org/y.pdf".into());

        let request = SearchRequest::new("graph").open_access_only(true);
        let response = aggregate(vec![closed, open], &request, 1000);
        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].doi.as_deref(), Some("10.1/y"));
    }

    #[test]
    fn test_fetch_size() {
        let svc = service(Vec::new());
        let source = MockSource::new("m");

        assert_eq!(svc.fetch_size(&SearchRequest::new("q").limit(10), &source), 30);
        assert_eq!(
            svc.fetch_size(&SearchRequest::new("q").limit(10).offset(40), &source),
            50
        );
        // clamped to the provider maximum of 100
        assert_eq!(svc.fetch_size(&SearchRequest::new("q").limit(50), &source), 100);
    }

    #[test]
    fn test_fetch_size_saturates_on_huge_offsets() {
        let svc = service(Vec::new());
        let source = MockSource::new("m");

        let request = SearchRequest::new("q").limit(10).offset(usize::MAX);
        assert_eq!(svc.fetch_size(&request, &source), 100);
        let request = SearchRequest::new("q").limit(usize::MAX);
        assert_eq!(svc.fetch_size(&request, &source), 100);
    }

    #[tokio::test]
    async fn test_huge_offset_returns_empty_page() {
        let records = (0..5)
            .map(|i| make_record(&format!("Offset paper {}", i), None))
            .collect();
        let svc = service(vec![Arc::new(MockSource::new("m").with_records(records))]);

        let request = SearchRequest::new("offset").limit(10).offset(usize::MAX);
        let response = svc.search(&request).await;

        assert!(response.results.is_empty());
        assert_eq!(response.total_results, 5);
    }

    #[tokio::test]
    async fn test_bad_request_contributes_nothing() {
        let failing = Arc::new(MockSource::new("failing"));
        failing.push_search(Err(SourceError::BadRequest("invalid filter".into())));
        let healthy = Arc::new(
            MockSource::new("healthy")
                .with_records(vec![make_record("Neural graph methods", Some("10.1/n"))]),
        );

        let svc = service(vec![failing.clone(), healthy]);
        let response = svc.search(&SearchRequest::new("graph")).await;

        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].title, "Neural graph methods");
        assert_eq!(failing.search_calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let flaky = Arc::new(
            MockSource::new("flaky")
                .with_records(vec![make_record("Graph sampling", Some("10.1/g"))]),
        );
        flaky.push_search(Err(SourceError::RateLimited { retry_after: None }));
        flaky.push_search(Err(SourceError::RateLimited { retry_after: None }));

        let svc = service(vec![flaky.clone()]);
        let response = svc.search(&SearchRequest::new("graph")).await;

        assert_eq!(response.total_results, 1);
        assert_eq!(flaky.search_calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_to_empty() {
        let down = Arc::new(MockSource::new("down"));
        for _ in 0..3 {
            down.push_search(Err(SourceError::ServerError {
                status: 503,
                message: "unavailable".into(),
            }));
        }

        let svc = service(vec![down.clone()]);
        let response = svc.search(&SearchRequest::new("graph")).await;

        assert!(response.results.is_empty());
        assert_eq!(response.total_results, 0);
        assert_eq!(down.search_calls(), 3);
    }

    #[tokio::test]
    async fn test_slow_provider_does_not_stall_others() {
        let slow = Arc::new(
            MockSource::new("slow")
                .with_delay(Duration::from_secs(5))
                .with_records(vec![make_record("Graph slow", Some("10.1/slow"))]),
        );
        let fast = Arc::new(
            MockSource::new("fast")
                .with_records(vec![make_record("Graph fast", Some("10.1/fast"))]),
        );

        let svc = service(vec![slow, fast]);
        let started = std::time::Instant::now();
        let response = svc.search(&SearchRequest::new("graph")).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].title, "Graph fast");
    }

    #[tokio::test]
    async fn test_named_providers_only() {
        let a = Arc::new(MockSource::new("a").with_records(vec![make_record("Graph A", None)]));
        let b = Arc::new(MockSource::new("b").with_records(vec![make_record("Graph B", None)]));

        let svc = service(vec![a.clone(), b.clone()]);
        let request = SearchRequest::new("graph").providers(["b"]);
        let response = svc.search(&request).await;

        assert_eq!(response.total_results, 1);
        assert_eq!(a.search_calls(), 0);
        assert_eq!(b.last_query().map(|q| q.page_size), Some(60));
    }

    #[tokio::test]
    async fn test_duplicates_across_providers_collapse() {
        let a = Arc::new(
            MockSource::new("a").with_records(vec![make_record("Graph A", Some("10.1/SAME"))]),
        );
        let b = Arc::new(MockSource::new("b").with_records(vec![make_record(
            "Graph A extended",
            Some("https://doi.org/10.1/same"),
        )]));

        let response = service(vec![a, b])
            .search(&SearchRequest::new("graph extended"))
            .await;
        assert_eq!(response.total_results, 1);
        assert_eq!(response.results[0].title, "Graph A extended");
        assert_eq!(response.results[0].relevance_score, Some(6));
    }

    #[tokio::test]
    async fn test_lookup_chain_moves_past_not_found() {
        let first = Arc::new(MockSource::new("openalex"));
        first.push_lookup(Err(SourceError::NotFound("10.1/x".into())));
        let second = Arc::new(MockSource::new("crossref"));
        second.push_lookup(Ok(make_record("Found it", Some("10.1/x"))));
        let third = Arc::new(MockSource::new("unpaywall"));

        let svc = service(vec![first.clone(), second, third.clone()]);
        let outcome = svc.lookup_by_doi("https://doi.org/10.1/X").await;

        match outcome {
            LookupOutcome::Found(paper) => assert_eq!(paper.title, "Found it"),
            LookupOutcome::NotFound => panic!("expected a hit"),
        }
        assert_eq!(first.lookup_calls(), 1);
        assert_eq!(third.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup_all_absent() {
        let svc = service(vec![
            Arc::new(MockSource::new("openalex")),
            Arc::new(MockSource::new("crossref")),
        ]);
        assert_eq!(svc.lookup_by_doi("10.1/missing").await, LookupOutcome::NotFound);
        assert_eq!(svc.lookup_by_doi("   ").await, LookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_search_provider_unknown() {
        let svc = service(Vec::new());
        let err = svc
            .search_provider("openalex", ProviderQuery::new("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
