//! Registry of configured provider clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Source, SourceError};
use crate::config::Config;
use crate::models::ProviderTag;

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const DOI_LOOKUP = 1 << 1;
    }
}

/// Provider used when a request names nothing usable
pub const FALLBACK_PROVIDER: &str = "crossref";

/// Order in which DOI lookups try providers
pub const LOOKUP_PRIORITY: [&str; 5] = [
    "openalex",
    "crossref",
    "semantic_scholar",
    "scopus",
    "unpaywall",
];

/// Registry for all available provider clients
///
/// Sources are kept ordered by id so that fan-out order (and therefore the
/// first-seen tie-break during deduplication) is stable between runs.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider that is compiled in and enabled in the configuration
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[allow(unused_variables)]
        let providers = &config.providers;

        #[cfg(feature = "source-crossref")]
        if providers.crossref.enabled {
            registry.register(Arc::new(super::CrossrefSource::new(&providers.crossref)?));
        }
        #[cfg(feature = "source-openalex")]
        if providers.openalex.enabled {
            registry.register(Arc::new(super::OpenAlexSource::new(&providers.openalex)?));
        }
        #[cfg(feature = "source-semantic-scholar")]
        if providers.semantic_scholar.enabled {
            registry.register(Arc::new(super::SemanticScholarSource::new(
                &providers.semantic_scholar,
            )?));
        }
        #[cfg(feature = "source-scopus")]
        if providers.scopus.enabled {
            registry.register(Arc::new(super::ScopusSource::new(&providers.scopus)?));
        }
        #[cfg(feature = "source-exa")]
        if providers.exa.enabled {
            registry.register(Arc::new(super::ExaSource::new(&providers.exa)?));
        }
        #[cfg(feature = "source-unpaywall")]
        if providers.unpaywall.enabled {
            registry.register(Arc::new(super::UnpaywallSource::new(&providers.unpaywall)?));
        }

        tracing::debug!("Registered providers: {:?}", registry.ids().collect::<Vec<_>>());
        Ok(registry)
    }

    /// Register a new source, replacing any source with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Get a source by ID, returning an error if not found
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Source>, SourceError> {
        self.get(id)
            .ok_or_else(|| SourceError::NotFound(format!("Source '{}' not found", id)))
    }

    /// Get all registered sources
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Get sources that support a specific capability
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<&Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .collect()
    }

    /// Get sources that support search
    pub fn searchable(&self) -> Vec<&Arc<dyn Source>> {
        self.with_capability(SourceCapabilities::SEARCH)
    }

    /// Resolve the providers a search should fan out to
    ///
    /// Named providers are matched by id (common spellings accepted); unknown
    /// names and providers that cannot search are ignored, and if nothing is
    /// left the fallback provider is used. Without names, every searchable
    /// provider whose credentials are configured is used.
    pub fn select(&self, providers: Option<&[String]>) -> Vec<Arc<dyn Source>> {
        let Some(names) = providers.filter(|names| !names.is_empty()) else {
            return self
                .searchable()
                .into_iter()
                .filter(|s| s.is_configured())
                .cloned()
                .collect();
        };

        let mut selected: Vec<Arc<dyn Source>> = Vec::new();
        for name in names {
            let id = canonical_id(name);
            match self.get(&id) {
                Some(source) if source.supports_search() => {
                    if !selected.iter().any(|s| s.id() == source.id()) {
                        selected.push(Arc::clone(source));
                    }
                }
                _ => tracing::debug!("Ignoring unknown provider '{}'", name),
            }
        }

        if selected.is_empty() {
            if let Some(fallback) = self.get(FALLBACK_PROVIDER) {
                tracing::debug!("No usable provider named, falling back to {}", FALLBACK_PROVIDER);
                selected.push(Arc::clone(fallback));
            }
        }

        selected
    }

    /// DOI-capable, configured sources in lookup priority order
    ///
    /// Sources outside the priority list follow in id order.
    pub fn lookup_chain(&self) -> Vec<Arc<dyn Source>> {
        let candidates: Vec<&Arc<dyn Source>> = self
            .with_capability(SourceCapabilities::DOI_LOOKUP)
            .into_iter()
            .filter(|s| s.is_configured())
            .collect();

        let rank = |id: &str| {
            LOOKUP_PRIORITY
                .iter()
                .position(|p| *p == id)
                .unwrap_or(LOOKUP_PRIORITY.len())
        };

        let mut chain: Vec<Arc<dyn Source>> = candidates.into_iter().cloned().collect();
        // Stable sort keeps id order among unranked sources
        chain.sort_by_key(|s| rank(s.id()));
        chain
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn canonical_id(name: &str) -> String {
    ProviderTag::from_id(name)
        .map(|tag| tag.id().to_string())
        .unwrap_or_else(|| name.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    fn mock_registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("crossref")));
        registry.register(Arc::new(MockSource::new("openalex")));
        registry.register(Arc::new(MockSource::new("scopus").unconfigured()));
        registry.register(Arc::new(
            MockSource::new("unpaywall").with_capabilities(SourceCapabilities::DOI_LOOKUP),
        ));
        registry
    }

    fn ids(sources: &[Arc<dyn Source>]) -> Vec<&str> {
        sources.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_registry_basic() {
        let registry = mock_registry();
        assert_eq!(registry.len(), 4);
        assert!(registry.has("openalex"));
        assert!(registry.get("arxiv").is_none());
        assert!(registry.get_required("arxiv").is_err());
        assert_eq!(registry.searchable().len(), 3);
    }

    #[test]
    fn test_select_defaults_to_configured_searchable() {
        let registry = mock_registry();
        let empty: Vec<String> = Vec::new();
        assert_eq!(ids(&registry.select(None)), vec!["crossref", "openalex"]);
        assert_eq!(
            ids(&registry.select(Some(empty.as_slice()))),
            vec!["crossref", "openalex"]
        );
    }

    #[test]
    fn test_select_named_ignores_unknown() {
        let registry = mock_registry();
        let names = vec!["OpenAlex".to_string(), "arxiv".to_string(), "openalex".to_string()];
        assert_eq!(ids(&registry.select(Some(names.as_slice()))), vec!["openalex"]);
    }

    #[test]
    fn test_select_falls_back_to_crossref() {
        let registry = mock_registry();
        let names = vec!["arxiv".to_string(), "unpaywall".to_string()];
        assert_eq!(ids(&registry.select(Some(names.as_slice()))), vec!["crossref"]);
    }

    #[test]
    fn test_lookup_chain_order() {
        let mut registry = mock_registry();
        registry.register(Arc::new(MockSource::new("aaa_local")));

        // scopus is unconfigured and skipped
        assert_eq!(
            ids(&registry.lookup_chain()),
            vec!["openalex", "crossref", "unpaywall", "aaa_local"]
        );
    }

    #[test]
    fn test_from_config_registers_enabled_providers() {
        let mut config = Config::default();
        config.providers.exa.enabled = false;

        let registry = SourceRegistry::from_config(&config).unwrap();
        assert!(!registry.has("exa"));
        #[cfg(feature = "source-crossref")]
        assert!(registry.has("crossref"));
        #[cfg(feature = "source-scopus")]
        assert!(!registry.get("scopus").unwrap().is_configured());
    }
}
