//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `METAREVIEW_*` environment variables using `__` as the section separator
//! (for example `METAREVIEW_PROVIDERS__SCOPUS__API_KEY`).

mod file_config;

pub use file_config::{default_config_path, find_config_file, ConfigError};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::ProviderTag;
use crate::utils::RetryConfig;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "METAREVIEW";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Per-provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Aggregated search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Retry settings shared by every provider
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Settings for every known provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub crossref: ProviderSettings,
    #[serde(default)]
    pub openalex: ProviderSettings,
    #[serde(default)]
    pub semantic_scholar: ProviderSettings,
    #[serde(default)]
    pub scopus: ProviderSettings,
    #[serde(default)]
    pub exa: ProviderSettings,
    #[serde(default)]
    pub unpaywall: ProviderSettings,
}

impl ProvidersConfig {
    /// Settings for a provider tag; `None` for tags that are not HTTP providers
    pub fn get(&self, tag: &ProviderTag) -> Option<&ProviderSettings> {
        match tag {
            ProviderTag::Crossref => Some(&self.crossref),
            ProviderTag::OpenAlex => Some(&self.openalex),
            ProviderTag::SemanticScholar => Some(&self.semantic_scholar),
            ProviderTag::Scopus => Some(&self.scopus),
            ProviderTag::Exa => Some(&self.exa),
            ProviderTag::Unpaywall => Some(&self.unpaywall),
            ProviderTag::Document | ProviderTag::Other(_) => None,
        }
    }
}

/// Immutable settings handed to a provider client at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether the provider is registered at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override of the provider's public API root
    #[serde(default)]
    pub base_url: Option<String>,

    /// Contact email for "polite pool" access
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Transport timeout for a single request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            email: None,
            api_key: None,
            requests_per_second: default_rps(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderSettings {
    /// Settings pointing at a specific base URL, mostly useful against mock servers
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Base URL with any trailing slash removed, falling back to the provider default
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Aggregated search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Deadline for one provider's whole call, retries included
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Cap on the reported total
    #[serde(default = "default_max_total_results")]
    pub max_total_results: usize,

    /// How many records to fetch from each provider per requested result
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            max_total_results: default_max_total_results(),
            fetch_multiplier: default_fetch_multiplier(),
        }
    }
}

impl SearchConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Longest a provider call can take when every attempt times out in transport
    pub fn worst_case(&self, provider: &ProviderSettings) -> Duration {
        let attempts = self.max_attempts.max(1);
        provider.request_timeout().saturating_mul(attempts)
            + self.policy(provider.retry_base()).total_backoff()
    }

    /// Retry policy for a provider with the given base delay
    pub fn policy(&self, base_delay: Duration) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: base_delay,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rps() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_max_total_results() -> usize {
    1000
}

fn default_fetch_multiplier() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Load configuration from an optional file plus the environment
///
/// With no explicit path, the first of `./metareview.toml` and
/// `<config dir>/metareview/config.toml` that exists is used.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    let file = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    if let Some(file) = file {
        tracing::debug!("Loading configuration from {}", file.display());
        builder = builder.add_source(config::File::from(file.as_path()).required(path.is_some()));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Get the configuration from the environment and default file locations
pub fn get_config() -> Config {
    match load_config(None) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Falling back to default configuration: {}", e);
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.max_total_results, 1000);
        assert_eq!(config.search.fetch_multiplier, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.providers.crossref.enabled);
        assert_eq!(config.providers.scopus.api_key(), None);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metareview.toml");
        fs::write(
            &path,
            r#"
[providers.scopus]
api_key = "els-key"
requests_per_second = 2

[search]
provider_timeout_secs = 10
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.providers.scopus.api_key(), Some("els-key"));
        assert_eq!(config.providers.scopus.requests_per_second, 2);
        assert_eq!(config.providers.scopus.retry_base_delay_ms, 1000);
        assert_eq!(config.search.provider_timeout_secs, 10);
        assert_eq!(config.search.max_total_results, 1000);
        assert!(config.providers.exa.enabled);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/metareview.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_base_url_or() {
        let settings = ProviderSettings::with_base_url("http://127.0.0.1:1234/");
        assert_eq!(settings.base_url_or("https://api.crossref.org"), "http://127.0.0.1:1234");

        let settings = ProviderSettings::default();
        assert_eq!(
            settings.base_url_or("https://api.crossref.org"),
            "https://api.crossref.org"
        );
    }

    #[test]
    fn test_blank_credentials_count_as_missing() {
        let settings = ProviderSettings::default()
            .with_api_key("  ")
            .with_email("");
        assert_eq!(settings.api_key(), None);
        assert_eq!(settings.email(), None);
    }

    #[test]
    fn test_default_deadline_leaves_room_for_every_attempt() {
        let config = Config::default();
        for tag in [
            ProviderTag::Crossref,
            ProviderTag::OpenAlex,
            ProviderTag::SemanticScholar,
            ProviderTag::Scopus,
            ProviderTag::Exa,
            ProviderTag::Unpaywall,
        ] {
            let Some(settings) = config.providers.get(&tag) else {
                panic!("no settings for {}", tag.id());
            };
            assert!(
                config.retry.worst_case(settings) <= config.search.provider_timeout(),
                "{} cannot finish its retries inside the deadline",
                tag.id()
            );
        }
        assert_eq!(
            config.retry.worst_case(&config.providers.crossref),
            Duration::from_secs(48)
        );
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let policy = RetrySettings::default().policy(Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }
}
