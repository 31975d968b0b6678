//! Configuration file support.
//!
//! # Configuration File Format
//!
//! ```toml
//! [providers.crossref]
//! email = "you@example.org"
//!
//! [providers.openalex]
//! email = "you@example.org"
//! requests_per_second = 10
//!
//! [providers.semantic_scholar]
//! api_key = "your-s2-key"
//! retry_base_delay_ms = 2000
//!
//! [providers.scopus]
//! api_key = "your-elsevier-key"
//!
//! [providers.exa]
//! api_key = "your-exa-key"
//!
//! [providers.unpaywall]
//! email = "you@example.org"
//!
//! [search]
//! provider_timeout_secs = 60
//! max_total_results = 1000
//! fetch_multiplier = 3
//!
//! [retry]
//! max_attempts = 3
//! max_delay_ms = 30000
//! ```

use std::path::{Path, PathBuf};

use super::Config;

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "metareview.toml";

impl Config {
    /// Load configuration from a TOML file, without environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }
}

/// `<config dir>/metareview/config.toml`, when the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("metareview").join("config.toml"))
}

/// First existing config file among the local file and the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    default_config_path().filter(|p| p.is_file())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),
}
