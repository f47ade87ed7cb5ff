use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// timeouts
pub const DEFAULT_TIMEOUT_MS: u64 = 10000;

/// Run configuration, usually loaded from a `config.json` file.
///
/// ```json
/// {
///   "timeout_ms": 10000,
///   "sources": {
///     "virustotal": { "api_key": "..." },
///     "crtsh": { "timeout_ms": 30000 },
///     "webarchive": { "enabled": false }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timeout_ms: u64,
    pub sources: BTreeMap<String, SourceConfig>,
}

/// Per-source settings. Unknown keys are kept in `extra` for the source to use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            sources: BTreeMap::new(),
        }
    }
}

// region:        --- Constructors

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("Config loaded from {:?}: {} sources", path, config.sources.len());
        Ok(config)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_source(mut self, name: &str, source: SourceConfig) -> Self {
        self.sources.insert(name.to_string(), source);
        self
    }
}

// endregion:     --- Constructors

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be greater than 0".into()));
        }
        for (name, source) in &self.sources {
            if source.timeout_ms == Some(0) {
                return Err(Error::Config(format!(
                    "sources.{}.timeout_ms must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Settings of one source, default ones when it is not configured.
    pub fn source(&self, name: &str) -> SourceConfig {
        self.sources.get(name).cloned().unwrap_or_default()
    }

    /// Empty keys count as absent.
    pub fn api_key(&self, name: &str) -> Option<&str> {
        self.sources
            .get(name)
            .and_then(|source| source.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.sources
            .get(name)
            .and_then(|source| source.enabled)
            .unwrap_or(true)
    }

    pub fn timeout_for(&self, name: &str) -> Duration {
        let timeout_ms = self
            .sources
            .get(name)
            .and_then(|source| source.timeout_ms)
            .unwrap_or(self.timeout_ms);
        Duration::from_millis(timeout_ms)
    }
}

// region:        --- Tests


// endregion:     --- Tests
