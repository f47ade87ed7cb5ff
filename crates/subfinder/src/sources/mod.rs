pub mod alienvault;
pub mod crtsh;
pub mod hackertarget;
pub mod virustotal;
pub mod web_archive;

use crate::config::{Config, SourceConfig};
use crate::error::SourceError;
use crate::http::HttpFetch;
use crate::model::Target;
use crate::normalize::strip_wildcard;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use self::alienvault::AlienVault;
use self::crtsh::CrtSh;
use self::hackertarget::HackerTarget;
use self::virustotal::VirusTotal;
use self::web_archive::WebArchive;

pub type SourceOutcome = core::result::Result<Vec<String>, SourceError>;

/// A plugin querying one external intelligence source.
///
/// Implementations return raw hostnames with the wildcard prefix removed.
/// Validation and deduplication happen in the aggregator.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> String;
    fn description(&self) -> String;

    /// Sources needing a key are skipped by the orchestrator when none is set.
    fn requires_api_key(&self) -> bool {
        false
    }

    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome;
}

/// A subdomain reported by a source while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub source: String,
    pub subdomain: String,
}

// region:        --- Query context

/// Everything one source call gets: target, its own config, its deadline,
/// the fetch capability and the progress channel.
pub struct QueryContext {
    source: String,
    target: Target,
    config: SourceConfig,
    timeout: Duration,
    fetcher: Arc<dyn HttpFetch>,
    progress: mpsc::UnboundedSender<Progress>,
}

impl QueryContext {
    pub fn new(
        source: String,
        target: Target,
        config: SourceConfig,
        timeout: Duration,
        fetcher: Arc<dyn HttpFetch>,
        progress: mpsc::UnboundedSender<Progress>,
    ) -> Self {
        Self {
            source,
            target,
            config,
            timeout,
            fetcher,
            progress,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn endpoint<'a>(&'a self, default: &'a str) -> &'a str {
        self.config.endpoint.as_deref().unwrap_or(default)
    }

    /// GET `url`, failing on transport errors and non-2xx statuses.
    pub async fn get(&self, url: &str) -> core::result::Result<String, SourceError> {
        let res = self.fetcher.get(url, self.timeout).await?;
        if !res.is_success() {
            return Err(SourceError::HttpStatus(res.status));
        }
        Ok(res.body)
    }

    /// Strip the wildcard marker, notify the orchestrator and hand back the name.
    pub fn report(&self, raw: &str) -> String {
        let subdomain = strip_wildcard(raw.trim()).to_string();
        trace!("Collecting: {:?}", subdomain);
        // receiver gone means the run was cancelled, nothing left to notify
        let _ = self.progress.send(Progress {
            source: self.source.clone(),
            subdomain: subdomain.clone(),
        });
        subdomain
    }
}

// endregion:     --- Query context

// region:        --- Helpers

pub fn decode_json<T: DeserializeOwned>(body: &str) -> core::result::Result<T, SourceError> {
    serde_json::from_str(body).map_err(|err| SourceError::Decode(err.to_string()))
}

pub fn build_url(base: &str, params: &[(&str, &str)]) -> core::result::Result<String, SourceError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|err| SourceError::Network(format!("invalid url {:?}: {}", base, err)))
}

// endregion:     --- Helpers

// region:        --- Registry

pub fn all_sources() -> Vec<Box<dyn Source>> {
    vec![
        Box::new(AlienVault::new()),
        Box::new(CrtSh::new()),
        Box::new(HackerTarget::new()),
        Box::new(VirusTotal::new()),
        Box::new(WebArchive::new()),
    ]
}

/// Sources to run: `include` restricts (empty means all), `exclude` and
/// `enabled: false` in the config remove.
pub fn select(config: &Config, include: &[String], exclude: &[String]) -> Result<Vec<Box<dyn Source>>> {
    let known: Vec<String> = all_sources().iter().map(|source| source.name()).collect();
    if let Some(unknown) = include
        .iter()
        .chain(exclude.iter())
        .find(|name| !known.contains(name))
    {
        return Err(Error::UnknownSource(unknown.clone()));
    }

    Ok(all_sources()
        .into_iter()
        .filter(|source| include.is_empty() || include.contains(&source.name()))
        .filter(|source| !exclude.contains(&source.name()))
        .filter(|source| config.is_enabled(&source.name()))
        .collect())
}

pub fn display_all() {
    println!("\nSources");
    for source in all_sources() {
        let key = if source.requires_api_key() { "[key]" } else { "" };
        println!("- {:15}{:7}{}", source.name(), key, source.description());
    }
}

// endregion:     --- Registry

// region:        --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sources: &[Box<dyn Source>]) -> Vec<String> {
        sources.iter().map(|source| source.name()).collect()
    }

    #[test]
    fn source_names_are_unique() {
        let mut all = names(&all_sources());
        let count = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), count);
    }

    #[test]
    fn select_filters_sources() {
        let config = Config::default().with_source(
            "webarchive",
            SourceConfig {
                enabled: Some(false),
                ..Default::default()
            },
        );

        let sources = select(&config, &[], &["crtsh".to_string()]).unwrap();
        let selected = names(&sources);
        assert!(!selected.contains(&"crtsh".to_string()));
        assert!(!selected.contains(&"webarchive".to_string()));
        assert!(selected.contains(&"virustotal".to_string()));

        let sources = select(&config, &["crtsh".to_string()], &[]).unwrap();
        assert_eq!(names(&sources), vec!["crtsh".to_string()]);
    }

    #[test]
    fn select_rejects_unknown_names() {
        let result = select(&Config::default(), &["shodan".to_string()], &[]);
        assert!(matches!(result, Err(Error::UnknownSource(name)) if name == "shodan"));
    }

    #[test]
    fn build_url_encodes_params() {
        let url = build_url("https://crt.sh/", &[("q", "%.example.com"), ("output", "json")]).unwrap();
        assert_eq!(url, "https://crt.sh/?q=%25.example.com&output=json");
    }
}

// endregion:     --- Tests
