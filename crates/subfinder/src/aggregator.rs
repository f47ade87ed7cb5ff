use crate::error::SourceError;
use crate::model::{AggregateResult, SourceResult, Subdomain, Target};
use crate::normalize::normalize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct Inner {
    subdomains: BTreeSet<Subdomain>,
    errors: BTreeMap<String, SourceError>,
    per_source: BTreeMap<String, HashSet<Subdomain>>,
    rejected: HashSet<String>,
}

/// Deduplicating collector shared by every source task. Cloning is cheap and
/// every clone feeds the same set.
#[derive(Debug, Clone)]
pub struct Aggregator {
    target: Target,
    inner: Arc<Mutex<Inner>>,
}

impl Aggregator {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Normalize and merge `subdomains` reported by `source`. Insertion is
    /// commutative and idempotent.
    pub async fn add<I, S>(&self, source: &str, subdomains: I, err: Option<SourceError>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // normalize outside the lock
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for raw in subdomains {
            let raw = raw.as_ref();
            match normalize(raw, &self.target) {
                Some(subdomain) => accepted.push(subdomain),
                None => {
                    trace!("{}: rejected {:?}", source, raw);
                    rejected.push(raw.to_string());
                }
            }
        }

        let mut inner = self.inner.lock().await;
        let contributed = inner.per_source.entry(source.to_string()).or_default();
        contributed.extend(accepted.iter().cloned());
        inner.subdomains.extend(accepted);
        inner.rejected.extend(rejected);
        if let Some(err) = err {
            inner.errors.insert(source.to_string(), err);
        }
    }

    pub async fn add_result(&self, result: SourceResult) {
        self.add(&result.source, result.subdomains, result.error).await
    }

    /// Sorted unique subdomains and the error of every failed source.
    pub async fn snapshot(&self) -> (Vec<Subdomain>, BTreeMap<String, SourceError>) {
        let inner = self.inner.lock().await;
        (
            inner.subdomains.iter().cloned().collect(),
            inner.errors.clone(),
        )
    }

    pub async fn source_counts(&self) -> BTreeMap<String, usize> {
        let inner = self.inner.lock().await;
        inner
            .per_source
            .iter()
            .map(|(source, found)| (source.clone(), found.len()))
            .collect()
    }

    pub async fn into_result(
        self,
        skipped: BTreeMap<String, SourceError>,
        elapsed: Duration,
    ) -> AggregateResult {
        let (subdomains, errors) = self.snapshot().await;
        let sources = self.source_counts().await;
        let rejected = self.inner.lock().await.rejected.len();

        AggregateResult {
            target: self.target,
            subdomains,
            errors,
            skipped,
            sources,
            rejected,
            elapsed_ms: elapsed.as_millis() as u64,
            resolved: Vec::new(),
        }
    }
}

// region:        --- Tests


// endregion:     --- Tests
