use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::error::SourceError;
use crate::http::HttpFetch;
use crate::model::{AggregateResult, SourceResult, Target};
use crate::sources::{Progress, QueryContext, Source};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

pub type ProgressHandler = Arc<dyn Fn(&Progress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Draining,
    Done,
}

impl RunState {
    fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Running)
                | (RunState::Running, RunState::Draining)
                | (RunState::Draining, RunState::Done)
        )
    }
}

/// State of one `enumerate` call.
struct Run {
    state: RunState,
}

impl Run {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        if !self.state.can_advance_to(next) {
            error!("Invalid transition {:?} -> {:?}, ignored", self.state, next);
            return;
        }
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Fans out to every source with its own deadline and merges what comes back.
///
/// Holds no per-run state: `enumerate` can be called repeatedly, or
/// concurrently for different targets. Dropping the `enumerate` future aborts
/// every source task still running.
pub struct Orchestrator {
    fetcher: Arc<dyn HttpFetch>,
    progress: Option<ProgressHandler>,
}

// region:        --- Constructors

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            fetcher,
            progress: None,
        }
    }

    /// `handler` runs on the orchestrating task only, one event at a time.
    pub fn with_progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }
}

// endregion:     --- Constructors

impl Orchestrator {
    #[instrument(name = "enumerate", level = "info", skip_all, fields(target = %target))]
    pub async fn enumerate(
        &self,
        target: &Target,
        config: &Config,
        sources: Vec<Box<dyn Source>>,
    ) -> AggregateResult {
        let started = Instant::now();
        let mut run = Run::new();
        let aggregator = Aggregator::new(target.clone());
        let mut skipped = BTreeMap::new();

        // Idle -> Running
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        // a task that dies outside `run_source` only leaves its id behind
        let mut names: HashMap<task::Id, String> = HashMap::new();
        for source in sources {
            let name = source.name();
            if source.requires_api_key() && config.api_key(&name).is_none() {
                info!("{}: no API key, skipped", name);
                skipped.insert(name, SourceError::ConfigMissing("api_key".into()));
                continue;
            }

            let timeout = config.timeout_for(&name);
            let ctx = QueryContext::new(
                name.clone(),
                target.clone(),
                config.source(&name),
                timeout,
                Arc::clone(&self.fetcher),
                progress_tx.clone(),
            );
            debug!("{}: spawned with {:?} timeout", name, timeout);
            let handle = tasks.spawn(run_source(name.clone(), source, ctx));
            names.insert(handle.id(), name);
        }
        // the sources hold the remaining senders
        drop(progress_tx);
        run.advance(RunState::Running);
        info!("{} sources running, {} skipped", tasks.len(), skipped.len());

        loop {
            tokio::select! {
                Some(progress) = progress_rx.recv() => {
                    self.on_progress(&aggregator, progress).await;
                }
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((id, result))) => {
                        names.remove(&id);
                        log_result(&result);
                        aggregator.add_result(result).await;
                    }
                    Some(Err(err)) => match names.remove(&err.id()) {
                        Some(name) => {
                            let result = lost_task(name, err);
                            log_result(&result);
                            aggregator.add_result(result).await;
                        }
                        None => error!("Source task lost: {}", err),
                    },
                    None => break,
                },
            }
        }

        // Running -> Draining
        run.advance(RunState::Draining);
        while let Ok(progress) = progress_rx.try_recv() {
            self.on_progress(&aggregator, progress).await;
        }

        // Draining -> Done
        let result = aggregator.into_result(skipped, started.elapsed()).await;
        run.advance(RunState::Done);
        info!(
            "{} subdomains, {} failed sources in {}ms",
            result.subdomains.len(),
            result.errors.len(),
            result.elapsed_ms
        );
        result
    }

    async fn on_progress(&self, aggregator: &Aggregator, progress: Progress) {
        if let Some(handler) = &self.progress {
            handler(&progress);
        }
        aggregator.add(&progress.source, [progress.subdomain.as_str()], None).await;
    }
}

/// One source under its own deadline. A timeout drops the source future,
/// which aborts its in-flight request.
async fn run_source(name: String, source: Box<dyn Source>, ctx: QueryContext) -> SourceResult {
    let timeout = ctx.timeout();
    let call = AssertUnwindSafe(source.enumerate(&ctx)).catch_unwind();

    let outcome = match time::timeout(timeout, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => Err(SourceError::Panicked(panic_reason(panic))),
        Err(_) => Err(SourceError::Timeout(timeout.as_millis() as u64)),
    };

    match outcome {
        Ok(subdomains) => SourceResult {
            source: name,
            subdomains,
            error: None,
        },
        Err(err) => SourceResult {
            source: name,
            subdomains: Vec::new(),
            error: Some(err),
        },
    }
}

/// A task that panicked past `catch_unwind`, e.g. in a `Drop` run on timeout.
fn lost_task(name: String, err: JoinError) -> SourceResult {
    let reason = if err.is_panic() {
        panic_reason(err.into_panic())
    } else {
        err.to_string()
    };
    SourceResult {
        source: name,
        subdomains: Vec::new(),
        error: Some(SourceError::Panicked(reason)),
    }
}

fn panic_reason(panic: Box<dyn Any + Send>) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_result(result: &SourceResult) {
    match &result.error {
        Some(err) => warn!("{}: {}", result.source, err),
        None => info!("{}: {} found", result.source, result.subdomains.len()),
    }
}

// region:        --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_states_only_move_forward() {
        assert!(RunState::Idle.can_advance_to(RunState::Running));
        assert!(RunState::Running.can_advance_to(RunState::Draining));
        assert!(RunState::Draining.can_advance_to(RunState::Done));

        assert!(!RunState::Idle.can_advance_to(RunState::Done));
        assert!(!RunState::Done.can_advance_to(RunState::Idle));
        assert!(!RunState::Running.can_advance_to(RunState::Running));
    }

    #[tokio::test]
    async fn lost_task_keeps_the_source_name() {
        let err = tokio::spawn(async { panic!("late") }).await.unwrap_err();

        let result = lost_task("gone".into(), err);
        assert_eq!(result.source, "gone");
        assert_eq!(result.error, Some(SourceError::Panicked("late".into())));
    }
}

// endregion:     --- Tests
