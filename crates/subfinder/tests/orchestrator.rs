use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use subfinder::config::{Config, SourceConfig};
use subfinder::http::{HttpFetch, HttpResponse};
use subfinder::model::Target;
use subfinder::orchestrator::Orchestrator;
use subfinder::sources::{Progress, QueryContext, Source, SourceOutcome};
use subfinder::SourceError;

// region:        --- Stubs

/// Fetcher that answers every GET with the same response.
struct StaticFetcher {
    status: u16,
    body: String,
}

#[async_trait]
impl HttpFetch for StaticFetcher {
    async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, SourceError> {
        Ok(HttpResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Fetcher whose requests never complete.
struct HangingFetcher;

#[async_trait]
impl HttpFetch for HangingFetcher {
    async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, SourceError> {
        futures::future::pending().await
    }
}

fn fetcher() -> Arc<dyn HttpFetch> {
    Arc::new(StaticFetcher {
        status: 200,
        body: String::new(),
    })
}

enum Behavior {
    Return(Vec<&'static str>),
    Fail(SourceError),
    ReportThenHang(Vec<&'static str>),
    Fetch,
    Panic,
    /// Fetches while holding state whose `Drop` panics.
    FetchWithBrokenGuard,
}

struct StubSource {
    name: &'static str,
    behavior: Behavior,
    needs_key: bool,
    dropped: Option<Arc<AtomicBool>>,
}

impl StubSource {
    fn boxed(name: &'static str, behavior: Behavior) -> Box<dyn Source> {
        Box::new(Self {
            name,
            behavior,
            needs_key: false,
            dropped: None,
        })
    }
}

/// Flags the source future as dropped, whether it completed or got cancelled.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct BrokenGuard;

impl Drop for BrokenGuard {
    fn drop(&mut self) {
        panic!("guard exploded");
    }
}

#[async_trait]
impl Source for StubSource {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn description(&self) -> String {
        "stub".to_string()
    }

    fn requires_api_key(&self) -> bool {
        self.needs_key
    }

    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let _flag = self.dropped.clone().map(DropFlag);
        match &self.behavior {
            Behavior::Return(names) => Ok(names.iter().map(|name| name.to_string()).collect()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::ReportThenHang(names) => {
                for name in names {
                    ctx.report(name);
                }
                futures::future::pending().await
            }
            Behavior::Fetch => {
                let body = ctx.get("http://stub.invalid/").await?;
                Ok(body.lines().map(str::to_string).collect())
            }
            Behavior::Panic => panic!("stub exploded"),
            Behavior::FetchWithBrokenGuard => {
                let _guard = BrokenGuard;
                let body = ctx.get("http://stub.invalid/").await?;
                Ok(body.lines().map(str::to_string).collect())
            }
        }
    }
}

// endregion:     --- Stubs

fn target() -> Target {
    Target::parse("example.com").unwrap()
}

fn names(result: &subfinder::model::AggregateResult) -> Vec<&str> {
    result.subdomains.iter().map(|subdomain| subdomain.as_str()).collect()
}

#[tokio::test]
async fn merges_results_and_records_failures() {
    let sources = vec![
        StubSource::boxed("first", Behavior::Return(vec!["a.example.com"])),
        StubSource::boxed("broken", Behavior::Fail(SourceError::Network("reset".into()))),
        StubSource::boxed(
            "second",
            Behavior::Return(vec!["a.example.com", "b.example.com"]),
        ),
    ];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &Config::default(), sources)
        .await;

    assert_eq!(names(&result), vec!["a.example.com", "b.example.com"]);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors.get("broken"),
        Some(&SourceError::Network("reset".into()))
    );
    assert_eq!(result.sources["first"], 1);
    assert_eq!(result.sources["second"], 2);
    assert_eq!(result.sources["broken"], 0);
}

#[tokio::test]
async fn zero_sources_is_an_empty_result() {
    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &Config::default(), Vec::new())
        .await;

    assert!(result.is_empty());
    assert!(result.errors.is_empty());
    assert!(result.skipped.is_empty());
}

#[tokio::test]
async fn every_source_failing_is_not_fatal() {
    let sources = vec![
        StubSource::boxed("a", Behavior::Fail(SourceError::HttpStatus(503))),
        StubSource::boxed("b", Behavior::Fail(SourceError::Decode("eof".into()))),
    ];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &Config::default(), sources)
        .await;

    assert!(result.is_empty());
    assert_eq!(result.errors.len(), 2);
}

#[tokio::test]
async fn hanging_sources_are_bounded_by_the_largest_timeout() {
    let config = Config::default().with_timeout_ms(300);
    let sources = vec![
        StubSource::boxed("one", Behavior::Fetch),
        StubSource::boxed("two", Behavior::Fetch),
        StubSource::boxed("three", Behavior::Fetch),
        StubSource::boxed("fast", Behavior::Return(vec!["fast.example.com"])),
    ];

    let started = Instant::now();
    let result = Orchestrator::new(Arc::new(HangingFetcher))
        .enumerate(&target(), &config, sources)
        .await;
    let elapsed = started.elapsed();

    // sequential deadlines would take 900ms
    assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800), "{:?}", elapsed);
    assert_eq!(names(&result), vec!["fast.example.com"]);
    for source in ["one", "two", "three"] {
        assert_eq!(result.errors.get(source), Some(&SourceError::Timeout(300)));
    }
}

#[tokio::test]
async fn timeouts_are_per_source() {
    let config = Config::default()
        .with_timeout_ms(5000)
        .with_source(
            "stuck",
            SourceConfig {
                timeout_ms: Some(100),
                ..Default::default()
            },
        );
    let sources = vec![StubSource::boxed("stuck", Behavior::Fetch)];

    let started = Instant::now();
    let result = Orchestrator::new(Arc::new(HangingFetcher))
        .enumerate(&target(), &config, sources)
        .await;

    assert!(started.elapsed() < Duration::from_millis(2000));
    assert_eq!(result.errors.get("stuck"), Some(&SourceError::Timeout(100)));
}

#[tokio::test]
async fn timed_out_source_keeps_what_it_reported() {
    let config = Config::default().with_timeout_ms(150);
    let sources = vec![StubSource::boxed(
        "partial",
        Behavior::ReportThenHang(vec!["*.a.example.com", "evil.com"]),
    )];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &config, sources)
        .await;

    assert_eq!(names(&result), vec!["a.example.com"]);
    assert_eq!(result.errors.get("partial"), Some(&SourceError::Timeout(150)));
    assert_eq!(result.rejected, 1);
}

#[tokio::test]
async fn missing_api_key_is_a_skip_not_an_error() {
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(StubSource {
            name: "keyed",
            behavior: Behavior::Return(vec!["secret.example.com"]),
            needs_key: true,
            dropped: None,
        }),
        StubSource::boxed("open", Behavior::Return(vec!["open.example.com"])),
    ];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &Config::default(), sources)
        .await;

    assert_eq!(names(&result), vec!["open.example.com"]);
    assert!(result.errors.is_empty());
    assert_eq!(
        result.skipped.get("keyed"),
        Some(&SourceError::ConfigMissing("api_key".into()))
    );
}

#[tokio::test]
async fn configured_api_key_runs_the_source() {
    let config = Config::default().with_source(
        "keyed",
        SourceConfig {
            api_key: Some("k".into()),
            ..Default::default()
        },
    );
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StubSource {
        name: "keyed",
        behavior: Behavior::Return(vec!["secret.example.com"]),
        needs_key: true,
        dropped: None,
    })];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &config, sources)
        .await;

    assert_eq!(names(&result), vec!["secret.example.com"]);
    assert!(result.skipped.is_empty());
}

#[tokio::test]
async fn panicking_source_is_isolated() {
    let sources = vec![
        StubSource::boxed("boom", Behavior::Panic),
        StubSource::boxed("fine", Behavior::Return(vec!["ok.example.com"])),
    ];

    let result = Orchestrator::new(fetcher())
        .enumerate(&target(), &Config::default(), sources)
        .await;

    assert_eq!(names(&result), vec!["ok.example.com"]);
    assert_eq!(
        result.errors.get("boom"),
        Some(&SourceError::Panicked("stub exploded".into()))
    );
}

#[tokio::test]
async fn panic_while_dropping_a_timed_out_source_is_recorded() {
    let config = Config::default().with_timeout_ms(100);
    let sources = vec![
        StubSource::boxed("brittle", Behavior::FetchWithBrokenGuard),
        StubSource::boxed("fine", Behavior::Return(vec!["ok.example.com"])),
    ];

    let result = Orchestrator::new(Arc::new(HangingFetcher))
        .enumerate(&target(), &config, sources)
        .await;

    assert_eq!(names(&result), vec!["ok.example.com"]);
    assert_eq!(
        result.errors.get("brittle"),
        Some(&SourceError::Panicked("guard exploded".into()))
    );
    assert_eq!(result.sources.get("brittle"), Some(&0));
}

#[tokio::test]
async fn http_status_surfaces_per_source() {
    let fetcher = Arc::new(StaticFetcher {
        status: 429,
        body: "slow down".into(),
    });
    let sources = vec![StubSource::boxed("limited", Behavior::Fetch)];

    let result = Orchestrator::new(fetcher)
        .enumerate(&target(), &Config::default(), sources)
        .await;

    assert_eq!(result.errors.get("limited"), Some(&SourceError::HttpStatus(429)));
}

#[tokio::test]
async fn progress_events_reach_the_handler() {
    let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);
    let orchestrator = Orchestrator::new(fetcher()).with_progress(Arc::new(move |progress: &Progress| {
        handler_seen.lock().unwrap().push(progress.clone());
    }));

    let config = Config::default().with_timeout_ms(100);
    let sources = vec![StubSource::boxed(
        "talkative",
        Behavior::ReportThenHang(vec!["x.example.com", "y.example.com"]),
    )];
    orchestrator.enumerate(&target(), &config, sources).await;

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            Progress {
                source: "talkative".into(),
                subdomain: "x.example.com".into()
            },
            Progress {
                source: "talkative".into(),
                subdomain: "y.example.com".into()
            },
        ]
    );
}

#[tokio::test]
async fn orchestrator_is_reusable_across_targets() {
    let orchestrator = Orchestrator::new(fetcher());

    let first = orchestrator
        .enumerate(
            &target(),
            &Config::default(),
            vec![StubSource::boxed("s", Behavior::Return(vec!["a.example.com", "a.example.org"]))],
        )
        .await;
    let other = Target::parse("example.org").unwrap();
    let second = orchestrator
        .enumerate(
            &other,
            &Config::default(),
            vec![StubSource::boxed("s", Behavior::Return(vec!["a.example.com", "a.example.org"]))],
        )
        .await;

    assert_eq!(names(&first), vec!["a.example.com"]);
    assert_eq!(names(&second), vec!["a.example.org"]);
}

#[tokio::test]
async fn dropping_the_run_cancels_sources() {
    let dropped = Arc::new(AtomicBool::new(false));
    let config = Config::default().with_timeout_ms(60_000);
    let sources: Vec<Box<dyn Source>> = vec![Box::new(StubSource {
        name: "forever",
        behavior: Behavior::Fetch,
        needs_key: false,
        dropped: Some(Arc::clone(&dropped)),
    })];
    let orchestrator = Orchestrator::new(Arc::new(HangingFetcher));
    let target = target();

    let run = orchestrator.enumerate(&target, &config, sources);
    let outcome = tokio::time::timeout(Duration::from_millis(100), run).await;
    assert!(outcome.is_err());

    // aborted tasks are dropped on their next scheduling
    for _ in 0..50 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped.load(Ordering::SeqCst));
}
