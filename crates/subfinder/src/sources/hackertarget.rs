use super::{build_url, QueryContext, Source, SourceOutcome};
use crate::error::SourceError;
use async_trait::async_trait;
use tracing::{debug, instrument};

const ENDPOINT: &str = "https://api.hackertarget.com/hostsearch/";

// region:        --- Source info

pub struct HackerTarget {}

impl HackerTarget {
    pub fn new() -> Self {
        Self {}
    }
}

// endregion:     --- Source info

/// Body is `host,ip` lines, errors come back as plain text with a 200.
fn parse_hostsearch(body: &str) -> Result<Vec<&str>, SourceError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let lowered = body.to_lowercase();
    if lowered.starts_with("error") || lowered.starts_with("api count exceeded") {
        return Err(SourceError::Decode(body.lines().next().unwrap_or_default().to_string()));
    }

    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(',') {
            Some((host, _)) => Ok(host),
            None => Err(SourceError::Decode(format!("unexpected line {:?}", line))),
        })
        .collect()
}

#[async_trait]
impl Source for HackerTarget {
    fn name(&self) -> String {
        "hackertarget".to_string()
    }

    fn description(&self) -> String {
        "Use the hackertarget.com host search (key optional)".to_string()
    }

    #[instrument(name = "enumerate", level = "debug", fields(source = %self.name()), skip_all)]
    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let mut params = vec![("q", ctx.target().as_str())];
        if let Some(api_key) = ctx.api_key() {
            params.push(("apikey", api_key));
        }
        let url = build_url(ctx.endpoint(ENDPOINT), &params)?;
        let body = ctx.get(&url).await?;

        let subdomains: Vec<String> = parse_hostsearch(&body)?
            .into_iter()
            .map(|host| ctx.report(host))
            .collect();

        debug!("{} collected", subdomains.len());
        Ok(subdomains)
    }
}
