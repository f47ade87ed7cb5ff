use super::{build_url, decode_json, QueryContext, Source, SourceOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, instrument};

const ENDPOINT: &str = "https://crt.sh/";

// region:        --- Source info

pub struct CrtSh {}

impl CrtSh {
    pub fn new() -> Self {
        Self {}
    }
}

// endregion:     --- Source info

#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
}

#[async_trait]
impl Source for CrtSh {
    fn name(&self) -> String {
        "crtsh".to_string()
    }

    fn description(&self) -> String {
        "Use crt.sh/ certificate transparency logs".to_string()
    }

    #[instrument(name = "enumerate", level = "debug", fields(source = %self.name()), skip_all)]
    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let query = format!("%.{}", ctx.target());
        let url = build_url(ctx.endpoint(ENDPOINT), &[("q", query.as_str()), ("output", "json")])?;
        let body = ctx.get(&url).await?;
        let entries: Vec<CrtShEntry> = decode_json(&body)?;

        // one certificate may list several names, one per line
        let names: HashSet<&str> = entries
            .iter()
            .flat_map(|entry| entry.name_value.split('\n'))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        let subdomains: Vec<String> = names.into_iter().map(|name| ctx.report(name)).collect();

        debug!("{} collected", subdomains.len());
        Ok(subdomains)
    }
}
