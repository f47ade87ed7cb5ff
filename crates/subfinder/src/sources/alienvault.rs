use super::{decode_json, QueryContext, Source, SourceOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, instrument};

const ENDPOINT: &str = "https://otx.alienvault.com/api/v1/indicators/domain";

// region:        --- Source info

pub struct AlienVault {}

impl AlienVault {
    pub fn new() -> Self {
        Self {}
    }
}

// endregion:     --- Source info

#[derive(Debug, Deserialize)]
struct PassiveDnsResponse {
    #[serde(default)]
    passive_dns: Vec<PassiveDnsEntry>,
}

#[derive(Debug, Deserialize)]
struct PassiveDnsEntry {
    hostname: String,
}

#[async_trait]
impl Source for AlienVault {
    fn name(&self) -> String {
        "alienvault".to_string()
    }

    fn description(&self) -> String {
        "Use AlienVault OTX passive DNS".to_string()
    }

    #[instrument(name = "enumerate", level = "debug", fields(source = %self.name()), skip_all)]
    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let url = format!(
            "{}/{}/passive_dns",
            ctx.endpoint(ENDPOINT).trim_end_matches('/'),
            ctx.target()
        );
        let body = ctx.get(&url).await?;
        let response: PassiveDnsResponse = decode_json(&body)?;

        let hostnames: HashSet<&str> = response
            .passive_dns
            .iter()
            .map(|entry| entry.hostname.as_str())
            .collect();

        let subdomains: Vec<String> = hostnames.into_iter().map(|host| ctx.report(host)).collect();

        debug!("{} collected", subdomains.len());
        Ok(subdomains)
    }
}
