use super::{build_url, decode_json, QueryContext, Source, SourceOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

const ENDPOINT: &str = "https://www.virustotal.com/vtapi/v2/domain/report";

// region:        --- Source info

pub struct VirusTotal {}

impl VirusTotal {
    pub fn new() -> Self {
        Self {}
    }
}

// endregion:     --- Source info

#[derive(Debug, Deserialize)]
struct DomainReport {
    #[serde(default)]
    subdomains: Vec<String>,
}

#[async_trait]
impl Source for VirusTotal {
    fn name(&self) -> String {
        "virustotal".to_string()
    }

    fn description(&self) -> String {
        "Use the VirusTotal v2 domain report API".to_string()
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    #[instrument(name = "enumerate", level = "debug", fields(source = %self.name()), skip_all)]
    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let Some(api_key) = ctx.api_key() else {
            debug!("No API key, skipping");
            return Ok(Vec::new());
        };

        let url = build_url(
            ctx.endpoint(ENDPOINT),
            &[("apikey", api_key), ("domain", ctx.target().as_str())],
        )?;
        let body = ctx.get(&url).await?;
        let report: DomainReport = decode_json(&body)?;

        let subdomains: Vec<String> = report
            .subdomains
            .iter()
            .map(|subdomain| ctx.report(subdomain))
            .collect();

        debug!("{} collected", subdomains.len());
        Ok(subdomains)
    }
}
