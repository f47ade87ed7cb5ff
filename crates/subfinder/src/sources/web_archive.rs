use super::{build_url, decode_json, QueryContext, Source, SourceOutcome};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

const ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

// region:        --- Source info

pub struct WebArchive {}

impl WebArchive {
    pub fn new() -> Self {
        Self {}
    }
}

// endregion:     --- Source info

/// Rows of captured urls, the first one being the `["original"]` header.
#[derive(Debug, Deserialize)]
struct WebArchiveResponse(Vec<Vec<String>>);

#[async_trait]
impl Source for WebArchive {
    fn name(&self) -> String {
        "webarchive".to_string()
    }

    fn description(&self) -> String {
        "Use web.archive.org captures".to_string()
    }

    #[instrument(name = "enumerate", level = "debug", fields(source = %self.name()), skip_all)]
    async fn enumerate(&self, ctx: &QueryContext) -> SourceOutcome {
        let mut params = vec![
            ("url", ctx.target().to_string()),
            ("output", "json".to_string()),
            ("matchType", "domain".to_string()),
            ("fl", "original".to_string()),
            ("collapse", "urlkey".to_string()),
        ];
        // optional cap on the captures returned, `"limit": 500` in the config
        if let Some(limit) = ctx.config().extra.get("limit").and_then(|limit| limit.as_u64()) {
            params.push(("limit", limit.to_string()));
        }
        let params: Vec<(&str, &str)> = params
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        let url = build_url(ctx.endpoint(ENDPOINT), &params)?;
        let body = ctx.get(&url).await?;

        // no capture at all comes back as an empty body
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let response: WebArchiveResponse = decode_json(&body)?;

        let hosts: HashSet<String> = response
            .0
            .into_iter()
            .flatten()
            .filter(|url| url != "original")
            .filter_map(|url| match Url::parse(&url) {
                Ok(parsed_url) => parsed_url.host_str().map(|host| host.to_string()),
                Err(_) => {
                    warn!("Parsing url: {:?}", url);
                    None
                }
            })
            .collect();

        let subdomains: Vec<String> = hosts.iter().map(|host| ctx.report(host)).collect();

        debug!("{} collected", subdomains.len());
        Ok(subdomains)
    }
}
