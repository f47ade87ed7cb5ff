use crate::error::SourceError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const USER_AGENT: &str = concat!("subfinder/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound GET used by every source. Retries, TLS and proxies are left to
/// the implementation.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> core::result::Result<HttpResponse, SourceError>;
}

/// [`HttpFetch`] over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    http_client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder().user_agent(USER_AGENT).build()?;
        debug!("HTTP Client created: {:?}", http_client);
        Ok(Self::with_client(http_client))
    }

    /// Reuse a client built elsewhere, with its own proxy or TLS settings.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    #[instrument(name = "HTTP_request", level = "info", skip_all, fields(url = url))]
    async fn get(&self, url: &str, timeout: Duration) -> core::result::Result<HttpResponse, SourceError> {
        info!("Sending request");
        let res = match self.http_client.get(url).timeout(timeout).send().await {
            Ok(res) => res,
            Err(err) => {
                error!("Reason: {}", err);
                return Err(transport_error(err, timeout));
            }
        };

        let status = res.status().as_u16();
        info!("Receive with status: {}", status);
        debug!("Response: {:?}", res);

        let body = res.text().await.map_err(|err| transport_error(err, timeout))?;
        Ok(HttpResponse { status, body })
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(timeout.as_millis() as u64)
    } else {
        SourceError::Network(err.to_string())
    }
}
