use crate::model::{Resolved, Subdomain};
use futures::{stream, StreamExt};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument};

// timeouts
pub const RESOLVE_DNS_TIMEOUT_MS: u64 = 4000;

// concurrency numbers
const RESOLVE_DNS_CONCURRENCY: usize = 100;

pub type DnsResolver = Arc<TokioAsyncResolver>;

pub fn new_resolver() -> DnsResolver {
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_millis(RESOLVE_DNS_TIMEOUT_MS);
    debug!("DNS resolver options: {:?}", opts);
    let dns_resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

    debug!("DNS resolver created: {:?}", dns_resolver);
    Arc::new(dns_resolver)
}

pub async fn resolves(dns_resolver: &DnsResolver, domain: Subdomain) -> Option<Resolved> {
    match dns_resolver.lookup_ip(domain.as_str()).await {
        Ok(lookup_ip) => {
            debug!("{:?}", lookup_ip);
            let mut ips: Vec<_> = lookup_ip.iter().collect();
            ips.sort();
            ips.dedup();
            Some(Resolved { domain, ips })
        }
        Err(err) => {
            debug!("{:?}", err);
            None
        }
    }
}

/// Keep the names that resolve, sorted like the input.
#[instrument(name = "resolves", level = "info", skip_all)]
pub async fn resolve_all(dns_resolver: &DnsResolver, subdomains: &[Subdomain]) -> Vec<Resolved> {
    let mut resolved: Vec<Resolved> = stream::iter(subdomains.iter().cloned())
        .map(|domain| resolves(dns_resolver, domain))
        .buffer_unordered(RESOLVE_DNS_CONCURRENCY)
        .filter_map(|domain| async move { domain })
        .collect()
        .await;
    resolved.sort_by(|a, b| a.domain.cmp(&b.domain));

    info!("{}/{} domains resolved", resolved.len(), subdomains.len());
    resolved
}
