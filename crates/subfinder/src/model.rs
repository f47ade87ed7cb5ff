use crate::error::SourceError;
use crate::normalize::is_valid_hostname;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::to_string_pretty;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// region:        --- Models

/// Domain under enumeration, lowercase without trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let domain = raw.trim().trim_end_matches('.').to_lowercase();

        if domain.is_empty() {
            return Err(Error::InvalidTarget("empty target".into()));
        }
        if !domain.contains('.') || !is_valid_hostname(&domain) {
            return Err(Error::InvalidTarget(format!("{:?} is not a domain", raw)));
        }

        Ok(Self(domain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl core::fmt::Display for Target {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// A normalized hostname that belongs to the target. See [`crate::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Subdomain(String);

impl Subdomain {
    pub(crate) fn new_unchecked(hostname: String) -> Self {
        Self(hostname)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Subdomain {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// What one source task produced.
#[derive(Debug)]
pub struct SourceResult {
    pub source: String,
    pub subdomains: Vec<String>,
    pub error: Option<SourceError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    pub domain: Subdomain,
    pub ips: Vec<IpAddr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub target: Target,
    pub subdomains: Vec<Subdomain>,
    pub errors: BTreeMap<String, SourceError>,
    pub skipped: BTreeMap<String, SourceError>,
    /// Unique valid subdomains contributed by each source that ran
    pub sources: BTreeMap<String, usize>,
    pub rejected: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolved: Vec<Resolved>,
}

impl AggregateResult {
    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
    }
}

// endregion:     --- Models

// region:        --- Exporting utils

pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        Ok(false)
    } else {
        fs::create_dir_all(dir)?;
        Ok(true)
    }
}

pub fn export_to_json(result: &AggregateResult, path: &Path) -> Result<()> {
    let json = to_string_pretty(result)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

pub fn export_to_markdown(result: &AggregateResult, path: &Path) -> Result<()> {
    let md_content = render_markdown(result)?;
    let mut file = File::create(path)?;
    file.write_all(md_content.as_bytes())?;
    Ok(())
}

fn render_markdown(result: &AggregateResult) -> Result<String> {
    let generated_at = OffsetDateTime::now_utc().format(&Rfc3339)?;

    let mut md_content = String::new();
    writeln!(&mut md_content, "# Subdomains of `{}`", result.target)?;
    writeln!(&mut md_content)?;
    writeln!(
        &mut md_content,
        "*Generated at {} in {}ms, {} unique subdomains.*",
        generated_at,
        result.elapsed_ms,
        result.subdomains.len()
    )?;

    writeln!(&mut md_content)?;
    writeln!(&mut md_content, "## Subdomains")?;
    writeln!(&mut md_content)?;
    if result.subdomains.is_empty() {
        writeln!(&mut md_content, "No subdomain found")?;
    }
    for subdomain in &result.subdomains {
        writeln!(&mut md_content, "- {}", subdomain)?;
    }

    if !result.resolved.is_empty() {
        writeln!(&mut md_content)?;
        writeln!(&mut md_content, "## Resolved")?;
        writeln!(&mut md_content)?;
        for host in &result.resolved {
            let ips: Vec<String> = host.ips.iter().map(|ip| ip.to_string()).collect();
            writeln!(&mut md_content, "- {} ({})", host.domain, ips.join(", "))?;
        }
    }

    writeln!(&mut md_content)?;
    writeln!(&mut md_content, "## Sources")?;
    writeln!(&mut md_content)?;
    writeln!(&mut md_content, "| Source | Found | Status |")?;
    writeln!(&mut md_content, "|--------|-------|--------|")?;
    for (source, found) in &result.sources {
        let status = match result.errors.get(source) {
            Some(err) => err.to_string(),
            None => "ok".to_string(),
        };
        writeln!(&mut md_content, "| {} | {} | {} |", source, found, status)?;
    }
    for (source, reason) in &result.skipped {
        writeln!(&mut md_content, "| {} | - | skipped ({}) |", source, reason)?;
    }

    Ok(md_content)
}

// endregion:     --- Exporting utils

// region:        --- Tests


// endregion:     --- Tests
