use crate::model::{Subdomain, Target};
use lazy_regex::regex;

const MAX_HOSTNAME_LEN: usize = 253;

/// Drop everything up to and including the first `*.` marker.
pub fn strip_wildcard(raw: &str) -> &str {
    match raw.split_once("*.") {
        Some((_, rest)) => rest,
        None => raw,
    }
}

/// Labels of 1 to 63 chars, `_` tolerated since some sources report SRV-like names.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    let label_regex = regex!(r"^[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?$");
    hostname.split('.').all(|label| label_regex.is_match(label))
}

/// Canonicalize a raw hostname reported by a source, `None` when it does not
/// belong to `target`.
pub fn normalize(raw: &str, target: &Target) -> Option<Subdomain> {
    let trimmed = raw.trim();
    let hostname = strip_wildcard(trimmed)
        .trim()
        .trim_end_matches('.')
        .to_lowercase();

    if !is_valid_hostname(&hostname) {
        return None;
    }

    let target = target.as_str();
    let belongs = hostname == target
        || hostname
            .strip_suffix(target)
            .is_some_and(|prefix| prefix.ends_with('.'));

    if belongs {
        Some(Subdomain::new_unchecked(hostname))
    } else {
        None
    }
}

// region:        --- Tests


// endregion:     --- Tests
