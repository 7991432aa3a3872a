//! MX record check for scraped addresses.
//!
//! A domain without a mail exchanger cannot receive the outreach email, so
//! the harvester drops such addresses before storing them.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tracing::debug;

/// Per-query DNS timeout; two attempts keep a lookup under ~8s.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(4);

/// Answers whether a mail domain accepts email.
#[async_trait]
pub trait MxVerifier: Send + Sync {
    /// `true` when `domain` has at least one MX record. Lookup failures
    /// count as `false`.
    async fn has_mx(&self, domain: &str) -> bool;
}

/// [`MxVerifier`] backed by the system DNS resolver.
pub struct DnsMxVerifier {
    resolver: TokioAsyncResolver,
}

impl DnsMxVerifier {
    /// Use the system resolver configuration, or public defaults when it
    /// cannot be read.
    pub fn new() -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|e| {
                debug!(error = %e, "no system resolver config, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            });
        opts.timeout = LOOKUP_TIMEOUT;
        opts.attempts = 2;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl Default for DnsMxVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MxVerifier for DnsMxVerifier {
    async fn has_mx(&self, domain: &str) -> bool {
        // Trailing dot: never append search domains.
        match self.resolver.mx_lookup(format!("{domain}.")).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(e) => {
                debug!(%domain, error = %e, "MX lookup failed");
                false
            }
        }
    }
}

/// Domain part of an address, lower-cased.
pub fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
}
