//! Mail server resolution using hickory-resolver
//!
//! Answers one question for the verifier: does a domain have somewhere to
//! deliver mail (MX, falling back to A)? Transient resolver failures are
//! retried; a definitive "no records" answer is not.

use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
    AsyncResolver, TokioAsyncResolver,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a single lookup produced no usable answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The resolver answered authoritatively that no such records exist
    #[error("no records found")]
    NoRecords,
    /// Timeout, SERVFAIL, network failure and anything else worth retrying
    #[error("transient resolution failure: {0}")]
    Transient(String),
}

impl From<ResolveError> for LookupError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => LookupError::NoRecords,
            _ => LookupError::Transient(err.to_string()),
        }
    }
}

/// DNS queries the verifier depends on
#[async_trait]
pub trait MailDns: Send + Sync {
    /// Mail exchanger host names, in the order the resolver returned them
    async fn mx_hosts(&self, domain: &str) -> Result<Vec<String>, LookupError>;

    /// Whether the domain has at least one A record
    async fn has_a_records(&self, domain: &str) -> Result<bool, LookupError>;
}

/// hickory-backed resolver with a fixed per-lookup lifetime
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    lookup_timeout: Duration,
}

impl DnsResolver {
    /// Create a new DNS resolver
    ///
    /// # Arguments
    /// * `timeout_ms` - Lifetime of a single lookup in milliseconds
    /// * `cache_size` - Number of entries to cache
    pub fn new(timeout_ms: u64, cache_size: usize) -> Self {
        info!("Initializing DNS resolver with Cloudflare DNS");

        let lookup_timeout = Duration::from_millis(timeout_ms);

        let mut opts = ResolverOpts::default();
        opts.timeout = lookup_timeout;
        // retries are driven by has_mail_server so the pause between them is observable
        opts.attempts = 1;
        opts.cache_size = cache_size;
        opts.negative_min_ttl = Some(Duration::from_secs(30));
        opts.positive_max_ttl = Some(Duration::from_secs(3600));

        let resolver = AsyncResolver::tokio(ResolverConfig::cloudflare(), opts);

        info!(
            "DNS resolver initialized - timeout: {}ms, cache_size: {}",
            timeout_ms, cache_size
        );

        Self {
            resolver,
            lookup_timeout,
        }
    }
}

#[async_trait]
impl MailDns for DnsResolver {
    async fn mx_hosts(&self, domain: &str) -> Result<Vec<String>, LookupError> {
        debug!("Querying MX records for domain: {}", domain);

        let response = tokio::time::timeout(self.lookup_timeout, self.resolver.mx_lookup(domain))
            .await
            .map_err(|_| LookupError::Transient(format!("MX lookup for {domain} timed out")))??;

        let hosts: Vec<String> = response
            .iter()
            .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
            .filter(|host| !host.is_empty())
            .collect();

        debug!("Domain {} has {} MX record(s)", domain, hosts.len());
        if hosts.is_empty() {
            return Err(LookupError::NoRecords);
        }
        Ok(hosts)
    }

    async fn has_a_records(&self, domain: &str) -> Result<bool, LookupError> {
        debug!("Querying A records for domain: {}", domain);

        let response = tokio::time::timeout(self.lookup_timeout, self.resolver.ipv4_lookup(domain))
            .await
            .map_err(|_| LookupError::Transient(format!("A lookup for {domain} timed out")))??;

        Ok(response.iter().count() > 0)
    }
}

/// One MX-then-A resolution pass. `Ok(false)` is a definitive negative.
async fn resolve_once(dns: &dyn MailDns, domain: &str) -> Result<bool, LookupError> {
    match dns.mx_hosts(domain).await {
        Ok(hosts) if !hosts.is_empty() => return Ok(true),
        Ok(_) | Err(LookupError::NoRecords) => {
            debug!("No MX records for {}, falling back to A", domain);
        }
        Err(err) => return Err(err),
    }

    match dns.has_a_records(domain).await {
        Ok(found) => Ok(found),
        Err(LookupError::NoRecords) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Check whether a domain can receive mail.
///
/// Makes up to `retries` resolution passes, sleeping `retry_delay` after each
/// transient failure. Returns `false` once retries are exhausted or as soon as
/// the resolver definitively reports neither MX nor A records.
pub async fn has_mail_server(
    dns: &dyn MailDns,
    domain: &str,
    retries: usize,
    retry_delay: Duration,
) -> bool {
    let retries = retries.max(1);

    for attempt in 1..=retries {
        debug!("Mail server check attempt {} for {}", attempt, domain);

        match resolve_once(dns, domain).await {
            Ok(found) => {
                debug!("Mail server check for {}: {}", domain, found);
                return found;
            }
            Err(err) if attempt == retries => {
                error!("Failed to resolve records for {}: {}", domain, err);
                return false;
            }
            Err(err) => {
                warn!(
                    "Transient DNS failure for {} (attempt {}/{}): {}",
                    domain, attempt, retries, err
                );
                tokio::time::sleep(retry_delay).await;
            }
        }
    }

    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted resolver: pops one MX answer per call, repeating the last one
    pub(crate) struct ScriptedDns {
        mx_answers: Mutex<VecDeque<Result<Vec<String>, LookupError>>>,
        a_answer: Result<bool, LookupError>,
        pub(crate) mx_calls: AtomicUsize,
        pub(crate) a_calls: AtomicUsize,
    }

    impl ScriptedDns {
        pub(crate) fn new(
            mx_answers: Vec<Result<Vec<String>, LookupError>>,
            a_answer: Result<bool, LookupError>,
        ) -> Self {
            Self {
                mx_answers: Mutex::new(mx_answers.into()),
                a_answer,
                mx_calls: AtomicUsize::new(0),
                a_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_mx(host: &str) -> Self {
            Self::new(vec![Ok(vec![host.to_string()])], Ok(true))
        }
    }

    #[async_trait]
    impl MailDns for ScriptedDns {
        async fn mx_hosts(&self, _domain: &str) -> Result<Vec<String>, LookupError> {
            self.mx_calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.mx_answers.lock();
            if answers.len() > 1 {
                answers.pop_front().unwrap_or(Err(LookupError::NoRecords))
            } else {
                answers.front().cloned().unwrap_or(Err(LookupError::NoRecords))
            }
        }

        async fn has_a_records(&self, _domain: &str) -> Result<bool, LookupError> {
            self.a_calls.fetch_add(1, Ordering::SeqCst);
            self.a_answer.clone()
        }
    }

    fn transient() -> Result<Vec<String>, LookupError> {
        Err(LookupError::Transient("SERVFAIL".to_string()))
    }

    #[tokio::test]
    async fn test_dns_resolver_creation() {
        let resolver = DnsResolver::new(5_000, 128);
        assert_eq!(resolver.lookup_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_until_third_attempt_succeeds() {
        let dns = ScriptedDns::new(
            vec![transient(), transient(), Ok(vec!["mx.example.com".to_string()])],
            Ok(false),
        );

        let found = has_mail_server(&dns, "example.com", 3, Duration::from_millis(5)).await;

        assert!(found);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 3);
        assert_eq!(dns.a_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let dns = ScriptedDns::new(vec![transient()], Ok(true));

        let found = has_mail_server(&dns, "example.com", 3, Duration::from_millis(1)).await;

        assert!(!found);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_falls_back_to_a_record() {
        let dns = ScriptedDns::new(vec![Err(LookupError::NoRecords)], Ok(true));

        assert!(has_mail_server(&dns, "example.com", 3, Duration::ZERO).await);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dns.a_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_records_is_not_retried() {
        let dns = ScriptedDns::new(vec![Err(LookupError::NoRecords)], Err(LookupError::NoRecords));

        assert!(!has_mail_server(&dns, "example.com", 3, Duration::ZERO).await);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_a_failure_is_retried() {
        let dns = ScriptedDns::new(
            vec![Err(LookupError::NoRecords)],
            Err(LookupError::Transient("timeout".to_string())),
        );

        assert!(!has_mail_server(&dns, "example.com", 2, Duration::ZERO).await);
        assert_eq!(dns.a_calls.load(Ordering::SeqCst), 2);
    }
}
