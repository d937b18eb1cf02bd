//! Per-candidate verification state machine
//!
//! Syntax check, reserved domain check, mail server check, then either a
//! provider heuristic or a live SMTP probe. Everything after the syntax check
//! shares one time budget; the final step runs on a detached task raced
//! against what is left of it.

use crate::dns::{has_mail_server, DnsResolver, MailDns};
use crate::providers::ProviderRegistry;
use crate::smtp_probe::{MailboxProbe, ProbeReport, SmtpProber, SmtpSettings};
use crate::syntax::{is_reserved_domain, is_well_formed, split_address};
use crate::{ProbeConfig, ProbeError, Result, VerificationOutcome, VerificationStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Verifies candidate addresses one at a time
pub struct EmailVerifier {
    config: ProbeConfig,
    dns: Arc<dyn MailDns>,
    prober: Arc<dyn MailboxProbe>,
    providers: ProviderRegistry,
}

impl EmailVerifier {
    /// Create a verifier backed by hickory DNS and lettre SMTP
    ///
    /// # Arguments
    /// * `config` - DNS, SMTP and pacing settings
    ///
    /// # Returns
    /// * `Ok(EmailVerifier)` on success
    /// * `Err(ProbeError::Configuration)` if the settings cannot work
    pub fn new(config: ProbeConfig) -> Result<Self> {
        info!("Initializing email verifier");

        if config.dns_retries == 0 {
            return Err(ProbeError::Configuration("dns_retries must be at least 1".to_string()));
        }
        if config.smtp_attempts == 0 {
            return Err(ProbeError::Configuration("smtp_attempts must be at least 1".to_string()));
        }
        if config.mail_from.parse::<lettre::Address>().is_err() {
            return Err(ProbeError::Configuration(format!(
                "mail_from is not a valid address: {}",
                config.mail_from
            )));
        }

        let dns: Arc<dyn MailDns> = Arc::new(DnsResolver::new(config.dns_timeout_ms, config.dns_cache_size));
        let prober = Arc::new(SmtpProber::new(dns.clone(), SmtpSettings::from_config(&config)));

        Ok(Self::with_components(config, dns, prober, ProviderRegistry::default()))
    }

    /// Assemble a verifier from explicit collaborators
    pub fn with_components(
        config: ProbeConfig,
        dns: Arc<dyn MailDns>,
        prober: Arc<dyn MailboxProbe>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            config,
            dns,
            prober,
            providers,
        }
    }

    /// Run the full state machine for one address within `budget`.
    ///
    /// Every classified result, including a timeout, is `Ok`. `Err` means the
    /// detached probe task itself failed.
    #[instrument(skip(self), fields(candidate = %address))]
    pub async fn verify_candidate(&self, address: &str, budget: Duration) -> Result<VerificationOutcome> {
        let deadline = deadline_after(budget);
        let outcome = |status, detail: &str| VerificationOutcome::new(address, status, detail);

        if !is_well_formed(address) {
            debug!("Invalid syntax: {}", address);
            return Ok(outcome(VerificationStatus::InvalidSyntax, "Invalid syntax"));
        }

        let Some((_, domain)) = split_address(address) else {
            return Ok(outcome(VerificationStatus::InvalidSyntax, "Invalid syntax"));
        };

        if is_reserved_domain(domain) {
            debug!("Reserved domain: {}", domain);
            return Ok(outcome(VerificationStatus::InvalidDomain, "Invalid domain"));
        }

        let dns_check = has_mail_server(
            self.dns.as_ref(),
            domain,
            self.config.dns_retries,
            Duration::from_millis(self.config.dns_retry_delay_ms),
        );
        match timeout_at(deadline, dns_check).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Domain {} has no mail server", domain);
                return Ok(outcome(
                    VerificationStatus::NoMailServer,
                    "Invalid domain (no mail server)",
                ));
            }
            Err(_) => {
                warn!("Budget exhausted during DNS checks for {}", address);
                return Ok(outcome(VerificationStatus::Timeout, "Verification timeout"));
            }
        }

        let jitter = self.config.probe_jitter.sample();
        debug!("Adding delay of {:?} before the probe step", jitter);
        if timeout_at(deadline, tokio::time::sleep(jitter)).await.is_err() || Instant::now() >= deadline {
            warn!("Budget exhausted before probing {}", address);
            return Ok(outcome(VerificationStatus::Timeout, "Verification timeout"));
        }

        let task = match self.providers.rule_for(domain).copied() {
            Some(rule) => {
                let dns = self.dns.clone();
                let address = address.to_string();
                let retries = self.config.dns_retries;
                let retry_delay = Duration::from_millis(self.config.dns_retry_delay_ms);
                tokio::spawn(async move { rule.check(dns.as_ref(), &address, retries, retry_delay).await })
            }
            None => {
                let prober = self.prober.clone();
                let address = address.to_string();
                tokio::spawn(async move { prober.probe(&address).await })
            }
        };

        // on expiry the handle is dropped and the task finishes detached
        match timeout_at(deadline, task).await {
            Ok(joined) => {
                let ProbeReport { status, detail } = joined?;
                info!("Verification of {}: {:?} ({})", address, status, detail);
                Ok(VerificationOutcome::new(address, status, detail))
            }
            Err(_) => {
                warn!("Verification of {} timed out after {:?}", address, budget);
                Ok(outcome(VerificationStatus::Timeout, "Verification timeout"))
            }
        }
    }

    /// Verify a list of addresses in order, pausing between them. Empty entries are skipped.
    pub async fn verify_many(
        &self,
        addresses: &[String],
        budget: Duration,
    ) -> Result<Vec<(String, VerificationOutcome)>> {
        info!(
            "Starting verification of {} addresses with {:?} per address",
            addresses.len(),
            budget
        );

        let mut results = Vec::with_capacity(addresses.len());
        for (index, address) in addresses.iter().filter(|a| !a.trim().is_empty()).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.candidate_delay.sample()).await;
            }
            let outcome = self.verify_candidate(address, budget).await?;
            results.push((address.clone(), outcome));
        }

        Ok(results)
    }

    /// Verify groups of addresses with the longer inter-batch pause between groups
    pub async fn verify_batches(
        &self,
        batches: &[Vec<String>],
        budget: Duration,
    ) -> Result<Vec<(String, VerificationOutcome)>> {
        let mut results = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                let pause = self.config.person_delay.sample();
                debug!("Pausing {:?} before batch {}", pause, index + 1);
                tokio::time::sleep(pause).await;
            }
            results.extend(self.verify_many(batch, budget).await?);
        }
        Ok(results)
    }
}

/// Deadline `budget` from now, clamped for budgets too large to represent
fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::tests::ScriptedDns;
    use crate::dns::LookupError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe returning a fixed report and counting calls
    struct CountingProbe {
        report: ProbeReport,
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn new(status: VerificationStatus, detail: &str) -> Self {
            Self {
                report: ProbeReport::new(status, detail),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MailboxProbe for CountingProbe {
        async fn probe(&self, _address: &str) -> ProbeReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.report.clone()
        }
    }

    /// Probe that never answers
    struct HangingProbe;

    #[async_trait]
    impl MailboxProbe for HangingProbe {
        async fn probe(&self, _address: &str) -> ProbeReport {
            std::future::pending().await
        }
    }

    struct PanickingProbe;

    #[async_trait]
    impl MailboxProbe for PanickingProbe {
        async fn probe(&self, _address: &str) -> ProbeReport {
            panic!("probe blew up")
        }
    }

    fn verifier_with(dns: Arc<dyn MailDns>, prober: Arc<dyn MailboxProbe>) -> EmailVerifier {
        EmailVerifier::with_components(ProbeConfig::without_delays(), dns, prober, ProviderRegistry::default())
    }

    fn accepting_probe() -> Arc<CountingProbe> {
        Arc::new(CountingProbe::new(VerificationStatus::SmtpAccepted, "Valid"))
    }

    #[tokio::test]
    async fn test_invalid_syntax_short_circuits() {
        let dns = Arc::new(ScriptedDns::with_mx("mx.example.com"));
        let probe = accepting_probe();
        let verifier = verifier_with(dns.clone(), probe.clone());

        let outcome = verifier
            .verify_candidate("a..b@example.com", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::InvalidSyntax);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reserved_domain_short_circuits() {
        let dns = Arc::new(ScriptedDns::with_mx("mx.example.com"));
        let verifier = verifier_with(dns.clone(), accepting_probe());

        let outcome = verifier
            .verify_candidate("ivan@corp.test", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::InvalidDomain);
        assert_eq!(dns.mx_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_mail_server() {
        let dns = Arc::new(ScriptedDns::new(
            vec![Err(LookupError::NoRecords)],
            Err(LookupError::NoRecords),
        ));
        let probe = accepting_probe();
        let verifier = verifier_with(dns, probe.clone());

        let outcome = verifier
            .verify_candidate("ivan@nowhere.com", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::NoMailServer);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_probe_result_is_reported() {
        let probe = accepting_probe();
        let verifier = verifier_with(Arc::new(ScriptedDns::with_mx("mx.example.com")), probe.clone());

        let outcome = verifier
            .verify_candidate("ivan.petrov@example.com", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::new("ivan.petrov@example.com", VerificationStatus::SmtpAccepted, "Valid")
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_within_budget() {
        let verifier = verifier_with(
            Arc::new(ScriptedDns::with_mx("mx.example.com")),
            Arc::new(HangingProbe),
        );
        let budget = Duration::from_secs(30);
        let started = Instant::now();

        let outcome = verifier
            .verify_candidate("ivan@example.com", budget)
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::Timeout);
        assert!(started.elapsed() >= budget);
        assert!(started.elapsed() < budget + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_counts_against_budget() {
        let mut config = ProbeConfig::without_delays();
        config.probe_jitter = crate::JitterRange::new(500, 500);
        let probe = accepting_probe();
        let verifier = EmailVerifier::with_components(
            config,
            Arc::new(ScriptedDns::with_mx("mx.example.com")),
            probe.clone(),
            ProviderRegistry::default(),
        );

        let started = Instant::now();

        let outcome = verifier
            .verify_candidate("ivan@example.com", Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::Timeout);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unbounded_budget_still_classifies() {
        let probe = accepting_probe();
        let verifier = verifier_with(Arc::new(ScriptedDns::with_mx("mx.example.com")), probe.clone());

        let outcome = verifier
            .verify_candidate("ivan@example.com", Duration::MAX)
            .await
            .unwrap();

        assert_eq!(outcome.status, VerificationStatus::SmtpAccepted);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deadline_after_clamps_overflow() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) > before);
        assert!(deadline_after(Duration::ZERO) >= before);
    }

    #[tokio::test]
    async fn test_provider_domains_never_reach_live_probe() {
        let probe = accepting_probe();
        let verifier = verifier_with(Arc::new(ScriptedDns::with_mx("mxs.mail.ru")), probe.clone());

        for address in ["ivan.petrov@mail.ru", "ivan.petrov@yandex.ru", "iv@bk.ru"] {
            let outcome = verifier
                .verify_candidate(address, Duration::from_secs(5))
                .await
                .unwrap();
            assert!(matches!(
                outcome.status,
                VerificationStatus::ProviderHeuristicAccept | VerificationStatus::ProviderHeuristicReject
            ));
        }

        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_probe_is_an_error() {
        let verifier = verifier_with(
            Arc::new(ScriptedDns::with_mx("mx.example.com")),
            Arc::new(PanickingProbe),
        );

        let result = verifier
            .verify_candidate("ivan@example.com", Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(ProbeError::ProbeTask(_))));
    }

    #[tokio::test]
    async fn test_verify_many_skips_empty_entries() {
        let probe = accepting_probe();
        let verifier = verifier_with(Arc::new(ScriptedDns::with_mx("mx.example.com")), probe.clone());
        let addresses = vec![
            "ivan@example.com".to_string(),
            String::new(),
            "not-an-address".to_string(),
        ];

        let results = verifier
            .verify_many(&addresses, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.status, VerificationStatus::SmtpAccepted);
        assert_eq!(results[1].1.status, VerificationStatus::InvalidSyntax);
    }

    #[tokio::test]
    async fn test_verify_batches_flattens_in_order() {
        let verifier = verifier_with(Arc::new(ScriptedDns::with_mx("mx.example.com")), accepting_probe());
        let batches = vec![
            vec!["a.one@example.com".to_string()],
            vec!["b.two@example.com".to_string(), "c.three@example.com".to_string()],
        ];

        let results = verifier
            .verify_batches(&batches, Duration::from_secs(5))
            .await
            .unwrap();

        let order: Vec<&str> = results.iter().map(|(address, _)| address.as_str()).collect();
        assert_eq!(order, vec!["a.one@example.com", "b.two@example.com", "c.three@example.com"]);
    }

    #[test]
    fn test_new_rejects_unusable_config() {
        let mut config = ProbeConfig::default();
        config.smtp_attempts = 0;
        assert!(matches!(EmailVerifier::new(config), Err(ProbeError::Configuration(_))));
    }
}
