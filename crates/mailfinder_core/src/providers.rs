//! Heuristic overrides for webmail providers that block or falsify RCPT TO probes
//!
//! A matching domain never reaches the live SMTP path. The decision is made
//! from DNS plus the local part's shape and is reported as a heuristic.

use crate::dns::{has_mail_server, MailDns};
use crate::smtp_probe::ProbeReport;
use crate::syntax::split_address;
use crate::VerificationStatus;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

static LOCAL_PART_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("local part pattern is valid"));

/// Domain group of one provider and the local-part shape it allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRule {
    pub name: &'static str,
    pub domains: &'static [&'static str],
    pub min_local_len: usize,
    pub max_local_len: usize,
}

/// Built-in provider groups, checked in order
pub const DEFAULT_PROVIDERS: &[ProviderRule] = &[
    ProviderRule {
        name: "Mail.ru",
        domains: &["mail.ru", "inbox.ru", "list.ru", "bk.ru", "internet.ru"],
        min_local_len: 3,
        max_local_len: 32,
    },
    ProviderRule {
        name: "Yandex",
        domains: &["yandex.ru", "yandex.com", "ya.ru"],
        min_local_len: 3,
        max_local_len: 30,
    },
];

impl ProviderRule {
    pub fn covers(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Shape rules only, no network access
    pub fn judge_local_part(&self, local: &str) -> ProbeReport {
        let length = local.chars().count();
        if length < self.min_local_len || length > self.max_local_len {
            return ProbeReport::new(
                VerificationStatus::ProviderHeuristicReject,
                format!("Username length invalid for {}", self.name),
            );
        }

        if !LOCAL_PART_CHARS.is_match(local) {
            return ProbeReport::new(
                VerificationStatus::ProviderHeuristicReject,
                format!("Invalid characters for {}", self.name),
            );
        }

        ProbeReport::new(
            VerificationStatus::ProviderHeuristicAccept,
            format!("Likely valid ({})", self.name),
        )
    }

    /// Full provider check: the domain must resolve before the shape rules apply
    pub async fn check(
        &self,
        dns: &dyn MailDns,
        address: &str,
        dns_retries: usize,
        dns_retry_delay: Duration,
    ) -> ProbeReport {
        let Some((local, domain)) = split_address(address) else {
            return ProbeReport::new(VerificationStatus::InvalidSyntax, "Address has no domain");
        };

        info!("Using {} heuristic for {}", self.name, address);

        if !has_mail_server(dns, domain, dns_retries, dns_retry_delay).await {
            return ProbeReport::new(
                VerificationStatus::ProviderHeuristicReject,
                "No mail server for domain",
            );
        }

        let report = self.judge_local_part(local);
        debug!("{} heuristic for {}: {}", self.name, address, report.detail);
        report
    }
}

/// Ordered list of provider overrides
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    rules: Vec<ProviderRule>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDERS.to_vec())
    }
}

impl ProviderRegistry {
    pub fn new(rules: Vec<ProviderRule>) -> Self {
        Self { rules }
    }

    /// First rule covering the domain
    pub fn rule_for(&self, domain: &str) -> Option<&ProviderRule> {
        self.rules.iter().find(|rule| rule.covers(domain))
    }

    pub fn rules(&self) -> &[ProviderRule] {
        &self.rules
    }
}
