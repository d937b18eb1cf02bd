//! # mailfinder_core
//!
//! Mailbox discovery library: given a person's name and an organization's mail
//! domain, generate plausible addresses and probe which one the domain accepts.
//!
//! ## Features
//!
//! - **Name transliteration** from Cyrillic with lexicon and surname-ending variants
//! - **Candidate generation** over a fixed set of local-part templates
//! - **DNS checks** (MX with A fallback) via hickory-resolver, with bounded retries
//! - **SMTP RCPT TO probing** via lettre, time-boxed per candidate
//! - **Provider overrides** for webmail providers that falsify probe answers
//! - **Sequential batch runs** with jittered pacing, cooperative cancellation and
//!   a pollable progress snapshot
//!
//! ## Example
//!
//! ```rust,no_run
//! use mailfinder_core::{EmailVerifier, ProbeConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let candidates = mailfinder_core::generate_email_variations("Иван", "Петров", "example.com");
//!     let verifier = EmailVerifier::new(ProbeConfig::default())?;
//!
//!     let outcome = verifier.verify_candidate(&candidates[0], Duration::from_secs(30)).await?;
//!     println!("{}: {:?} ({})", outcome.candidate, outcome.status, outcome.detail);
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod candidates;
pub mod dns;
pub mod providers;
pub mod smtp_probe;
pub mod syntax;
pub mod transliteration;
pub mod verifier;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Configuration for DNS resolution, SMTP probing and run pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Lifetime of a single DNS lookup in milliseconds
    pub dns_timeout_ms: u64,
    /// Total lookup attempts before a domain is reported as having no mail server
    pub dns_retries: usize,
    /// Pause between DNS attempts after a transient failure
    pub dns_retry_delay_ms: u64,
    /// DNS cache size (number of entries)
    pub dns_cache_size: usize,
    /// Port the mail exchanger is contacted on
    pub smtp_port: u16,
    /// Per-connection SMTP timeout in milliseconds
    pub smtp_timeout_ms: u64,
    /// Total SMTP session attempts on unexpected errors
    pub smtp_attempts: usize,
    /// Pause between SMTP attempts
    pub smtp_retry_delay_ms: u64,
    /// Name announced in EHLO
    pub helo_name: String,
    /// Envelope sender used for MAIL FROM
    pub mail_from: String,
    /// Delay inserted before the probe step of every candidate
    pub probe_jitter: JitterRange,
    /// Delay between two candidates of the same person
    pub candidate_delay: JitterRange,
    /// Delay between two people of a run
    pub person_delay: JitterRange,
    /// Default time budget for one candidate, in seconds
    pub candidate_budget_secs: u64,
    /// Default early-stop policy for runs
    pub stop_on_first_valid: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 5_000,
            dns_retries: 3,
            dns_retry_delay_ms: 1_000,
            dns_cache_size: 1_024,
            smtp_port: 25,
            smtp_timeout_ms: 10_000,
            smtp_attempts: 2,
            smtp_retry_delay_ms: 1_000,
            helo_name: "localhost.localdomain".to_string(),
            mail_from: "verify@localhost.localdomain".to_string(),
            probe_jitter: JitterRange::new(1_000, 3_000),
            candidate_delay: JitterRange::new(500, 1_500),
            person_delay: JitterRange::new(5_000, 10_000),
            candidate_budget_secs: 30,
            stop_on_first_valid: true,
        }
    }
}

impl ProbeConfig {
    /// Configuration with every pacing delay disabled
    pub fn without_delays() -> Self {
        Self {
            dns_retry_delay_ms: 0,
            smtp_retry_delay_ms: 0,
            probe_jitter: JitterRange::none(),
            candidate_delay: JitterRange::none(),
            person_delay: JitterRange::none(),
            ..Self::default()
        }
    }

    pub fn candidate_budget(&self) -> Duration {
        Duration::from_secs(self.candidate_budget_secs)
    }
}

/// Inclusive range of milliseconds a randomized delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Draw a delay uniformly from the range. A reversed range collapses to `min_ms`.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }
}

/// One person to find an address for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub first_name: String,
    pub last_name: String,
    /// Bare registrable domain, or a company name still waiting for domain lookup
    pub domain: String,
}

impl NameEntry {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            domain: domain.into(),
        }
    }

    /// Whether the domain field looks like a domain rather than a company name
    pub fn has_domain(&self) -> bool {
        !self.domain.trim().is_empty() && self.domain.contains('.')
    }

    /// Key grouping candidate outcomes of this person in run progress
    pub fn person_key(&self) -> String {
        format!("{} {} ({})", self.first_name, self.last_name, self.domain)
    }
}

/// Terminal classification of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    InvalidSyntax,
    InvalidDomain,
    NoMailServer,
    ProviderHeuristicAccept,
    ProviderHeuristicReject,
    SmtpAccepted,
    SmtpRejected,
    SmtpAmbiguous,
    SmtpTransportError,
    Timeout,
    BatchError,
}

impl VerificationStatus {
    /// Whether the candidate counts as found
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::SmtpAccepted | Self::ProviderHeuristicAccept)
    }

    /// Ranking among accepted outcomes, lower is better. `None` for rejections.
    pub fn acceptance_rank(&self) -> Option<u8> {
        match self {
            Self::SmtpAccepted => Some(0),
            Self::ProviderHeuristicAccept => Some(1),
            _ => None,
        }
    }
}

/// Result of verifying one candidate address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub candidate: String,
    pub status: VerificationStatus,
    /// Human-readable explanation
    pub detail: String,
}

impl VerificationOutcome {
    pub fn new(
        candidate: impl Into<String>,
        status: VerificationStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            status,
            detail: detail.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status.is_accepted()
    }
}

/// Coarse result for one person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    /// Best candidate was confirmed by a live SMTP probe
    Verified,
    /// Best candidate was accepted by a provider heuristic only
    LikelyValid,
    /// Every probed candidate was rejected
    NotFound,
    /// Entry had no usable name or domain
    Skipped,
    /// Run was cancelled while this person was being processed
    Stopped,
    /// An unexpected error ended processing of this person
    Error,
}

/// Best accepted candidate for a person, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonResult {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub best_candidate: Option<String>,
    pub status: PersonStatus,
    pub detail: String,
    pub checked_at: SystemTime,
}

impl PersonResult {
    pub fn for_entry(
        entry: &NameEntry,
        best_candidate: Option<String>,
        status: PersonStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            first_name: entry.first_name.clone(),
            last_name: entry.last_name.clone(),
            domain: entry.domain.clone(),
            best_candidate,
            status,
            detail: detail.into(),
            checked_at: SystemTime::now(),
        }
    }
}

/// Errors that escape per-candidate classification
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid name entry: {0}")]
    InvalidEntry(String),
    #[error("Probe task failed: {0}")]
    ProbeTask(#[from] tokio::task::JoinError),
    #[error("A batch is already running")]
    BatchAlreadyRunning,
    #[error("Error finding domains: {0}")]
    DomainLookup(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

pub use batch::{
    BatchOptions, BatchRunner, BatchSupervisor, CandidateVerifier, DomainFinder, NoDomainFinder,
    ProgressHandle, RunProgress, RunStatus, STOPPED_BY_USER,
};
pub use candidates::generate_email_variations;
pub use verifier::EmailVerifier;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.dns_retries, 3);
        assert_eq!(config.smtp_port, 25);
        assert_eq!(config.smtp_attempts, 2);
        assert_eq!(config.candidate_budget(), Duration::from_secs(30));
        assert!(config.stop_on_first_valid);
    }

    #[test]
    fn test_jitter_sample_stays_in_range() {
        let range = JitterRange::new(10, 20);
        for _ in 0..100 {
            let delay = range.sample();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(20));
        }
        assert_eq!(JitterRange::none().sample(), Duration::ZERO);
        assert_eq!(JitterRange::new(7, 3).sample(), Duration::from_millis(7));
    }

    #[test]
    fn test_acceptance_ranking() {
        assert!(VerificationStatus::SmtpAccepted.is_accepted());
        assert!(VerificationStatus::ProviderHeuristicAccept.is_accepted());
        assert!(!VerificationStatus::SmtpAmbiguous.is_accepted());
        assert!(
            VerificationStatus::SmtpAccepted.acceptance_rank()
                < VerificationStatus::ProviderHeuristicAccept.acceptance_rank()
        );
        assert_eq!(VerificationStatus::Timeout.acceptance_rank(), None);
    }

    #[test]
    fn test_name_entry_domain_detection() {
        assert!(NameEntry::new("Иван", "Петров", "example.com").has_domain());
        assert!(!NameEntry::new("Иван", "Петров", "Acme Corp").has_domain());
        assert!(!NameEntry::new("Иван", "Петров", "  ").has_domain());
        assert_eq!(
            NameEntry::new("Иван", "Петров", "example.com").person_key(),
            "Иван Петров (example.com)"
        );
    }
}
