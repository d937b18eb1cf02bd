//! Sequential processing of many people
//!
//! One run walks its entries in order and, for each person, the candidate
//! addresses in generation order. Progress lives behind a single mutex so a
//! poller never sees a half-applied update. Cancellation is cooperative and
//! only observed between people and between candidates.

use crate::candidates::generate_email_variations;
use crate::verifier::EmailVerifier;
use crate::{
    JitterRange, NameEntry, PersonResult, PersonStatus, ProbeConfig, ProbeError, Result,
    VerificationOutcome, VerificationStatus,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const STOPPED_BY_USER: &str = "Processing stopped by user";

/// Coarse state of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    FindingDomains,
    Complete,
    Stopped,
    Error,
}

/// One recorded candidate outcome, keyed by the person it was generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedCandidate {
    pub person_key: String,
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
}

/// An accepted address, as listed in run results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundAddress {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub email: String,
    pub status: VerificationStatus,
}

/// Live state of the current run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunProgress {
    pub status: RunStatus,
    pub total: usize,
    /// People fully processed so far
    pub processed: usize,
    pub current_name: String,
    pub current_candidate: String,
    pub current_candidate_index: usize,
    pub total_candidates: usize,
    pub checked: Vec<CheckedCandidate>,
    pub valid_emails: Vec<FoundAddress>,
    pub results: Vec<PersonResult>,
    pub error_message: String,
}

impl RunProgress {
    /// Outcomes recorded for one person, in probing order
    pub fn outcomes_for(&self, person_key: &str) -> Vec<&VerificationOutcome> {
        self.checked
            .iter()
            .filter(|c| c.person_key == person_key)
            .map(|c| &c.outcome)
            .collect()
    }
}

/// Shared, lock-guarded progress of one run
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<RunProgress>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> RunProgress {
        self.inner.lock().clone()
    }

    /// Apply one atomic change
    pub fn update(&self, change: impl FnOnce(&mut RunProgress)) {
        change(&mut self.inner.lock());
    }

    fn reset(&self, total: usize) {
        self.update(|p| {
            *p = RunProgress {
                status: RunStatus::Running,
                total,
                ..RunProgress::default()
            }
        });
    }

    fn finish(&self, status: RunStatus, message: impl Into<String>) {
        let message = message.into();
        self.update(|p| {
            p.status = status;
            p.current_candidate.clear();
            p.error_message = message;
        });
    }
}

/// Verifies one candidate within a time budget
#[async_trait]
pub trait CandidateVerifier: Send + Sync {
    async fn verify(&self, address: &str, budget: Duration) -> Result<VerificationOutcome>;
}

#[async_trait]
impl CandidateVerifier for EmailVerifier {
    async fn verify(&self, address: &str, budget: Duration) -> Result<VerificationOutcome> {
        self.verify_candidate(address, budget).await
    }
}

/// Fills in the domain of entries that only carry a company name
#[async_trait]
pub trait DomainFinder: Send + Sync {
    /// Returns the entries in the same order, with domains filled in where found
    async fn find_domains(&self, entries: Vec<NameEntry>) -> anyhow::Result<Vec<NameEntry>>;
}

/// Finder that resolves nothing; unresolved entries are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDomainFinder;

#[async_trait]
impl DomainFinder for NoDomainFinder {
    async fn find_domains(&self, entries: Vec<NameEntry>) -> anyhow::Result<Vec<NameEntry>> {
        Ok(entries)
    }
}

/// Per-run policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub timeout_per_candidate: Duration,
    pub stop_on_first_valid: bool,
}

impl BatchOptions {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            timeout_per_candidate: config.candidate_budget(),
            stop_on_first_valid: config.stop_on_first_valid,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

/// Sleep unless the run is cancelled first
async fn pause(delay: Duration, cancel: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }
}

/// Drives candidate verification across people
pub struct BatchRunner {
    verifier: Arc<dyn CandidateVerifier>,
    finder: Arc<dyn DomainFinder>,
    candidate_delay: JitterRange,
    person_delay: JitterRange,
}

impl BatchRunner {
    pub fn new(
        verifier: Arc<dyn CandidateVerifier>,
        finder: Arc<dyn DomainFinder>,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            verifier,
            finder,
            candidate_delay: config.candidate_delay,
            person_delay: config.person_delay,
        }
    }

    /// Process every entry in order and return one result per entry reached.
    ///
    /// # Arguments
    /// * `entries` - People to find addresses for
    /// * `options` - Candidate budget and early-stop policy
    /// * `progress` - Updated as the run advances
    /// * `cancel` - Checked before each person and each candidate
    ///
    /// # Returns
    /// Results for the people processed before the run ended. Empty if domain
    /// discovery failed.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn process_entries(
        &self,
        entries: Vec<NameEntry>,
        options: BatchOptions,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> Vec<PersonResult> {
        info!("Starting to process {} entries", entries.len());
        progress.reset(entries.len());

        let entries = match self.resolve_domains(entries, progress).await {
            Ok(entries) => entries,
            Err(err) => {
                error!("{}", err);
                progress.finish(RunStatus::Error, err.to_string());
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                pause(self.person_delay.sample(), cancel).await;
            }

            if cancel.is_cancelled() {
                info!("{}", STOPPED_BY_USER);
                progress.finish(RunStatus::Stopped, STOPPED_BY_USER);
                return results;
            }

            progress.update(|p| {
                p.current_name = entry.person_key();
                p.current_candidate.clear();
                p.current_candidate_index = 0;
                p.total_candidates = 0;
            });

            info!(
                "Processing entry {}/{}: {}",
                index + 1,
                entries.len(),
                entry.person_key()
            );

            let result = match self.process_person(entry, options, progress, cancel).await {
                Ok(result) => result,
                Err(err) => {
                    error!("Error processing entry {}: {}", index + 1, err);
                    PersonResult::for_entry(entry, None, PersonStatus::Error, err.to_string())
                }
            };

            let stopped = result.status == PersonStatus::Stopped;
            progress.update(|p| {
                p.processed = index + 1;
                p.results.push(result.clone());
            });
            results.push(result);

            if stopped {
                info!("{}", STOPPED_BY_USER);
                progress.finish(RunStatus::Stopped, STOPPED_BY_USER);
                return results;
            }
        }

        info!("Processing complete: {} entries", results.len());
        progress.finish(RunStatus::Complete, "");
        results
    }

    /// Ask the finder for domains if any entry lacks one
    async fn resolve_domains(
        &self,
        entries: Vec<NameEntry>,
        progress: &ProgressHandle,
    ) -> Result<Vec<NameEntry>> {
        if entries.iter().all(NameEntry::has_domain) {
            return Ok(entries);
        }

        info!("Found entries with missing domains, attempting to find them");
        progress.update(|p| p.status = RunStatus::FindingDomains);

        let resolved = self
            .finder
            .find_domains(entries.clone())
            .await
            .map_err(|e| ProbeError::DomainLookup(e.to_string()))?;

        if resolved.len() != entries.len() {
            return Err(ProbeError::DomainLookup(format!(
                "expected {} entries, finder returned {}",
                entries.len(),
                resolved.len()
            )));
        }

        for (index, (before, after)) in entries.iter().zip(&resolved).enumerate() {
            if before.domain != after.domain {
                info!(
                    "Found domain for entry {}: {} {} - {} -> {}",
                    index + 1,
                    after.first_name,
                    after.last_name,
                    before.domain,
                    after.domain
                );
            }
        }

        progress.update(|p| p.status = RunStatus::Running);
        Ok(resolved)
    }

    #[instrument(skip_all, fields(person = %entry.person_key()))]
    async fn process_person(
        &self,
        entry: &NameEntry,
        options: BatchOptions,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<PersonResult> {
        if entry.first_name.trim().is_empty() || entry.last_name.trim().is_empty() {
            warn!("Skipping {}: incomplete name", entry.person_key());
            return Ok(PersonResult::for_entry(entry, None, PersonStatus::Skipped, "Incomplete name"));
        }
        if !entry.has_domain() {
            warn!("Skipping {}: no valid domain found", entry.person_key());
            return Ok(PersonResult::for_entry(
                entry,
                None,
                PersonStatus::Skipped,
                "No valid domain found",
            ));
        }

        let candidates = generate_email_variations(&entry.first_name, &entry.last_name, &entry.domain);
        let person_key = entry.person_key();
        progress.update(|p| p.total_candidates = candidates.len());

        let mut best: Option<VerificationOutcome> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            if index > 0 {
                pause(self.candidate_delay.sample(), cancel).await;
            }

            if cancel.is_cancelled() {
                info!("Stop observed before {}, leaving it unchecked", candidate);
                return Ok(conclude(entry, best, true));
            }

            progress.update(|p| {
                p.current_candidate = candidate.clone();
                p.current_candidate_index = index;
            });
            debug!("Checking email {}/{}: {}", index + 1, candidates.len(), candidate);

            let outcome = match self.verifier.verify(candidate, options.timeout_per_candidate).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let outcome = VerificationOutcome::new(candidate, VerificationStatus::BatchError, err.to_string());
                    self.record(progress, entry, &person_key, outcome);
                    return Err(err);
                }
            };

            let accepted = outcome.is_accepted();
            self.record(progress, entry, &person_key, outcome.clone());

            if accepted {
                info!("Valid email found: {}", candidate);
                if best.as_ref().map_or(true, |b| outranks(&outcome, b)) {
                    best = Some(outcome);
                }
                if options.stop_on_first_valid {
                    break;
                }
            }
        }

        if best.is_none() {
            warn!("No valid email found for {}", person_key);
        }
        Ok(conclude(entry, best, false))
    }

    fn record(&self, progress: &ProgressHandle, entry: &NameEntry, person_key: &str, outcome: VerificationOutcome) {
        progress.update(|p| {
            if outcome.is_accepted() {
                p.valid_emails.push(FoundAddress {
                    first_name: entry.first_name.clone(),
                    last_name: entry.last_name.clone(),
                    domain: entry.domain.clone(),
                    email: outcome.candidate.clone(),
                    status: outcome.status,
                });
            }
            p.checked.push(CheckedCandidate {
                person_key: person_key.to_string(),
                outcome,
            });
        });
    }
}

/// Strictly better acceptance; ties keep the earlier discovery
fn outranks(candidate: &VerificationOutcome, current: &VerificationOutcome) -> bool {
    match (candidate.status.acceptance_rank(), current.status.acceptance_rank()) {
        (Some(new), Some(old)) => new < old,
        (Some(_), None) => true,
        _ => false,
    }
}

fn conclude(entry: &NameEntry, best: Option<VerificationOutcome>, stopped: bool) -> PersonResult {
    let status = match (&best, stopped) {
        (_, true) => PersonStatus::Stopped,
        (Some(b), false) if b.status == VerificationStatus::SmtpAccepted => PersonStatus::Verified,
        (Some(_), false) => PersonStatus::LikelyValid,
        (None, false) => PersonStatus::NotFound,
    };
    let detail = match (&best, stopped) {
        (_, true) => STOPPED_BY_USER.to_string(),
        (Some(b), false) => b.detail.clone(),
        (None, false) => "No valid email found".to_string(),
    };
    PersonResult::for_entry(entry, best.map(|b| b.candidate), status, detail)
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<Vec<PersonResult>>,
}

/// Owns the single active run and its progress
pub struct BatchSupervisor {
    runner: Arc<BatchRunner>,
    progress: ProgressHandle,
    active: Mutex<Option<ActiveRun>>,
}

impl BatchSupervisor {
    pub fn new(runner: BatchRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            progress: ProgressHandle::new(),
            active: Mutex::new(None),
        }
    }

    /// Start a run in the background.
    ///
    /// # Returns
    /// * `Err(ProbeError::BatchAlreadyRunning)` while another run is in flight
    /// * `Err(ProbeError::InvalidEntry)` for an empty entry list
    pub fn start(&self, entries: Vec<NameEntry>, options: BatchOptions) -> Result<()> {
        if entries.is_empty() {
            return Err(ProbeError::InvalidEntry("no entries to process".to_string()));
        }

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            warn!("Rejecting new run: a batch is already running");
            return Err(ProbeError::BatchAlreadyRunning);
        }

        // visible to pollers before the task is first scheduled
        self.progress.reset(entries.len());

        let cancel = CancellationToken::new();
        let runner = self.runner.clone();
        let progress = self.progress.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            runner.process_entries(entries, options, &progress, &token).await
        });

        *active = Some(ActiveRun { cancel, handle });
        Ok(())
    }

    /// Request cooperative cancellation. Returns whether a run was in flight.
    pub fn stop(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(run) if !run.handle.is_finished() => {
                info!("Stop requested for the active run");
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    pub fn progress(&self) -> RunProgress {
        self.progress.snapshot()
    }

    /// Wait for the active run to end and take its results
    pub async fn wait(&self) -> Result<Vec<PersonResult>> {
        let run = self.active.lock().take();
        let Some(run) = run else {
            return Ok(Vec::new());
        };

        run.handle.await.map_err(|err| {
            error!("Batch task failed: {}", err);
            self.progress.finish(RunStatus::Error, err.to_string());
            ProbeError::from(err)
        })
    }
}
