//! SMTP recipient probing
//!
//! Opens a session with the domain's first mail exchanger and asks whether it
//! would accept mail for the candidate (EHLO, optional STARTTLS, MAIL FROM,
//! RCPT TO). No message is ever sent; the session always ends with QUIT.

use crate::dns::MailDns;
use crate::syntax::split_address;
use crate::{ProbeConfig, VerificationStatus};
use async_trait::async_trait;
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Code;
use lettre::Address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// RCPT TO reply codes that definitively reject the recipient
pub const REJECTION_CODES: &[u16] = &[550, 551, 553, 554];

/// Classified answer of a probe step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: VerificationStatus,
    pub detail: String,
}

impl ProbeReport {
    pub fn new(status: VerificationStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// Live deliverability check for one address
#[async_trait]
pub trait MailboxProbe: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeReport;
}

/// Parameters of an SMTP session
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub port: u16,
    pub timeout: Duration,
    pub attempts: usize,
    pub retry_delay: Duration,
    pub helo_name: String,
    pub mail_from: String,
}

impl SmtpSettings {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            port: config.smtp_port,
            timeout: Duration::from_millis(config.smtp_timeout_ms),
            attempts: config.smtp_attempts.max(1),
            retry_delay: Duration::from_millis(config.smtp_retry_delay_ms),
            helo_name: config.helo_name.clone(),
            mail_from: config.mail_from.clone(),
        }
    }
}

/// Why a session ended without a classified reply
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionError {
    /// Refused, timed out or dropped by the server. Reported as-is.
    Connection(String),
    /// Anything else. Worth another attempt.
    Unexpected(String),
}

/// Map an RCPT TO reply code to a verdict
pub fn classify_rcpt_code(code: u16) -> ProbeReport {
    match code {
        250 => ProbeReport::new(VerificationStatus::SmtpAccepted, "Valid"),
        c if REJECTION_CODES.contains(&c) => {
            ProbeReport::new(VerificationStatus::SmtpRejected, "Invalid recipient")
        }
        c => ProbeReport::new(
            VerificationStatus::SmtpAmbiguous,
            format!("Ambiguous response: {c}"),
        ),
    }
}

fn reply_code(code: Code) -> u16 {
    code.to_string().parse().unwrap_or_default()
}

/// lettre-backed [`MailboxProbe`]
pub struct SmtpProber {
    dns: Arc<dyn MailDns>,
    settings: SmtpSettings,
}

impl SmtpProber {
    pub fn new(dns: Arc<dyn MailDns>, settings: SmtpSettings) -> Self {
        Self { dns, settings }
    }

    /// One full session: MX lookup, then the blocking SMTP dialogue on a worker thread
    async fn attempt(&self, address: &str, domain: &str) -> Result<ProbeReport, SessionError> {
        let hosts = self
            .dns
            .mx_hosts(domain)
            .await
            .map_err(|e| SessionError::Unexpected(format!("MX lookup for {domain} failed: {e}")))?;

        let host = hosts
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::Unexpected(format!("No MX records for {domain}")))?;

        debug!("Found MX record for {}: {}", domain, host);

        let settings = self.settings.clone();
        let address = address.to_string();
        tokio::task::spawn_blocking(move || run_session(&host, &address, &settings))
            .await
            .map_err(|e| SessionError::Unexpected(format!("SMTP worker failed: {e}")))?
    }
}

#[async_trait]
impl MailboxProbe for SmtpProber {
    #[instrument(skip(self), fields(address = %address))]
    async fn probe(&self, address: &str) -> ProbeReport {
        let Some((_, domain)) = split_address(address) else {
            return ProbeReport::new(VerificationStatus::InvalidSyntax, "Address has no domain");
        };

        let attempts = self.settings.attempts.max(1);
        let mut last_error = String::from("Verification failed");

        for attempt in 1..=attempts {
            debug!("SMTP attempt {}/{} for {}", attempt, attempts, address);

            match self.attempt(address, domain).await {
                Ok(report) => {
                    info!("RCPT TO verdict for {}: {:?} ({})", address, report.status, report.detail);
                    return report;
                }
                Err(SessionError::Connection(message)) => {
                    warn!("Connection-level failure while verifying {}: {}", address, message);
                    return ProbeReport::new(VerificationStatus::SmtpTransportError, message);
                }
                Err(SessionError::Unexpected(message)) => {
                    warn!(
                        "Unexpected error while verifying {} (attempt {}/{}): {}",
                        address, attempt, attempts, message
                    );
                    last_error = message;
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        ProbeReport::new(VerificationStatus::SmtpTransportError, last_error)
    }
}

/// Blocking SMTP dialogue against `host`. The connection is closed on every path.
fn run_session(host: &str, address: &str, settings: &SmtpSettings) -> Result<ProbeReport, SessionError> {
    let Ok(recipient) = Address::from_str(address) else {
        return Ok(ProbeReport::new(
            VerificationStatus::InvalidSyntax,
            "Recipient is not a valid address",
        ));
    };
    let sender = Address::from_str(&settings.mail_from)
        .map_err(|e| SessionError::Unexpected(format!("Invalid sender address: {e}")))?;
    let client_id = ClientId::Domain(settings.helo_name.clone());

    debug!("Connecting to SMTP server {}:{}", host, settings.port);
    let mut connection = SmtpConnection::connect(
        (host, settings.port),
        Some(settings.timeout),
        &client_id,
        None,
        None,
    )
    .map_err(|e| SessionError::Connection(format!("Connection to {host} failed: {e}")))?;

    let result = converse(&mut connection, host, &client_id, sender, recipient);

    if result.is_ok() {
        if let Err(e) = connection.quit() {
            debug!("QUIT to {} failed: {}", host, e);
        }
    } else {
        connection.abort();
    }

    result
}

fn converse(
    connection: &mut SmtpConnection,
    host: &str,
    client_id: &ClientId,
    sender: Address,
    recipient: Address,
) -> Result<ProbeReport, SessionError> {
    if connection.can_starttls() {
        debug!("Starting TLS with {}", host);
        let tls = TlsParameters::new(host.to_string())
            .map_err(|e| SessionError::Unexpected(format!("TLS setup for {host} failed: {e}")))?;
        // re-issues EHLO over the encrypted channel
        connection
            .starttls(&tls, client_id)
            .map_err(|e| SessionError::Unexpected(format!("STARTTLS with {host} failed: {e}")))?;
    }

    if let Err(e) = connection.command(Mail::new(Some(sender), vec![])) {
        return match e.status() {
            Some(code) => {
                debug!("MAIL FROM rejected by {} with {}", host, code);
                Ok(ProbeReport::new(
                    VerificationStatus::SmtpAmbiguous,
                    format!("Sender rejected: {e}"),
                ))
            }
            None => Err(SessionError::Connection(format!("Server disconnected: {e}"))),
        };
    }

    match connection.command(Rcpt::new(recipient, vec![])) {
        Ok(response) => Ok(classify_rcpt_code(reply_code(response.code()))),
        Err(e) => match e.status() {
            Some(code) => {
                let report = classify_rcpt_code(reply_code(code));
                if report.status == VerificationStatus::SmtpAmbiguous {
                    Ok(ProbeReport::new(report.status, format!("{}: {}", report.detail, e)))
                } else {
                    Ok(report)
                }
            }
            None => Err(SessionError::Connection(format!("Server disconnected: {e}"))),
        },
    }
}
