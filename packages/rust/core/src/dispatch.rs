//! Dispatcher: emails generated content exactly once per lead.
//!
//! Every sending run holds the dispatch [`RunLock`] for its whole duration
//! and takes it before reading any unsent lead. A lead is marked sent
//! right after its own transmission succeeds, so a run that dies halfway
//! leaves only unsent leads behind.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{Days, Local, NaiveDate};
use tracing::{info, instrument, warn};

use leadflow_mailer::{
    MailTransport, OutgoingEmail, SendError, SenderRotation, initial_subject, wrap_email_html,
};
use leadflow_shared::{Lead, LeadId, LeadflowError, OutreachConfig, Result, SenderIdentity};
use leadflow_storage::Storage;

use crate::lock::RunLock;
use crate::progress::ProgressReporter;

/// Attempts at persisting a delivery before the run is aborted.
const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(500);

/// Subject prefix of preview messages.
pub const PREVIEW_PREFIX: &str = "[PREVIEW] ";

/// Counters for one sending run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: usize,
    /// Leads whose transmission failed; left unsent with `last_error`.
    pub failed: usize,
    /// Senders retired after an authentication failure.
    pub retired_senders: Vec<String>,
    pub duration: Duration,
}

/// Result of a locked sending run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Another process holds the dispatch lock; nothing was read or sent.
    AlreadyRunning,
    Completed(DispatchStats),
}

impl DispatchOutcome {
    pub fn stats(&self) -> Option<&DispatchStats> {
        match self {
            Self::AlreadyRunning => None,
            Self::Completed(stats) => Some(stats),
        }
    }
}

pub(crate) enum Delivery {
    Sent,
    Failed(SendError),
}

/// Sends initial emails and follow-ups through a sender rotation.
pub struct Dispatcher<'a> {
    pub(crate) storage: &'a Storage,
    pub(crate) transport: &'a dyn MailTransport,
    pub(crate) senders: &'a [SenderIdentity],
    pub(crate) outreach: &'a OutreachConfig,
    pub(crate) lock_path: PathBuf,
    pub(crate) send_delay: Duration,
    pub(crate) today: NaiveDate,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        storage: &'a Storage,
        transport: &'a dyn MailTransport,
        senders: &'a [SenderIdentity],
        outreach: &'a OutreachConfig,
        lock_path: &Path,
    ) -> Self {
        Self {
            storage,
            transport,
            senders,
            outreach,
            lock_path: lock_path.to_path_buf(),
            send_delay: Duration::ZERO,
            today: Local::now().date_naive(),
        }
    }

    /// Pause between consecutive sends.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Date used for follow-up scheduling (defaults to the local date).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Send every generated, unsent lead once.
    #[instrument(skip_all, fields(lock = %self.lock_path.display()))]
    pub async fn dispatch(&self, progress: &dyn ProgressReporter) -> Result<DispatchOutcome> {
        let Some(_lock) = RunLock::try_acquire(&self.lock_path)? else {
            warn!("dispatcher already running, exiting");
            return Ok(DispatchOutcome::AlreadyRunning);
        };

        let start = Instant::now();
        let mut rotation = SenderRotation::new(self.senders.to_vec())?;
        let leads = self.storage.list_ready_to_send().await?;
        let total = leads.len();
        let next_followup = self.next_followup_date();
        let mut stats = DispatchStats::default();

        progress.phase("Dispatching emails");
        info!(ready = total, senders = rotation.active_count(), "starting dispatch");

        for (i, lead) in leads.iter().enumerate() {
            let Some(email) = self.initial_email(lead, &lead.email) else {
                warn!(lead_id = %lead.id, "generated lead has no content, skipping");
                continue;
            };
            if i > 0 {
                self.pause().await;
            }

            match self.deliver(&mut rotation, &email, &mut stats).await? {
                Delivery::Sent => {
                    if !self.persist_sent(&lead.id, next_followup).await? {
                        warn!(lead_id = %lead.id, "lead changed while sending, not marked");
                    }
                    stats.sent += 1;
                    info!(lead_id = %lead.id, to = %lead.email, "email sent");
                }
                Delivery::Failed(e) => {
                    warn!(lead_id = %lead.id, to = %lead.email, error = %e, "send failed, lead left unsent");
                    self.storage.set_lead_error(&lead.id, &e.to_string()).await?;
                    stats.failed += 1;
                }
            }
            progress.item(i + 1, total, &lead.company_name);
        }

        stats.duration = start.elapsed();
        progress.finish(&format!("{} sent, {} failed", stats.sent, stats.failed));
        info!(
            sent = stats.sent,
            failed = stats.failed,
            retired = stats.retired_senders.len(),
            duration_ms = stats.duration.as_millis(),
            "dispatch complete"
        );
        Ok(DispatchOutcome::Completed(stats))
    }

    /// Send the next `preview_limit` would-be emails to `recipient`.
    ///
    /// Takes no lock and changes no lead.
    #[instrument(skip_all, fields(%recipient))]
    pub async fn preview(&self, recipient: &str, progress: &dyn ProgressReporter) -> Result<DispatchStats> {
        let start = Instant::now();
        let mut rotation = SenderRotation::new(self.senders.to_vec())?;
        let leads: Vec<Lead> = self
            .storage
            .list_ready_to_send()
            .await?
            .into_iter()
            .take(self.outreach.preview_limit)
            .collect();
        let total = leads.len();
        let mut stats = DispatchStats::default();

        progress.phase("Sending previews");
        for (i, lead) in leads.iter().enumerate() {
            let Some(mut email) = self.initial_email(lead, recipient) else {
                continue;
            };
            email.subject = format!("{PREVIEW_PREFIX}{}", email.subject);
            if i > 0 {
                self.pause().await;
            }
            self.record_preview(&mut rotation, &email, lead, &mut stats).await?;
            progress.item(i + 1, total, &lead.company_name);
        }

        stats.duration = start.elapsed();
        progress.finish(&format!("{} previews sent to {recipient}", stats.sent));
        info!(sent = stats.sent, failed = stats.failed, "preview complete");
        Ok(stats)
    }

    fn initial_email(&self, lead: &Lead, to: &str) -> Option<OutgoingEmail> {
        let content = lead.content_html.as_deref()?;
        Some(OutgoingEmail {
            to: to.to_string(),
            subject: initial_subject(self.outreach, &lead.company_name),
            html: wrap_email_html(content, self.outreach),
        })
    }

    /// Mark a delivered lead sent, retrying while the store is busy.
    async fn persist_sent(&self, id: &LeadId, next_followup: NaiveDate) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.storage.mark_sent(id, next_followup).await {
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    warn!(lead_id = %id, attempt, error = %e, "could not mark lead sent, retrying");
                    tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Record a delivered follow-up, retrying while the store is busy.
    pub(crate) async fn persist_followup(
        &self,
        id: &LeadId,
        delivered: u32,
        next_followup: NaiveDate,
    ) -> Result<bool> {
        let mut attempt = 1;
        loop {
            match self.storage.record_followup(id, delivered, next_followup).await {
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    warn!(lead_id = %id, attempt, error = %e, "could not record follow-up, retrying");
                    tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub(crate) fn next_followup_date(&self) -> NaiveDate {
        self.today + Days::new(u64::from(self.outreach.followup_interval_days))
    }

    pub(crate) async fn pause(&self) {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
    }

    pub(crate) async fn record_preview(
        &self,
        rotation: &mut SenderRotation,
        email: &OutgoingEmail,
        lead: &Lead,
        stats: &mut DispatchStats,
    ) -> Result<()> {
        match self.deliver(rotation, email, stats).await? {
            Delivery::Sent => {
                stats.sent += 1;
                info!(lead_id = %lead.id, to = %email.to, "preview sent");
            }
            Delivery::Failed(e) => {
                warn!(lead_id = %lead.id, error = %e, "preview failed");
                stats.failed += 1;
            }
        }
        Ok(())
    }

    /// Send `email` as the next sender in rotation.
    ///
    /// A sender whose login is refused is retired and the same email is
    /// retried as the next sender. Fails with a configuration error once
    /// no sender is left.
    pub(crate) async fn deliver(
        &self,
        rotation: &mut SenderRotation,
        email: &OutgoingEmail,
        stats: &mut DispatchStats,
    ) -> Result<Delivery> {
        loop {
            let Some((idx, sender)) = rotation.next_sender() else {
                return Err(LeadflowError::config(
                    "every sender account was rejected by the SMTP server",
                ));
            };
            let result = self.transport.send(sender, email).await;
            match result {
                Ok(()) => return Ok(Delivery::Sent),
                Err(e) if e.is_auth() => {
                    let address = sender.address.clone();
                    rotation.retire(idx);
                    warn!(
                        sender = %address,
                        remaining = rotation.active_count(),
                        error = %e,
                        "sender login refused, retiring for this run"
                    );
                    stats.retired_senders.push(address);
                }
                Err(e) => return Ok(Delivery::Failed(e)),
            }
        }
    }
}
