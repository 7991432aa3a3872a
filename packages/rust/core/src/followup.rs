//! Templated follow-ups for leads that got the initial email.

use std::time::Instant;

use tracing::{info, instrument, warn};

use leadflow_mailer::{OutgoingEmail, SenderRotation, render_followup};
use leadflow_shared::{Lead, Result};

use crate::dispatch::{Delivery, DispatchOutcome, DispatchStats, Dispatcher, PREVIEW_PREFIX};
use crate::lock::RunLock;
use crate::progress::ProgressReporter;

impl Dispatcher<'_> {
    /// Send the next follow-up to every lead that is due.
    ///
    /// Holds the dispatch lock, so it never overlaps an initial dispatch.
    #[instrument(skip_all, fields(today = %self.today))]
    pub async fn send_followups(&self, progress: &dyn ProgressReporter) -> Result<DispatchOutcome> {
        let Some(_lock) = RunLock::try_acquire(&self.lock_path)? else {
            warn!("dispatcher already running, skipping follow-ups");
            return Ok(DispatchOutcome::AlreadyRunning);
        };

        let start = Instant::now();
        let mut rotation = SenderRotation::new(self.senders.to_vec())?;
        let due = self
            .storage
            .list_followups_due(self.today, self.outreach.max_followups)
            .await?;
        let total = due.len();
        let next_followup = self.next_followup_date();
        let mut stats = DispatchStats::default();

        progress.phase("Sending follow-ups");
        info!(due = total, "starting follow-ups");

        for (i, lead) in due.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let email = self.followup_email(lead, &lead.email);

            match self.deliver(&mut rotation, &email, &mut stats).await? {
                Delivery::Sent => {
                    let recorded = self
                        .persist_followup(&lead.id, lead.followup_count, next_followup)
                        .await?;
                    if !recorded {
                        warn!(lead_id = %lead.id, "follow-up count changed while sending");
                    }
                    stats.sent += 1;
                    info!(
                        lead_id = %lead.id,
                        to = %lead.email,
                        followup = lead.followup_count + 1,
                        "follow-up sent"
                    );
                }
                Delivery::Failed(e) => {
                    warn!(lead_id = %lead.id, to = %lead.email, error = %e, "follow-up failed");
                    self.storage.set_lead_error(&lead.id, &e.to_string()).await?;
                    stats.failed += 1;
                }
            }
            progress.item(i + 1, total, &lead.company_name);
        }

        stats.duration = start.elapsed();
        progress.finish(&format!("{} follow-ups sent, {} failed", stats.sent, stats.failed));
        info!(
            sent = stats.sent,
            failed = stats.failed,
            duration_ms = stats.duration.as_millis(),
            "follow-ups complete"
        );
        Ok(DispatchOutcome::Completed(stats))
    }

    /// Send the follow-ups that are due to `recipient` instead, unchanged
    /// otherwise. No lock, no state change.
    #[instrument(skip_all, fields(%recipient))]
    pub async fn preview_followups(
        &self,
        recipient: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DispatchStats> {
        let start = Instant::now();
        let mut rotation = SenderRotation::new(self.senders.to_vec())?;
        let due: Vec<Lead> = self
            .storage
            .list_followups_due(self.today, self.outreach.max_followups)
            .await?
            .into_iter()
            .take(self.outreach.preview_limit)
            .collect();
        let total = due.len();
        let mut stats = DispatchStats::default();

        progress.phase("Sending follow-up previews");
        for (i, lead) in due.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            let mut email = self.followup_email(lead, recipient);
            email.subject = format!("{PREVIEW_PREFIX}{}", email.subject);
            self.record_preview(&mut rotation, &email, lead, &mut stats).await?;
            progress.item(i + 1, total, &lead.company_name);
        }

        stats.duration = start.elapsed();
        progress.finish(&format!("{} follow-up previews sent to {recipient}", stats.sent));
        Ok(stats)
    }

    fn followup_email(&self, lead: &Lead, to: &str) -> OutgoingEmail {
        let rendered = render_followup(
            lead.followup_count,
            &lead.company_name,
            lead.category.as_deref(),
            self.outreach,
        );
        OutgoingEmail {
            to: to.to_string(),
            subject: rendered.subject,
            html: rendered.html,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use leadflow_shared::OutreachConfig;

    use crate::progress::SilentProgress;
    use crate::testing::{RecordingTransport, generated_lead, lock_path, senders, test_storage};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn walks_templates_on_schedule() {
        let storage = test_storage().await;
        let id = generated_lead(&storage, "Sweet Crumbs", "hello@sweetcrumbs.ca").await;
        let senders = senders(2);
        let outreach = OutreachConfig::default();
        let lock = lock_path();

        let initial = RecordingTransport::new();
        Dispatcher::new(&storage, &initial, &senders, &outreach, &lock)
            .with_today(day(1))
            .dispatch(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(
            storage.get_lead(&id).await.unwrap().unwrap().next_followup_on,
            Some(day(8))
        );

        // Not due yet.
        let transport = RecordingTransport::new();
        let outcome = Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
            .with_today(day(7))
            .send_followups(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(outcome.stats().unwrap().sent, 0);

        let expected = [
            (day(8), "Quick follow-up: Sweet Crumbs analytics offer", day(15)),
            (day(15), "Still available: free pilot dashboard for Sweet Crumbs", day(22)),
            (day(22), "Last note: Sweet Crumbs custom analytics", day(29)),
        ];
        for (n, (today, subject, next)) in expected.iter().enumerate() {
            Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
                .with_today(*today)
                .send_followups(&SilentProgress)
                .await
                .unwrap();
            let delivered = transport.delivered();
            assert_eq!(delivered.len(), n + 1);
            assert_eq!(delivered[n].1.subject, *subject);
            assert!(delivered[n].1.html.contains("bakery"));

            let lead = storage.get_lead(&id).await.unwrap().unwrap();
            assert_eq!(lead.followup_count, n as u32 + 1);
            assert_eq!(lead.next_followup_on, Some(*next));
        }

        // Three follow-ups is the limit.
        let outcome = Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
            .with_today(day(30))
            .send_followups(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(outcome.stats().unwrap().sent, 0);
    }

    #[tokio::test]
    async fn followups_respect_dispatch_lock() {
        let storage = test_storage().await;
        let senders = senders(1);
        let outreach = OutreachConfig::default();
        let lock = lock_path();
        let transport = RecordingTransport::new();
        let _held = RunLock::try_acquire(&lock).unwrap().unwrap();

        let outcome = Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
            .send_followups(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::AlreadyRunning);
    }

    #[tokio::test]
    async fn failed_followup_stays_due() {
        let storage = test_storage().await;
        let id = generated_lead(&storage, "Bounce Co", "gone@bounce.ca").await;
        let senders = senders(1);
        let outreach = OutreachConfig::default();
        let lock = lock_path();
        Dispatcher::new(&storage, &RecordingTransport::new(), &senders, &outreach, &lock)
            .with_today(day(1))
            .dispatch(&SilentProgress)
            .await
            .unwrap();

        let transport = RecordingTransport::new().rejecting("gone@bounce.ca");
        let outcome = Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
            .with_today(day(9))
            .send_followups(&SilentProgress)
            .await
            .unwrap();
        assert_eq!(outcome.stats().unwrap().failed, 1);

        let lead = storage.get_lead(&id).await.unwrap().unwrap();
        assert_eq!(lead.followup_count, 0);
        assert_eq!(lead.next_followup_on, Some(day(8)));
        assert!(lead.last_error.is_some());
    }

    #[tokio::test]
    async fn preview_leaves_schedule_alone() {
        let storage = test_storage().await;
        let id = generated_lead(&storage, "Sweet Crumbs", "hello@sweetcrumbs.ca").await;
        let senders = senders(1);
        let outreach = OutreachConfig::default();
        let lock = lock_path();
        Dispatcher::new(&storage, &RecordingTransport::new(), &senders, &outreach, &lock)
            .with_today(day(1))
            .dispatch(&SilentProgress)
            .await
            .unwrap();

        let transport = RecordingTransport::new();
        let stats = Dispatcher::new(&storage, &transport, &senders, &outreach, &lock)
            .with_today(day(8))
            .preview_followups("me@leadflow.example", &SilentProgress)
            .await
            .unwrap();
        assert_eq!(stats.sent, 1);
        let (_, email) = &transport.delivered()[0];
        assert_eq!(email.to, "me@leadflow.example");
        assert_eq!(email.subject, "[PREVIEW] Quick follow-up: Sweet Crumbs analytics offer");

        let lead = storage.get_lead(&id).await.unwrap().unwrap();
        assert_eq!(lead.followup_count, 0);
        assert_eq!(lead.next_followup_on, Some(day(8)));
    }
}
