//! End-to-end `run` pipeline: scrape → generate → dispatch → follow-ups.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use leadflow_content::ContentModel;
use leadflow_crawler::Harvester;
use leadflow_mailer::MailTransport;
use leadflow_shared::{Result, Settings};
use leadflow_storage::Storage;

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::generate::generate_pending;
use crate::lock::RunLock;
use crate::progress::ProgressReporter;

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Completed(String),
    Skipped(String),
    Failed(String),
}

/// One line of the run summary.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: &'static str,
    pub status: StageStatus,
    pub duration: Duration,
}

/// Result of a completed `run`.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &StageReport> {
        self.stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::Failed(_)))
    }

    pub fn succeeded(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    fn record(&mut self, name: &'static str, status: StageStatus, duration: Duration) {
        self.stages.push(StageReport {
            name,
            status,
            duration,
        });
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(detail) => write!(f, "ok: {detail}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(err) => write!(f, "FAILED: {err}"),
        }
    }
}

/// Result of [`Pipeline::run`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Another `run` holds the pipeline lock.
    AlreadyRunning,
    Completed(RunSummary),
}

/// The collaborators one `run` drives.
///
/// Stages without a collaborator (no harvester, no model) are skipped.
pub struct Pipeline<'a> {
    storage: &'a Storage,
    settings: &'a Settings,
    transport: &'a dyn MailTransport,
    harvester: Option<Harvester<'a>>,
    model: Option<&'a dyn ContentModel>,
    today: Option<NaiveDate>,
}

impl<'a> Pipeline<'a> {
    pub fn new(storage: &'a Storage, settings: &'a Settings, transport: &'a dyn MailTransport) -> Self {
        Self {
            storage,
            settings,
            transport,
            harvester: None,
            model: None,
            today: None,
        }
    }

    pub fn with_harvester(mut self, harvester: Harvester<'a>) -> Self {
        self.harvester = Some(harvester);
        self
    }

    pub fn with_model(mut self, model: &'a dyn ContentModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Run every stage in order under the pipeline lock.
    ///
    /// A failing stage is recorded and the next one still runs.
    #[instrument(skip_all, fields(lock = %self.settings.pipeline_lock_path.display()))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunOutcome> {
        let Some(_lock) = RunLock::try_acquire(&self.settings.pipeline_lock_path)? else {
            warn!("pipeline already running, exiting");
            return Ok(RunOutcome::AlreadyRunning);
        };

        let start = Instant::now();
        let mut summary = RunSummary::default();
        info!("starting pipeline run");

        // --- Stage 1: Scrape ---
        let stage = Instant::now();
        let status = match (&self.harvester, self.settings.scrape.enabled) {
            (_, false) => StageStatus::Skipped("disabled in config".into()),
            (None, true) => StageStatus::Skipped("no Places client".into()),
            (Some(harvester), true) => {
                progress.phase("Scraping leads");
                match harvester.harvest(self.storage).await {
                    Ok(stats) => StageStatus::Completed(format!(
                        "{} new leads, {} duplicates, {} errors",
                        stats.new_leads, stats.duplicates, stats.errors
                    )),
                    Err(e) => failed("scrape", &e),
                }
            }
        };
        summary.record("scrape", status, stage.elapsed());

        // --- Stage 2: Generate ---
        let stage = Instant::now();
        let status = match self.model {
            None => StageStatus::Skipped("no content model".into()),
            Some(model) => {
                let delay = self
                    .settings
                    .llm
                    .as_ref()
                    .map(|llm| llm.request_delay)
                    .unwrap_or_default();
                match generate_pending(self.storage, model, &self.settings.outreach, delay, progress)
                    .await
                {
                    Ok(stats) => StageStatus::Completed(format!(
                        "{} generated, {} failed",
                        stats.generated, stats.failed
                    )),
                    Err(e) => failed("generate", &e),
                }
            }
        };
        summary.record("generate", status, stage.elapsed());

        // --- Stage 3: Dispatch ---
        let dispatcher = self.dispatcher();
        let stage = Instant::now();
        let status = sending_status("dispatch", dispatcher.dispatch(progress).await);
        summary.record("dispatch", status, stage.elapsed());

        // --- Stage 4: Follow-ups ---
        let stage = Instant::now();
        let status = sending_status("followup", dispatcher.send_followups(progress).await);
        summary.record("followup", status, stage.elapsed());

        summary.duration = start.elapsed();
        for report in &summary.stages {
            info!(
                stage = report.name,
                duration_ms = report.duration.as_millis(),
                status = %report.status,
                "stage summary"
            );
        }
        info!(
            succeeded = summary.succeeded(),
            duration_ms = summary.duration.as_millis(),
            "pipeline run complete"
        );
        Ok(RunOutcome::Completed(summary))
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        let dispatcher = Dispatcher::new(
            self.storage,
            self.transport,
            &self.settings.senders,
            &self.settings.outreach,
            &self.settings.dispatch_lock_path,
        )
        .with_send_delay(self.settings.send_delay);
        match self.today {
            Some(today) => dispatcher.with_today(today),
            None => dispatcher,
        }
    }
}

fn failed(stage: &str, err: &leadflow_shared::LeadflowError) -> StageStatus {
    error!(stage, error = %err, "stage failed");
    StageStatus::Failed(err.to_string())
}

fn sending_status(stage: &str, outcome: Result<DispatchOutcome>) -> StageStatus {
    match outcome {
        Ok(DispatchOutcome::Completed(stats)) => StageStatus::Completed(format!(
            "{} sent, {} failed",
            stats.sent, stats.failed
        )),
        Ok(DispatchOutcome::AlreadyRunning) => {
            StageStatus::Skipped("dispatcher already running".into())
        }
        Err(e) => failed(stage, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_shared::{LeadStatus, NewLead, OutreachConfig, ScrapeConfig, SmtpConfig};

    use crate::progress::SilentProgress;
    use crate::testing::{RecordingTransport, ScriptedModel, lock_path, senders, test_storage};

    fn settings() -> Settings {
        Settings {
            db_path: "unused.db".into(),
            dispatch_lock_path: lock_path(),
            pipeline_lock_path: lock_path(),
            send_delay: Duration::ZERO,
            smtp: SmtpConfig::default(),
            outreach: OutreachConfig::default(),
            scrape: ScrapeConfig {
                enabled: false,
                ..ScrapeConfig::default()
            },
            llm: None,
            places_api_key: None,
            senders: senders(3),
        }
    }

    fn html_model() -> ScriptedModel {
        ScriptedModel::new(|_| Ok("<div><p>Your dashboard is ready.</p></div>".into()))
    }

    #[tokio::test]
    async fn runs_every_stage_in_order() {
        let storage = test_storage().await;
        for (name, email) in [("Sweet Crumbs", "hello@sweetcrumbs.ca"), ("Wok This Way", "takeout@bellnet.ca")] {
            storage.insert_lead(&NewLead::new(name, email, "import")).await.unwrap();
        }
        let settings = settings();
        let transport = RecordingTransport::new();
        let model = html_model();

        let outcome = Pipeline::new(&storage, &settings, &transport)
            .with_model(&model)
            .run(&SilentProgress)
            .await
            .unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run");
        };

        let names: Vec<&str> = summary.stages.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["scrape", "generate", "dispatch", "followup"]);
        assert!(summary.succeeded());
        assert!(matches!(summary.stage("scrape").unwrap().status, StageStatus::Skipped(_)));
        assert_eq!(
            summary.stage("dispatch").unwrap().status,
            StageStatus::Completed("2 sent, 0 failed".into())
        );
        assert_eq!(transport.count(), 2);

        let counts = storage.count_by_status().await.unwrap();
        assert_eq!(counts.sent, 2);
        assert_eq!(counts.new, 0);

        // Nothing left to do on a second pass.
        let RunOutcome::Completed(_) = Pipeline::new(&storage, &settings, &transport)
            .with_model(&model)
            .run(&SilentProgress)
            .await
            .unwrap()
        else {
            panic!("expected a completed run");
        };
        assert_eq!(transport.count(), 2);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn failed_stage_does_not_stop_the_run() {
        let storage = test_storage().await;
        let id = storage
            .insert_lead(&NewLead::new("Sweet Crumbs", "hello@sweetcrumbs.ca", "import"))
            .await
            .unwrap()
            .unwrap();
        let settings = settings();
        let transport = RecordingTransport::new()
            .bad_login("s1@leadflow.example")
            .bad_login("s2@leadflow.example")
            .bad_login("s3@leadflow.example");
        let model = html_model();

        let RunOutcome::Completed(summary) = Pipeline::new(&storage, &settings, &transport)
            .with_model(&model)
            .run(&SilentProgress)
            .await
            .unwrap()
        else {
            panic!("expected a completed run");
        };
        assert!(!summary.succeeded());
        assert!(matches!(summary.stage("dispatch").unwrap().status, StageStatus::Failed(_)));
        // Follow-ups still ran (nothing due).
        assert!(matches!(summary.stage("followup").unwrap().status, StageStatus::Completed(_)));

        let lead = storage.get_lead(&id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Generated);
        assert!(!lead.sent);
    }

    #[tokio::test]
    async fn held_pipeline_lock_skips_run() {
        let storage = test_storage().await;
        storage
            .insert_lead(&NewLead::new("Sweet Crumbs", "hello@sweetcrumbs.ca", "import"))
            .await
            .unwrap();
        let settings = settings();
        let transport = RecordingTransport::new();
        let model = html_model();
        let _held = RunLock::try_acquire(&settings.pipeline_lock_path).unwrap().unwrap();

        let outcome = Pipeline::new(&storage, &settings, &transport)
            .with_model(&model)
            .run(&SilentProgress)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::AlreadyRunning));
        assert_eq!(model.calls(), 0);
        assert_eq!(storage.count_by_status().await.unwrap().new, 1);
    }

    #[tokio::test]
    async fn held_dispatch_lock_is_reported_as_skipped() {
        let storage = test_storage().await;
        let settings = settings();
        let transport = RecordingTransport::new();
        let _held = RunLock::try_acquire(&settings.dispatch_lock_path).unwrap().unwrap();

        let RunOutcome::Completed(summary) = Pipeline::new(&storage, &settings, &transport)
            .run(&SilentProgress)
            .await
            .unwrap()
        else {
            panic!("expected a completed run");
        };
        assert!(summary.succeeded());
        assert_eq!(
            summary.stage("dispatch").unwrap().status,
            StageStatus::Skipped("dispatcher already running".into())
        );
        assert!(matches!(summary.stage("generate").unwrap().status, StageStatus::Skipped(_)));
    }
}
