//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

use leadflow_content::GeminiClient;
use leadflow_core::{
    DispatchOutcome, DispatchStats, Dispatcher, Pipeline, ProgressReporter, RunLock, RunOutcome,
    generate_pending,
};
use leadflow_crawler::{DnsMxVerifier, Harvester, MxVerifier, PlacesClient, SiteScraper, import_csv};
use leadflow_mailer::SmtpMailer;
use leadflow_shared::{
    AppConfig, LeadStatus, Settings, Stages, config_file_path, expand_home, init_config,
    load_config,
};
use leadflow_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leadflow: find local businesses and email them once.
#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "Scrape leads, generate personalized outreach emails, and dispatch them exactly once.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Find businesses via Places search and scrape their websites for emails.
    Scrape,

    /// Import leads from a CSV file (company_name,email,category).
    Import {
        /// Path to the CSV file.
        csv: PathBuf,
    },

    /// Generate outreach content for every new lead.
    Generate,

    /// Email every generated lead that has not been sent yet.
    Dispatch {
        /// Send up to `outreach.preview_limit` emails to this address instead.
        /// Nothing is marked sent.
        #[arg(long, value_name = "ADDR")]
        preview_to: Option<String>,
    },

    /// Send due follow-ups.
    Followup {
        /// Send due follow-ups to this address instead, without recording them.
        #[arg(long, value_name = "ADDR")]
        preview_to: Option<String>,
    },

    /// Run scrape, generate, dispatch and follow-ups in order.
    Run,

    /// Show lead counts per status.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List stored leads, newest first.
    List {
        /// Only leads in this status (new, generated, sent).
        #[arg(long)]
        status: Option<LeadStatus>,

        /// Maximum number of leads to show.
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Prefix of the dated `leadflow run` log files.
const RUN_LOG_PREFIX: &str = "leadflow-run";

/// Initialize tracing based on CLI flags.
///
/// `leadflow run` also writes to a daily log file under `defaults.log_dir`;
/// the returned guard flushes it and must live until exit.
pub(crate) fn init_tracing(cli: &Cli) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadflow=info",
        1 => "leadflow=debug",
        _ => "leadflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    let (text, json) = match cli.log_format {
        LogFormat::Text => (Some(fmt::layer().with_target(false)), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    let mut file_error = None;
    let (file, guard) = match run_log_dir(&cli.command) {
        Some(dir) => match run_log_appender(&dir) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_ansi(false).with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_error = Some((dir, e));
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .with(file)
        .init();

    if let Some((dir, e)) = file_error {
        warn!(dir = %dir.display(), error = %e, "could not open run log file, logging to stderr only");
    }
    guard
}

/// Log directory for commands that keep a log file.
fn run_log_dir(command: &Command) -> Option<PathBuf> {
    if !matches!(command, Command::Run) {
        return None;
    }
    let config = load_config().unwrap_or_default();
    Some(expand_home(&config.defaults.log_dir))
}

/// Daily-rotated appender writing `leadflow-run.YYYY-MM-DD.log` in `dir`.
fn run_log_appender(dir: &Path) -> std::result::Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(RUN_LOG_PREFIX)
        .filename_suffix("log")
        .build(dir)
}

/// Load `.env` from the working directory, if there is one.
pub(crate) fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "could not read .env file"),
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scrape => cmd_scrape().await,
        Command::Import { csv } => cmd_import(&csv).await,
        Command::Generate => cmd_generate().await,
        Command::Dispatch { preview_to } => cmd_dispatch(preview_to.as_deref()).await,
        Command::Followup { preview_to } => cmd_followup(preview_to.as_deref()).await,
        Command::Run => cmd_run().await,
        Command::Status { json } => cmd_status(json).await,
        Command::List {
            status,
            limit,
            json,
        } => cmd_list(status, limit, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load the config file and resolve credentials for `stages`.
fn resolve(stages: Stages) -> Result<(AppConfig, Settings)> {
    let config = load_config()?;
    let settings = Settings::from_env(&config, stages)?;
    Ok((config, settings))
}

async fn open_storage(settings: &Settings) -> Result<Storage> {
    info!(db = %settings.db_path.display(), "opening lead store");
    Ok(Storage::open(&settings.db_path).await?)
}

fn places_client(settings: &Settings) -> Result<PlacesClient> {
    let key = settings
        .places_api_key
        .as_deref()
        .ok_or_else(|| eyre!("Places API key was not resolved"))?;
    Ok(PlacesClient::new(&settings.scrape.endpoint, key)?)
}

fn gemini_client(settings: &Settings) -> Result<GeminiClient> {
    let llm = settings
        .llm
        .as_ref()
        .ok_or_else(|| eyre!("LLM settings were not resolved"))?;
    Ok(GeminiClient::new(llm)?)
}

/// Scrape harvester, with MX checking when `scrape.verify_mx` is set.
fn harvester<'a>(
    places: &'a PlacesClient,
    scraper: &'a SiteScraper,
    mx: Option<&'a dyn MxVerifier>,
    settings: &'a Settings,
) -> Harvester<'a> {
    let harvester = Harvester::new(places, scraper, &settings.scrape);
    match mx {
        Some(mx) => harvester.with_mx_verifier(mx),
        None => harvester,
    }
}

fn mx_verifier(settings: &Settings) -> Option<DnsMxVerifier> {
    settings.scrape.verify_mx.then(DnsMxVerifier::new)
}

/// `true` (after a warning) when another run holds the lock at `path`.
///
/// Checked before the store is opened, so a run that backs off never
/// touches the database.
fn lock_is_held(path: &Path, what: &str) -> Result<bool> {
    if RunLock::is_held(path)? {
        warn!(lock = %path.display(), "another {what} holds the lock; exiting");
        return Ok(true);
    }
    Ok(false)
}

fn dispatcher<'a>(
    storage: &'a Storage,
    mailer: &'a SmtpMailer,
    settings: &'a Settings,
) -> Dispatcher<'a> {
    Dispatcher::new(
        storage,
        mailer,
        &settings.senders,
        &settings.outreach,
        &settings.dispatch_lock_path,
    )
    .with_send_delay(settings.send_delay)
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

async fn cmd_scrape() -> Result<()> {
    let (_, settings) = resolve(Stages {
        scrape: true,
        ..Stages::default()
    })?;
    let storage = open_storage(&settings).await?;
    let places = places_client(&settings)?;
    let scraper = SiteScraper::new()?;
    let mx = mx_verifier(&settings);

    let reporter = CliProgress::new();
    reporter.phase("Scraping leads");
    let stats = harvester(&places, &scraper, mx.as_ref().map(|m| m as &dyn MxVerifier), &settings)
        .harvest(&storage)
        .await?;
    drop(reporter);

    println!();
    println!("  Scrape complete");
    println!("  New leads:   {}", stats.new_leads);
    println!("  Duplicates:  {}", stats.duplicates);
    println!("  No email:    {}", stats.no_email);
    println!("  No website:  {}", stats.no_website);
    println!("  No MX:       {}", stats.mx_failures);
    println!("  Errors:      {}", stats.errors);
    println!("  Time:        {:.1}s", stats.duration.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_import(csv: &Path) -> Result<()> {
    let (_, settings) = resolve(Stages::default())?;
    let storage = open_storage(&settings).await?;
    let stats = import_csv(&storage, csv).await?;

    println!();
    println!("  Imported:    {}", stats.imported);
    println!("  Duplicates:  {}", stats.duplicates);
    println!("  Skipped:     {}", stats.skipped);
    println!();
    Ok(())
}

async fn cmd_generate() -> Result<()> {
    let (_, settings) = resolve(Stages {
        generate: true,
        ..Stages::default()
    })?;
    let storage = open_storage(&settings).await?;
    let model = gemini_client(&settings)?;
    let delay = settings
        .llm
        .as_ref()
        .map(|llm| llm.request_delay)
        .unwrap_or_default();

    let reporter = CliProgress::new();
    let stats = generate_pending(&storage, &model, &settings.outreach, delay, &reporter).await?;

    println!();
    println!("  Generated:   {}", stats.generated);
    println!("  Failed:      {}", stats.failed);
    println!("  Time:        {:.1}s", stats.duration.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_dispatch(preview_to: Option<&str>) -> Result<()> {
    let (_, settings) = resolve(Stages {
        send: true,
        ..Stages::default()
    })?;
    if preview_to.is_none() && lock_is_held(&settings.dispatch_lock_path, "dispatcher")? {
        return Ok(());
    }
    let storage = open_storage(&settings).await?;
    let mailer = SmtpMailer::new(&settings.smtp);
    let dispatcher = dispatcher(&storage, &mailer, &settings);
    let reporter = CliProgress::new();

    if let Some(recipient) = preview_to {
        let stats = dispatcher.preview(recipient, &reporter).await?;
        print_send_stats("Previews sent", &stats);
        return Ok(());
    }

    match dispatcher.dispatch(&reporter).await? {
        DispatchOutcome::AlreadyRunning => {
            warn!("another dispatcher holds the lock; nothing sent");
        }
        DispatchOutcome::Completed(stats) => print_send_stats("Sent", &stats),
    }
    Ok(())
}

async fn cmd_followup(preview_to: Option<&str>) -> Result<()> {
    let (_, settings) = resolve(Stages {
        send: true,
        ..Stages::default()
    })?;
    if preview_to.is_none() && lock_is_held(&settings.dispatch_lock_path, "dispatcher")? {
        return Ok(());
    }
    let storage = open_storage(&settings).await?;
    let mailer = SmtpMailer::new(&settings.smtp);
    let dispatcher = dispatcher(&storage, &mailer, &settings);
    let reporter = CliProgress::new();

    if let Some(recipient) = preview_to {
        let stats = dispatcher.preview_followups(recipient, &reporter).await?;
        print_send_stats("Previews sent", &stats);
        return Ok(());
    }

    match dispatcher.send_followups(&reporter).await? {
        DispatchOutcome::AlreadyRunning => {
            warn!("another dispatcher holds the lock; no follow-ups sent");
        }
        DispatchOutcome::Completed(stats) => print_send_stats("Follow-ups sent", &stats),
    }
    Ok(())
}

async fn cmd_run() -> Result<()> {
    let config = load_config()?;
    let settings = Settings::from_env(&config, Stages::pipeline(&config))?;
    if lock_is_held(&settings.pipeline_lock_path, "pipeline run")? {
        return Ok(());
    }
    let storage = open_storage(&settings).await?;
    let mailer = SmtpMailer::new(&settings.smtp);
    let model = gemini_client(&settings)?;

    let places = if settings.scrape.enabled {
        Some(places_client(&settings)?)
    } else {
        None
    };
    let scraper = SiteScraper::new()?;
    let mx = mx_verifier(&settings);

    let mut pipeline = Pipeline::new(&storage, &settings, &mailer).with_model(&model);
    if let Some(places) = &places {
        let mx = mx.as_ref().map(|m| m as &dyn MxVerifier);
        pipeline = pipeline.with_harvester(harvester(places, &scraper, mx, &settings));
    }

    let reporter = CliProgress::new();
    let summary = match pipeline.run(&reporter).await? {
        RunOutcome::AlreadyRunning => {
            warn!("another pipeline run holds the lock; exiting");
            return Ok(());
        }
        RunOutcome::Completed(summary) => summary,
    };

    println!();
    println!("  Pipeline run ({:.1}s)", summary.duration.as_secs_f64());
    for stage in &summary.stages {
        println!(
            "  {:<10} {:>7.1}s  {}",
            stage.name,
            stage.duration.as_secs_f64(),
            stage.status
        );
    }
    println!();

    let failed: Vec<&str> = summary.failed().map(|s| s.name).collect();
    if !failed.is_empty() {
        return Err(eyre!("stage(s) failed: {}", failed.join(", ")));
    }
    Ok(())
}

fn print_send_stats(label: &str, stats: &DispatchStats) {
    println!();
    println!("  {label}: {}", stats.sent);
    println!("  Failed:      {}", stats.failed);
    if !stats.retired_senders.is_empty() {
        println!("  Retired:     {}", stats.retired_senders.join(", "));
    }
    println!("  Time:        {:.1}s", stats.duration.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// Inspection commands
// ---------------------------------------------------------------------------

async fn cmd_status(json: bool) -> Result<()> {
    let (_, settings) = resolve(Stages::default())?;
    let storage = open_storage(&settings).await?;
    let counts = storage.count_by_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!();
    println!("  Store:       {}", settings.db_path.display());
    println!("  New:         {}", counts.new);
    println!("  Generated:   {}", counts.generated);
    println!("  Sent:        {}", counts.sent);
    println!("  Total:       {}", counts.total());
    println!();
    Ok(())
}

async fn cmd_list(status: Option<LeadStatus>, limit: usize, json: bool) -> Result<()> {
    let (_, settings) = resolve(Stages::default())?;
    let storage = open_storage(&settings).await?;
    let leads = storage.list_leads(status, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }
    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }

    println!(
        "{:<10} {:<9} {:<36} {}",
        "STATUS", "FOLLOWUPS", "EMAIL", "COMPANY"
    );
    for lead in &leads {
        println!(
            "{:<10} {:<9} {:<36} {}",
            lead.status,
            lead.followup_count,
            lead.email,
            lead.company_name
        );
        if let Some(err) = &lead.last_error {
            println!("{:<10} last error: {err}", "");
        }
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let path = config_file_path()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", path.display());
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        self.spinner.set_message(format!("[{current}/{total}] {detail}"));
    }

    fn finish(&self, summary: &str) {
        self.spinner.println(format!("  {summary}"));
        self.spinner.set_message("");
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uuid::Uuid;

    #[test]
    fn run_log_goes_to_a_dated_file() {
        let dir = std::env::temp_dir().join(format!("lf_logs_{}", Uuid::now_v7()));
        let mut appender = run_log_appender(&dir).unwrap();
        appender.write_all(b"pipeline started\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        let name = &names[0];
        assert!(name.starts_with("leadflow-run."), "{name}");
        assert!(name.ends_with(".log"), "{name}");
        // leadflow-run.YYYY-MM-DD.log
        assert_eq!(name.len(), "leadflow-run.".len() + 10 + ".log".len());

        let written = std::fs::read_to_string(dir.join(name)).unwrap();
        assert!(written.contains("pipeline started"));
    }

    #[test]
    fn only_run_keeps_a_log_file() {
        assert!(run_log_dir(&Command::Generate).is_none());
        assert!(run_log_dir(&Command::Status { json: false }).is_none());
    }

    #[test]
    fn held_lock_is_detected_before_opening_the_store() {
        let path = std::env::temp_dir().join(format!("lf_cli_{}.lock", Uuid::now_v7()));
        assert!(!lock_is_held(&path, "dispatcher").unwrap());
        let _held = RunLock::try_acquire(&path).unwrap().unwrap();
        assert!(lock_is_held(&path, "dispatcher").unwrap());
    }
}
