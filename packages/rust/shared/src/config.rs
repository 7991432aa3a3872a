//! Application configuration for Leadflow.
//!
//! User config lives at `~/.leadflow/leadflow.toml`. The file never holds
//! secrets: it names the environment variables that do. [`Settings::resolve`]
//! merges the file with the environment once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::types::SenderIdentity;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadflow";

/// Environment variable that overrides `defaults.db_path`.
pub const DB_PATH_ENV: &str = "LEADFLOW_DB_PATH";

// ---------------------------------------------------------------------------
// Config structs (matching leadflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub outreach: OutreachConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Sender rotation, in rotation order.
    #[serde(default = "default_senders")]
    pub senders: Vec<SenderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            llm: LlmConfig::default(),
            smtp: SmtpConfig::default(),
            outreach: OutreachConfig::default(),
            scrape: ScrapeConfig::default(),
            senders: default_senders(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Lead database location. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Advisory lock held by the dispatcher and follow-up runs.
    #[serde(default = "default_dispatch_lock_path")]
    pub dispatch_lock_path: String,

    /// Advisory lock held by the `run` orchestrator.
    #[serde(default = "default_pipeline_lock_path")]
    pub pipeline_lock_path: String,

    /// Pause between two outbound emails.
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,

    /// Directory for the dated `leadflow run` log files. `~` is expanded.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            dispatch_lock_path: default_dispatch_lock_path(),
            pipeline_lock_path: default_pipeline_lock_path(),
            send_delay_ms: default_send_delay(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leadflow/leads.db".into()
}
fn default_dispatch_lock_path() -> String {
    "/tmp/leadflow_dispatch.lock".into()
}
fn default_pipeline_lock_path() -> String {
    "/tmp/leadflow_pipeline.lock".into()
}
fn default_send_delay() -> u64 {
    2000
}
fn default_log_dir() -> String {
    "~/.leadflow/logs".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Model used for content generation.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL (without the `/models/...` suffix).
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Pause between two generation requests.
    #[serde(default = "default_llm_delay")]
    pub request_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            timeout_secs: default_llm_timeout(),
            request_delay_ms: default_llm_delay(),
        }
    }
}

fn default_llm_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_llm_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_llm_timeout() -> u64 {
    90
}
fn default_llm_delay() -> u64 {
    3000
}

/// `[smtp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Implicit-TLS submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Monitored inbox that replies go to (instead of the rotating sender).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Tracking inbox copied on every message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,

    /// Mailbox advertised in the `List-Unsubscribe` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe_mailbox: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            reply_to: None,
            bcc: None,
            unsubscribe_mailbox: None,
        }
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    465
}

/// `[outreach]` section: branding and follow-up cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    #[serde(default = "default_website")]
    pub website: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,

    /// Booking link used in calls to action.
    #[serde(default = "default_calendar_link")]
    pub calendar_link: String,

    /// Price after the free pilot month, as quoted in emails.
    #[serde(default = "default_monthly_price")]
    pub monthly_price: String,

    /// Subject of the initial email; `{company_name}` is substituted.
    #[serde(default = "default_initial_subject")]
    pub initial_subject: String,

    #[serde(default = "default_followup_interval")]
    pub followup_interval_days: u32,

    #[serde(default = "default_max_followups")]
    pub max_followups: u32,

    /// Leads rendered per preview run.
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            brand_name: default_brand_name(),
            website: default_website(),
            logo_url: None,
            calendar_link: default_calendar_link(),
            monthly_price: default_monthly_price(),
            initial_subject: default_initial_subject(),
            followup_interval_days: default_followup_interval(),
            max_followups: default_max_followups(),
            preview_limit: default_preview_limit(),
        }
    }
}

fn default_brand_name() -> String {
    "Leadflow Analytics".into()
}
fn default_website() -> String {
    "https://www.example.com".into()
}
fn default_calendar_link() -> String {
    "https://calendar.example.com/book".into()
}
fn default_monthly_price() -> String {
    "$499/month".into()
}
fn default_initial_subject() -> String {
    "Unlocking hidden profits at {company_name} (Custom Analytics)".into()
}
fn default_followup_interval() -> u32 {
    7
}
fn default_max_followups() -> u32 {
    3
}
fn default_preview_limit() -> usize {
    3
}

/// `[scrape]` section: Places search and site scraping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Whether `leadflow run` includes the scrape stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_places_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_places_endpoint")]
    pub endpoint: String,

    /// Appended to every query, e.g. `"restaurants in Toronto, Ontario"`.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_cities")]
    pub cities: Vec<String>,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Stop once this many new leads were stored.
    #[serde(default = "default_target_leads")]
    pub target_leads: usize,

    /// Hard wall-clock limit for one scrape run.
    #[serde(default = "default_max_run_secs")]
    pub max_run_secs: u64,

    /// Result pages fetched per query.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Wait before using a `nextPageToken`.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Wait between two queries.
    #[serde(default = "default_query_delay")]
    pub query_delay_ms: u64,

    /// Drop scraped addresses whose domain has no MX record.
    #[serde(default = "default_true")]
    pub verify_mx: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_places_key_env(),
            endpoint: default_places_endpoint(),
            region: default_region(),
            cities: default_cities(),
            categories: default_categories(),
            target_leads: default_target_leads(),
            max_run_secs: default_max_run_secs(),
            max_pages: default_max_pages(),
            page_delay_ms: default_page_delay(),
            query_delay_ms: default_query_delay(),
            verify_mx: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_places_key_env() -> String {
    "GOOGLE_PLACES_API_KEY".into()
}
fn default_places_endpoint() -> String {
    "https://places.googleapis.com/v1/places:searchText".into()
}
fn default_region() -> String {
    "Ontario".into()
}
fn default_cities() -> Vec<String> {
    ["Toronto", "Mississauga", "Brampton", "Vaughan", "Markham", "Oakville"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_categories() -> Vec<String> {
    [
        "restaurants",
        "cafes",
        "gyms",
        "dental clinics",
        "physiotherapy clinics",
        "auto repair shops",
        "plumbers",
        "bakeries",
        "hair salons",
        "accounting firms",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_target_leads() -> usize {
    100
}
fn default_max_run_secs() -> u64 {
    3600
}
fn default_max_pages() -> u32 {
    2
}
fn default_page_delay() -> u64 {
    2000
}
fn default_query_delay() -> u64 {
    1000
}

/// `[[senders]]` entry. Address and password are read from the named env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub address_env: String,
    pub password_env: String,
    pub display_name: String,
}

fn default_senders() -> Vec<SenderConfig> {
    ["Paul", "Ed", "Will"]
        .into_iter()
        .enumerate()
        .map(|(i, name)| SenderConfig {
            address_env: format!("SENDER_{}_ADDRESS", i + 1),
            password_env: format!("SENDER_{}_PASSWORD", i + 1),
            display_name: name.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime settings (config + environment, resolved once)
// ---------------------------------------------------------------------------

/// Which stages the current invocation will run; drives credential checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stages {
    pub scrape: bool,
    pub generate: bool,
    pub send: bool,
}

impl Stages {
    /// Every stage `leadflow run` executes for this config.
    pub fn pipeline(config: &AppConfig) -> Self {
        Self {
            scrape: config.scrape.enabled,
            generate: true,
            send: true,
        }
    }
}

/// Resolved LLM access.
#[derive(Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub request_delay: Duration,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Explicit runtime configuration, built once and passed to each component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub dispatch_lock_path: PathBuf,
    pub pipeline_lock_path: PathBuf,
    pub send_delay: Duration,
    pub smtp: SmtpConfig,
    pub outreach: OutreachConfig,
    pub scrape: ScrapeConfig,
    /// Present when the generate stage was requested.
    pub llm: Option<LlmSettings>,
    /// Present when the scrape stage was requested.
    pub places_api_key: Option<String>,
    /// Usable senders in rotation order; non-empty when sending was requested.
    pub senders: Vec<SenderIdentity>,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env(config: &AppConfig, stages: Stages) -> Result<Self> {
        Self::resolve(config, stages, |name| std::env::var(name).ok())
    }

    /// Resolve settings using `lookup` for environment values.
    ///
    /// Missing credentials for a requested stage are a [`LeadflowError::Config`].
    pub fn resolve<F>(config: &AppConfig, stages: Stages, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = match non_empty(DB_PATH_ENV) {
            Some(path) => expand_home(&path),
            None => expand_home(&config.defaults.db_path),
        };

        let llm = if stages.generate {
            let api_key = non_empty(&config.llm.api_key_env).ok_or_else(|| {
                LeadflowError::config(format!(
                    "LLM API key not found. Set the {} environment variable.",
                    config.llm.api_key_env
                ))
            })?;
            Some(LlmSettings {
                api_key,
                model: config.llm.model.clone(),
                endpoint: config.llm.endpoint.clone(),
                timeout: Duration::from_secs(config.llm.timeout_secs),
                request_delay: Duration::from_millis(config.llm.request_delay_ms),
            })
        } else {
            None
        };

        let places_api_key = if stages.scrape {
            Some(non_empty(&config.scrape.api_key_env).ok_or_else(|| {
                LeadflowError::config(format!(
                    "Places API key not found. Set the {} environment variable.",
                    config.scrape.api_key_env
                ))
            })?)
        } else {
            None
        };

        let senders = if stages.send {
            resolve_senders(&config.senders, &non_empty)?
        } else {
            Vec::new()
        };

        Ok(Self {
            db_path,
            dispatch_lock_path: expand_home(&config.defaults.dispatch_lock_path),
            pipeline_lock_path: expand_home(&config.defaults.pipeline_lock_path),
            send_delay: Duration::from_millis(config.defaults.send_delay_ms),
            smtp: config.smtp.clone(),
            outreach: config.outreach.clone(),
            scrape: config.scrape.clone(),
            llm,
            places_api_key,
            senders,
        })
    }
}

/// Keep every sender whose address and password are both set.
///
/// Partially configured senders are skipped with a warning; zero usable
/// senders is a configuration error.
fn resolve_senders<F>(configs: &[SenderConfig], lookup: &F) -> Result<Vec<SenderIdentity>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut senders = Vec::with_capacity(configs.len());
    for cfg in configs {
        match (lookup(&cfg.address_env), lookup(&cfg.password_env)) {
            (Some(address), Some(password)) => senders.push(SenderIdentity {
                address: address.trim().to_string(),
                password,
                display_name: cfg.display_name.clone(),
            }),
            _ => tracing::warn!(
                address_env = %cfg.address_env,
                "sender credentials incomplete, leaving it out of the rotation"
            ),
        }
    }

    if senders.is_empty() {
        let names: Vec<&str> = configs.iter().map(|c| c.address_env.as_str()).collect();
        return Err(LeadflowError::config(format!(
            "no usable sender accounts. Set the address/password variables for at least one of: {}",
            names.join(", ")
        )));
    }
    Ok(senders)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LeadflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadflow/leadflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadflowError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadflowError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("GEMINI_API_KEY", "gm-key"),
            ("GOOGLE_PLACES_API_KEY", "places-key"),
            ("SENDER_1_ADDRESS", "paul@example.com"),
            ("SENDER_1_PASSWORD", "pw1"),
            ("SENDER_2_ADDRESS", "ed@example.com"),
            ("SENDER_2_PASSWORD", "pw2"),
            ("SENDER_3_ADDRESS", "will@example.com"),
            ("SENDER_3_PASSWORD", "pw3"),
        ])
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("SENDER_3_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.senders.len(), 3);
        assert_eq!(parsed.outreach.max_followups, 3);
        assert_eq!(parsed.smtp.port, 465);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[defaults]
db_path = "/var/lib/leadflow/leads.db"

[[senders]]
address_env = "OPS_ADDRESS"
password_env = "OPS_PASSWORD"
display_name = "Ops"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.db_path, "/var/lib/leadflow/leads.db");
        assert_eq!(config.defaults.log_dir, "~/.leadflow/logs");
        assert_eq!(config.defaults.send_delay_ms, 2000);
        assert_eq!(config.senders.len(), 1);
        assert_eq!(config.senders[0].display_name, "Ops");
    }

    #[test]
    fn resolve_all_stages() {
        let vars = full_env();
        let config = AppConfig::default();
        let stages = Stages {
            scrape: true,
            generate: true,
            send: true,
        };
        let settings = Settings::resolve(&config, stages, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.senders.len(), 3);
        assert_eq!(settings.senders[1].display_name, "Ed");
        assert_eq!(settings.llm.as_ref().unwrap().api_key, "gm-key");
        assert_eq!(settings.places_api_key.as_deref(), Some("places-key"));
    }

    #[test]
    fn db_path_env_overrides_config() {
        let mut vars = full_env();
        vars.insert(DB_PATH_ENV.into(), "/tmp/override.db".into());
        let settings =
            Settings::resolve(&AppConfig::default(), Stages::default(), |k| vars.get(k).cloned())
                .unwrap();
        assert_eq!(settings.db_path, PathBuf::from("/tmp/override.db"));
    }

    #[test]
    fn missing_llm_key_is_config_error() {
        let vars = env(&[]);
        let stages = Stages {
            generate: true,
            ..Default::default()
        };
        let err = Settings::resolve(&AppConfig::default(), stages, |k| vars.get(k).cloned())
            .unwrap_err();
        assert!(matches!(err, LeadflowError::Config { .. }));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn incomplete_senders_are_skipped() {
        let vars = env(&[
            ("SENDER_1_ADDRESS", "paul@example.com"),
            ("SENDER_1_PASSWORD", "pw1"),
            ("SENDER_2_ADDRESS", "ed@example.com"),
            ("SENDER_3_PASSWORD", "pw3"),
        ]);
        let stages = Stages {
            send: true,
            ..Default::default()
        };
        let settings =
            Settings::resolve(&AppConfig::default(), stages, |k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.senders.len(), 1);
        assert_eq!(settings.senders[0].address, "paul@example.com");
    }

    #[test]
    fn no_senders_is_config_error() {
        let vars = env(&[("SENDER_1_ADDRESS", "paul@example.com")]);
        let stages = Stages {
            send: true,
            ..Default::default()
        };
        let err = Settings::resolve(&AppConfig::default(), stages, |k| vars.get(k).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("no usable sender accounts"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let vars = env(&[("GEMINI_API_KEY", "   ")]);
        let stages = Stages {
            generate: true,
            ..Default::default()
        };
        assert!(Settings::resolve(&AppConfig::default(), stages, |k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn llm_settings_debug_hides_key() {
        let vars = full_env();
        let stages = Stages {
            generate: true,
            ..Default::default()
        };
        let settings =
            Settings::resolve(&AppConfig::default(), stages, |k| vars.get(k).cloned()).unwrap();
        let dbg = format!("{:?}", settings.llm.unwrap());
        assert!(!dbg.contains("gm-key"));
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.lock"), PathBuf::from("/tmp/x.lock"));
    }
}
