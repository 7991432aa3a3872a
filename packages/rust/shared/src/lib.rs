//! Shared types, error model, and configuration for Leadflow.
//!
//! This crate is the foundation depended on by all other Leadflow crates.
//! It provides:
//! - [`LeadflowError`]: the unified error type
//! - Domain types ([`Lead`], [`LeadStatus`], [`SenderIdentity`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DB_PATH_ENV, DefaultsConfig, LlmConfig, LlmSettings, OutreachConfig, ScrapeConfig,
    SenderConfig, Settings, SmtpConfig, Stages, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from,
};
pub use error::{LeadflowError, Result};
pub use types::{Lead, LeadCounts, LeadId, LeadStatus, NewLead, SenderIdentity};
