//! Core domain types for Leadflow leads and sender identities.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LeadflowError;

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LeadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a lead. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Stored by the lead source, no content yet.
    New,
    /// Marketing content generated, not yet emailed.
    Generated,
    /// Initial email delivered.
    Sent,
}

impl LeadStatus {
    /// Column value stored in the `leads.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Generated => "generated",
            Self::Sent => "sent",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = LeadflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "generated" => Ok(Self::Generated),
            "sent" => Ok(Self::Sent),
            other => Err(LeadflowError::parse(format!("unknown lead status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A persisted contact lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    /// Business name.
    pub company_name: String,
    /// Category / search keyword (e.g. "Dental").
    pub category: Option<String>,
    /// Contact email, lower-cased. Unique across the store.
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    /// Short "about" text scraped from the website, used for personalization.
    pub description: Option<String>,
    /// Where the lead came from (`places`, `import`).
    pub source: String,
    /// Generated HTML payload. `None` until the generator has run.
    pub content_html: Option<String>,
    pub status: LeadStatus,
    /// Persisted sent flag; true only after a completed transmission.
    pub sent: bool,
    /// Number of follow-ups already delivered.
    pub followup_count: u32,
    /// Due date of the next follow-up.
    pub next_followup_on: Option<NaiveDate>,
    /// Most recent failure, for debugging.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub generated_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Input for inserting a new lead.
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub company_name: String,
    pub category: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub source: String,
}

impl NewLead {
    /// Minimal lead with only the required fields.
    pub fn new(company_name: impl Into<String>, email: impl Into<String>, source: &str) -> Self {
        Self {
            company_name: company_name.into(),
            email: email.into(),
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Per-status lead counts, as reported by `leadflow status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeadCounts {
    pub new: u64,
    pub generated: u64,
    pub sent: u64,
}

impl LeadCounts {
    pub fn total(&self) -> u64 {
        self.new + self.generated + self.sent
    }
}

// ---------------------------------------------------------------------------
// SenderIdentity
// ---------------------------------------------------------------------------

/// An outbound mail account used by the sender rotation.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    /// Mailbox address, also the SMTP login.
    pub address: String,
    /// Application-specific SMTP password.
    pub password: String,
    /// Human name shown in the `From` header.
    pub display_name: String,
}

// Keeps passwords out of logs.
impl std::fmt::Debug for SenderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderIdentity")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}
