//! Turso Embedded / libSQL lead store.
//!
//! The [`Storage`] struct wraps a libSQL database holding every lead and its
//! pipeline state. Every state-changing update is guarded by a `WHERE` clause
//! on the current status, so callers learn from the returned `bool` whether
//! the transition happened and no update can move a lead backwards.

mod migrations;

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use leadflow_shared::{Lead, LeadCounts, LeadId, LeadStatus, LeadflowError, NewLead, Result};
use libsql::{Connection, Database, params};

/// How long a statement waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest `last_error` message kept, in characters.
pub const MAX_ERROR_LEN: usize = 500;

const LEAD_COLUMNS: &str = "id, company_name, category, email, phone, address, website, \
     description, source, content_html, status, sent, followup_count, next_followup_on, \
     last_error, created_at, updated_at, generated_at, sent_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LeadflowError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.enable_wal().await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Switch to write-ahead logging so readers never block the dispatcher.
    async fn enable_wal(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("PRAGMA journal_mode = WAL", params![])
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;
        let mode = match rows.next().await {
            Ok(Some(row)) => row.get::<String>(0).unwrap_or_default(),
            _ => String::new(),
        };
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(%mode, "database did not switch to WAL journaling");
        }
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadflowError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Lead source
    // -----------------------------------------------------------------------

    /// Insert a new lead with status `new`.
    ///
    /// The email is trimmed and lower-cased. Returns `None` when a lead with
    /// the same email already exists.
    pub async fn insert_lead(&self, lead: &NewLead) -> Result<Option<LeadId>> {
        let email = normalize_email(&lead.email);
        if !email.contains('@') {
            return Err(LeadflowError::validation(format!(
                "'{}' is not an email address",
                lead.email
            )));
        }
        let company_name = lead.company_name.trim();
        if company_name.is_empty() {
            return Err(LeadflowError::validation(format!(
                "lead for {email} has no company name"
            )));
        }

        let id = LeadId::new();
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO leads (id, company_name, category, email, phone, address, website,
                                    description, source, status, sent, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'new', 0, ?10, ?10)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    id.to_string(),
                    company_name,
                    lead.category.as_deref(),
                    email.as_str(),
                    lead.phone.as_deref(),
                    lead.address.as_deref(),
                    lead.website.as_deref(),
                    lead.description.as_deref(),
                    lead.source.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        if inserted == 0 {
            tracing::debug!(%email, "lead already present");
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// Every stored email, for in-memory dedup during a scrape.
    pub async fn existing_emails(&self) -> Result<HashSet<String>> {
        let mut rows = self
            .conn
            .query("SELECT email FROM leads", params![])
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        let mut emails = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?
        {
            emails.insert(
                row.get::<String>(0)
                    .map_err(|e| LeadflowError::Storage(e.to_string()))?,
            );
        }
        Ok(emails)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut leads = self.query_leads(&sql, params![id.to_string()]).await?;
        Ok(leads.pop())
    }

    /// Get a lead by (case-insensitive) email.
    pub async fn get_lead_by_email(&self, email: &str) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?1");
        let mut leads = self
            .query_leads(&sql, params![normalize_email(email)])
            .await?;
        Ok(leads.pop())
    }

    /// Leads waiting for content, oldest first.
    pub async fn list_pending_generation(&self) -> Result<Vec<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE status = 'new' ORDER BY id");
        self.query_leads(&sql, params![]).await
    }

    /// Leads with content that have not been emailed, oldest first.
    pub async fn list_ready_to_send(&self) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE status = 'generated' AND sent = 0 AND content_html IS NOT NULL
             ORDER BY id"
        );
        self.query_leads(&sql, params![]).await
    }

    /// Sent leads whose next follow-up is due on or before `today`.
    pub async fn list_followups_due(&self, today: NaiveDate, max_followups: u32) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE sent = 1 AND followup_count < ?1
               AND next_followup_on IS NOT NULL AND next_followup_on <= ?2
             ORDER BY next_followup_on, id"
        );
        self.query_leads(
            &sql,
            params![i64::from(max_followups), today.to_string()],
        )
        .await
    }

    /// List leads, optionally filtered by status, newest first.
    pub async fn list_leads(&self, status: Option<LeadStatus>, limit: usize) -> Result<Vec<Lead>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE status = ?1 ORDER BY id DESC LIMIT ?2"
                );
                self.query_leads(&sql, params![status.as_str(), limit]).await
            }
            None => {
                let sql = format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY id DESC LIMIT ?1");
                self.query_leads(&sql, params![limit]).await
            }
        }
    }

    /// Number of leads in each status.
    pub async fn count_by_status(&self) -> Result<LeadCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM leads GROUP BY status",
                params![],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        let mut counts = LeadCounts::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?
        {
            let status: String = row
                .get(0)
                .map_err(|e| LeadflowError::Storage(e.to_string()))?;
            let n = row
                .get::<i64>(1)
                .map_err(|e| LeadflowError::Storage(e.to_string()))? as u64;
            match status.parse::<LeadStatus>() {
                Ok(LeadStatus::New) => counts.new = n,
                Ok(LeadStatus::Generated) => counts.generated = n,
                Ok(LeadStatus::Sent) => counts.sent = n,
                Err(e) => tracing::warn!(error = %e, "ignoring unknown status in counts"),
            }
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Store generated content and move the lead New → Generated.
    ///
    /// Returns `false` when the lead was not `new` (nothing written).
    pub async fn save_generated_content(&self, id: &LeadId, html: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE leads
                 SET content_html = ?1, status = 'generated', generated_at = ?2,
                     updated_at = ?2, last_error = NULL
                 WHERE id = ?3 AND status = 'new'",
                params![html, now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Persist the sent flag after a completed transmission and schedule the
    /// first follow-up.
    ///
    /// Only a `generated`, unsent lead transitions; returns `false` otherwise.
    pub async fn mark_sent(&self, id: &LeadId, next_followup_on: NaiveDate) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE leads
                 SET status = 'sent', sent = 1, sent_at = ?1, updated_at = ?1,
                     next_followup_on = ?2, last_error = NULL
                 WHERE id = ?3 AND status = 'generated' AND sent = 0",
                params![now.as_str(), next_followup_on.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Record a delivered follow-up and schedule the next one.
    ///
    /// `delivered` is the follow-up count the caller observed; a lead whose
    /// count moved on in the meantime is left untouched and `false` returned.
    pub async fn record_followup(
        &self,
        id: &LeadId,
        delivered: u32,
        next_followup_on: NaiveDate,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE leads
                 SET followup_count = followup_count + 1, next_followup_on = ?1,
                     updated_at = ?2, last_error = NULL
                 WHERE id = ?3 AND sent = 1 AND followup_count = ?4",
                params![
                    next_followup_on.to_string(),
                    now.as_str(),
                    id.to_string(),
                    i64::from(delivered),
                ],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;
        Ok(changed == 1)
    }

    /// Record the most recent failure for a lead (truncated).
    pub async fn set_lead_error(&self, id: &LeadId, message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE leads SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
                params![truncate_error(message), now.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn query_leads(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Lead>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LeadflowError::Storage(e.to_string()))?
        {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Cut `message` to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadflowError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row (selected with [`LEAD_COLUMNS`]) to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| LeadflowError::Storage(e.to_string()))
    };

    let id = text(0)?
        .parse::<LeadId>()
        .map_err(|e| LeadflowError::Storage(format!("invalid lead id: {e}")))?;
    let next_followup_on = match row.get::<String>(13).ok() {
        Some(s) => Some(
            s.parse::<NaiveDate>()
                .map_err(|e| LeadflowError::Storage(format!("invalid follow-up date: {e}")))?,
        ),
        None => None,
    };

    Ok(Lead {
        id,
        company_name: text(1)?,
        category: row.get::<String>(2).ok(),
        email: text(3)?,
        phone: row.get::<String>(4).ok(),
        address: row.get::<String>(5).ok(),
        website: row.get::<String>(6).ok(),
        description: row.get::<String>(7).ok(),
        source: text(8)?,
        content_html: row.get::<String>(9).ok(),
        status: text(10)?
            .parse()
            .map_err(|e: LeadflowError| LeadflowError::Storage(e.to_string()))?,
        sent: row
            .get::<i64>(11)
            .map_err(|e| LeadflowError::Storage(e.to_string()))?
            != 0,
        followup_count: row.get::<i64>(12).unwrap_or(0) as u32,
        next_followup_on,
        last_error: row.get::<String>(14).ok(),
        created_at: parse_timestamp(&text(15)?)?,
        updated_at: parse_timestamp(&text(16)?)?,
        generated_at: row
            .get::<String>(17)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        sent_at: row
            .get::<String>(18)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}
