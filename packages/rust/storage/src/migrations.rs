//! SQL migration definitions for the Leadflow lead store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS leads (
    id            TEXT PRIMARY KEY,
    company_name  TEXT NOT NULL,
    category      TEXT,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT,
    address       TEXT,
    website       TEXT,
    description   TEXT,
    source        TEXT NOT NULL,
    content_html  TEXT,
    status        TEXT NOT NULL DEFAULT 'new'
                  CHECK (status IN ('new', 'generated', 'sent')),
    sent          INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    generated_at  TEXT,
    sent_at       TEXT
);

CREATE INDEX IF NOT EXISTS idx_leads_status_sent ON leads(status, sent);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Follow-up tracking and last error",
            sql: r#"
ALTER TABLE leads ADD COLUMN followup_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE leads ADD COLUMN next_followup_on TEXT;
ALTER TABLE leads ADD COLUMN last_error TEXT;

CREATE INDEX IF NOT EXISTS idx_leads_followup ON leads(sent, next_followup_on);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
