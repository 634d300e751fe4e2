//! SQL migration definitions for the archive ledger.
//!
//! Migrations are applied in order on open. Each one records its version in
//! `schema_migrations` so reopening an existing ledger is a no-op.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: archives, media_hashes",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per canonical URL
CREATE TABLE IF NOT EXISTS archives (
    url         TEXT PRIMARY KEY,
    status      TEXT NOT NULL,
    started_at  TEXT,
    finished_at TEXT,
    result_json TEXT
);

CREATE INDEX IF NOT EXISTS idx_archives_status ON archives(status);

-- Forensic registry: which URL produced which content, and where it lives
CREATE TABLE IF NOT EXISTS media_hashes (
    content_hash      TEXT NOT NULL,
    url               TEXT NOT NULL,
    storage_locations TEXT NOT NULL,
    recorded_at       TEXT NOT NULL,
    PRIMARY KEY (content_hash, url)
);

CREATE INDEX IF NOT EXISTS idx_media_hashes_url ON media_hashes(url);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
