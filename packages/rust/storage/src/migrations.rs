//! SQL migration definitions for the Tidymarks database.
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
    vec![Migration {
        version: 1,
        description: "Initial schema: plans, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Plans received from the classifier or imported from a file
CREATE TABLE IF NOT EXISTS plans (
    id                TEXT PRIMARY KEY,
    organization_type TEXT NOT NULL,
    request_hash      TEXT,
    model_id          TEXT,
    plan_json         TEXT NOT NULL,
    created_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_plans_request ON plans(request_hash, model_id);

-- One row per plan application
CREATE TABLE IF NOT EXISTS runs (
    id                TEXT PRIMARY KEY,
    plan_id           TEXT REFERENCES plans(id) ON DELETE SET NULL,
    organization_type TEXT NOT NULL,
    started_at        TEXT NOT NULL,
    finished_at       TEXT,
    success           INTEGER,
    report_json       TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
