//! libSQL storage layer (local file only).
//!
//! The [`Storage`] struct wraps a libSQL database holding the plans Tidymarks
//! has received or imported and the history of plan applications.
//!
//! Plans are kept as the JSON text they arrived as; decoding happens at the
//! engine's trust boundary, not here.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use tidymarks_shared::{Result, TidymarksError};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPlan {
    pub id: String,
    pub organization_type: String,
    /// Hash of the classifier request that produced this plan. `None` for
    /// plans imported from a file.
    pub request_hash: Option<String>,
    pub model_id: Option<String>,
    pub plan_json: String,
    pub created_at: DateTime<Utc>,
}

/// One recorded plan application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub plan_id: Option<String>,
    pub organization_type: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is still in progress (or was interrupted).
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub report_json: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TidymarksError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TidymarksError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
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
                        TidymarksError::Storage(format!(
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TidymarksError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Plan operations
    // -----------------------------------------------------------------------

    /// Store a plan. Returns the generated plan ID.
    pub async fn save_plan(
        &self,
        organization_type: &str,
        request_hash: Option<&str>,
        model_id: Option<&str>,
        plan_json: &str,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO plans (id, organization_type, request_hash, model_id, plan_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    organization_type,
                    request_hash,
                    model_id,
                    plan_json,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Get a plan by ID.
    pub async fn get_plan(&self, id: &str) -> Result<Option<StoredPlan>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, organization_type, request_hash, model_id, plan_json, created_at
                 FROM plans WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_plan(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TidymarksError::Storage(e.to_string())),
        }
    }

    /// Most recent plan produced by an identical classifier request.
    pub async fn find_cached_plan(
        &self,
        request_hash: &str,
        model_id: &str,
    ) -> Result<Option<StoredPlan>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, organization_type, request_hash, model_id, plan_json, created_at
                 FROM plans WHERE request_hash = ?1 AND model_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![request_hash, model_id],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_plan(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TidymarksError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Run operations
    // -----------------------------------------------------------------------

    /// Record the start of a plan application. Returns the generated run ID.
    pub async fn insert_run(&self, plan_id: Option<&str>, organization_type: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, plan_id, organization_type, started_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), plan_id, organization_type, now.as_str()],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a run finished with its outcome and serialized report.
    pub async fn finish_run(&self, run_id: &str, success: bool, report_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, success = ?2, report_json = ?3 WHERE id = ?4",
                params![now.as_str(), i64::from(success), report_json, run_id],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, plan_id, organization_type, started_at, finished_at, success, report_json
                 FROM runs ORDER BY id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| TidymarksError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TidymarksError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`StoredPlan`].
fn row_to_plan(row: &libsql::Row) -> Result<StoredPlan> {
    Ok(StoredPlan {
        id: row
            .get::<String>(0)
            .map_err(|e| TidymarksError::Storage(e.to_string()))?,
        organization_type: row
            .get::<String>(1)
            .map_err(|e| TidymarksError::Storage(e.to_string()))?,
        request_hash: row.get::<String>(2).ok(),
        model_id: row.get::<String>(3).ok(),
        plan_json: row
            .get::<String>(4)
            .map_err(|e| TidymarksError::Storage(e.to_string()))?,
        created_at: {
            let s: String = row
                .get(5)
                .map_err(|e| TidymarksError::Storage(e.to_string()))?;
            parse_timestamp(&s)?
        },
    })
}

/// Convert a database row to a [`RunRecord`].
fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    Ok(RunRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| TidymarksError::Storage(e.to_string()))?,
        plan_id: row.get::<String>(1).ok(),
        organization_type: row
            .get::<String>(2)
            .map_err(|e| TidymarksError::Storage(e.to_string()))?,
        started_at: {
            let s: String = row
                .get(3)
                .map_err(|e| TidymarksError::Storage(e.to_string()))?;
            parse_timestamp(&s)?
        },
        finished_at: row
            .get::<String>(4)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        success: row.get::<i64>(5).ok().map(|v| v != 0),
        report_json: row.get::<String>(6).ok(),
    })
}
