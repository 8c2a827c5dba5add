//! Run outcome types: isolated issues, the run report, and the response
//! shapes handed back to the caller.

use std::fmt;

use serde::Serialize;
use tidymarks_shared::{Plan, TidymarksError};

use crate::preview::Preview;

// ---------------------------------------------------------------------------
// RunIssue
// ---------------------------------------------------------------------------

/// A non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunIssue {
    /// The plan references an id that is not a known bookmark.
    DanglingReference { id: String },
    /// A known bookmark the plan never references.
    UnplacedBookmark { id: String },
    /// A bookmark referenced more than once; only the first placement counts.
    DuplicateReference { id: String, occurrences: usize },
    /// Looking up or creating a folder failed; its subtree was skipped.
    FolderOperation {
        parent_id: String,
        name: String,
        message: String,
    },
    /// A plan folder that never got an id, so its bookmarks were not moved.
    UnresolvedFolder {
        parent_id: String,
        name: String,
        skipped: usize,
    },
    /// Moving one bookmark failed.
    MoveOperation {
        id: String,
        parent_id: String,
        message: String,
    },
}

impl RunIssue {
    /// Whether this issue came from plan validation rather than a host call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DanglingReference { .. }
                | Self::UnplacedBookmark { .. }
                | Self::DuplicateReference { .. }
        )
    }
}

impl fmt::Display for RunIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingReference { id } => {
                write!(f, "plan references unknown bookmark {id}")
            }
            Self::UnplacedBookmark { id } => {
                write!(f, "bookmark {id} is not placed by the plan")
            }
            Self::DuplicateReference { id, occurrences } => {
                write!(f, "bookmark {id} is referenced {occurrences} times")
            }
            Self::FolderOperation {
                parent_id,
                name,
                message,
            } => write!(f, "folder \"{name}\" under {parent_id}: {message}"),
            Self::UnresolvedFolder {
                parent_id,
                name,
                skipped,
            } => write!(
                f,
                "folder \"{name}\" under {parent_id} was not materialized; {skipped} bookmark(s) left in place"
            ),
            Self::MoveOperation {
                id,
                parent_id,
                message,
            } => write!(f, "moving bookmark {id} to {parent_id}: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Counts and issues accumulated over one plan application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub folders_created: usize,
    pub folders_reused: usize,
    pub bookmarks_moved: usize,
    pub issues: Vec<RunIssue>,
}

impl RunReport {
    /// One-line summary used as the success message.
    pub fn summary(&self) -> String {
        let mut message = format!(
            "Bookmarks organized: {} folder(s) created, {} reused, {} bookmark(s) moved",
            self.folders_created, self.folders_reused, self.bookmarks_moved
        );
        if !self.issues.is_empty() {
            message.push_str(&format!(
                " ({} issue(s), see logs for details)",
                self.issues.len()
            ));
        }
        message
    }

    /// Issues raised by host operations (folder, unresolved, move).
    pub fn operation_issues(&self) -> impl Iterator<Item = &RunIssue> {
        self.issues.iter().filter(|i| !i.is_validation())
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Verdict for an organize request: `{success: true, message}` or
/// `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrganizeResponse {
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            success: true,
            message: Some(report.summary()),
            error: None,
        }
    }

    pub fn from_error(error: &TidymarksError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.to_string()),
        }
    }
}

/// Preview verdict: the denormalized preview plus the raw plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_structure: Option<Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewResponse {
    pub fn ok(preview: Preview, plan: Plan) -> Self {
        Self {
            success: true,
            preview: Some(preview),
            organization_structure: Some(plan),
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            preview: None,
            organization_structure: None,
            error: Some(error.to_string()),
        }
    }
}
