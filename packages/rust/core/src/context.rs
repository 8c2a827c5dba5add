//! Per-run state threaded through the materializer and placer.

use std::collections::{HashMap, HashSet};

use tidymarks_store::BookmarkStore;

use crate::pipeline::OrganizeProgress;
use crate::report::{RunIssue, RunReport};

/// Maps `(parent folder id, folder name)` to the folder id it resolved to.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTable {
    entries: HashMap<(String, String), String>,
}

impl ResolutionTable {
    pub fn insert(&mut self, parent_id: &str, name: &str, folder_id: &str) {
        self.entries.insert(
            (parent_id.to_string(), name.to_string()),
            folder_id.to_string(),
        );
    }

    pub fn get(&self, parent_id: &str, name: &str) -> Option<&str> {
        self.entries
            .get(&(parent_id.to_string(), name.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one plan application reads and accumulates.
pub(crate) struct RunContext<'a> {
    pub store: &'a dyn BookmarkStore,
    pub progress: &'a dyn OrganizeProgress,
    pub bookmark_bar_id: String,
    /// Ids the placer may move.
    pub known: HashSet<String>,
    /// Ids already moved this run.
    pub placed: HashSet<String>,
    pub table: ResolutionTable,
    pub report: RunReport,
}

impl<'a> RunContext<'a> {
    pub fn new(
        store: &'a dyn BookmarkStore,
        progress: &'a dyn OrganizeProgress,
        bookmark_bar_id: &str,
        known: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            store,
            progress,
            bookmark_bar_id: bookmark_bar_id.to_string(),
            known: known.into_iter().collect(),
            placed: HashSet::new(),
            table: ResolutionTable::default(),
            report: RunReport::default(),
        }
    }

    pub fn record(&mut self, issue: RunIssue) {
        tracing::warn!(%issue, "run issue");
        self.report.issues.push(issue);
    }
}
