//! Plan validator: cross-checks plan references against the known bookmarks.

use std::collections::{HashMap, HashSet};

use tidymarks_shared::{BookmarkRef, FlatBookmark, Plan};

use crate::report::RunIssue;

/// Reference defects found in a plan. Every list keeps first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Referenced ids that are not known bookmarks.
    pub dangling: Vec<String>,
    /// Known bookmarks never referenced.
    pub unplaced: Vec<String>,
    /// Known bookmarks referenced more than once, with their reference count.
    pub duplicates: Vec<(String, usize)>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.unplaced.is_empty() && self.duplicates.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.dangling.len() + self.unplaced.len() + self.duplicates.len()
    }

    /// The findings as run issues.
    pub fn issues(&self) -> Vec<RunIssue> {
        let dangling = self
            .dangling
            .iter()
            .map(|id| RunIssue::DanglingReference { id: id.clone() });
        let unplaced = self
            .unplaced
            .iter()
            .map(|id| RunIssue::UnplacedBookmark { id: id.clone() });
        let duplicates = self
            .duplicates
            .iter()
            .map(|(id, n)| RunIssue::DuplicateReference {
                id: id.clone(),
                occurrences: *n,
            });
        dangling.chain(unplaced).chain(duplicates).collect()
    }

    /// Short description for logs and strict-mode errors.
    pub fn describe(&self) -> String {
        format!(
            "{} dangling, {} unplaced, {} duplicate reference(s)",
            self.dangling.len(),
            self.unplaced.len(),
            self.duplicates.len()
        )
    }
}

/// Compare every reference in `plan` with the flattened bookmark set.
pub fn validate_plan(plan: &Plan, bookmarks: &[FlatBookmark]) -> ValidationReport {
    let known: HashSet<&str> = bookmarks.iter().map(|b| b.id.as_str()).collect();

    let mut report = ValidationReport::default();
    let mut seen_dangling = HashSet::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for reference in plan.referenced_ids() {
        let id = reference.as_str();
        if !known.contains(id) {
            if seen_dangling.insert(id) {
                report.dangling.push(id.to_string());
            }
            continue;
        }
        let count = counts.entry(id).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(id);
        }
    }

    report.duplicates = order
        .into_iter()
        .map(|id| (id.to_string(), counts[id]))
        .collect();

    report.unplaced = bookmarks
        .iter()
        .filter(|b| !counts.contains_key(b.id.as_str()))
        .map(|b| b.id.clone())
        .collect();

    report
}

/// Append `ids` to the plan's bookmark bar, as bare references.
pub fn append_to_bar(plan: &mut Plan, ids: &[String]) {
    plan.bookmarks
        .bookmark_bar
        .children
        .extend(ids.iter().map(|id| BookmarkRef::new(id.as_str())));
}
