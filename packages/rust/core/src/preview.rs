//! Denormalized preview of what applying a plan would do.
//!
//! Built purely from a [`TreeSnapshot`]; nothing is read from or written to
//! the store.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tidymarks_shared::{BookmarkNode, FlatBookmark, FolderNode, Plan, PlanChild};

use crate::flatten::TreeSnapshot;
use crate::validate::validate_plan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBookmark {
    pub id: String,
    pub title: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFolder {
    pub name: String,
    /// An existing folder with this exact title would be reused.
    pub reused: bool,
    pub bookmarks: Vec<PreviewBookmark>,
    pub folders: Vec<PreviewFolder>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub bookmark_bar: Vec<PreviewBookmark>,
    pub folders: Vec<PreviewFolder>,
    /// Referenced ids that match no bookmark.
    pub dangling: Vec<String>,
    /// Bookmarks the plan leaves where they are.
    pub unplaced: Vec<PreviewBookmark>,
    pub folders_to_create: usize,
    pub folders_to_reuse: usize,
}

/// Folders keyed by `(parent id, title)`, first sibling wins. Starts from the
/// tree as read and grows with the folders a run would create.
struct FolderIndex {
    by_parent_and_title: HashMap<(String, String), String>,
    planned: usize,
}

impl FolderIndex {
    fn build(roots: &[BookmarkNode]) -> Self {
        let mut by_parent_and_title = HashMap::new();
        let mut stack: Vec<&BookmarkNode> = roots.iter().collect();
        while let Some(node) = stack.pop() {
            for child in node.child_nodes().iter().filter(|c| c.is_folder()) {
                by_parent_and_title
                    .entry((node.id.clone(), child.title.clone()))
                    .or_insert_with(|| child.id.clone());
                stack.push(child);
            }
        }
        Self {
            by_parent_and_title,
            planned: 0,
        }
    }

    fn find(&self, parent_id: &str, title: &str) -> Option<&str> {
        self.by_parent_and_title
            .get(&(parent_id.to_string(), title.to_string()))
            .map(String::as_str)
    }

    /// Record a folder the run would create, so later siblings with the same
    /// title resolve to it.
    fn insert_planned(&mut self, parent_id: &str, title: &str) -> String {
        let id = format!("planned:{}", self.planned);
        self.planned += 1;
        self.by_parent_and_title
            .insert((parent_id.to_string(), title.to_string()), id.clone());
        id
    }
}

struct Builder<'a> {
    index: FolderIndex,
    bookmarks: HashMap<&'a str, &'a FlatBookmark>,
    seen: HashSet<&'a str>,
    preview: Preview,
}

impl<'a> Builder<'a> {
    fn bookmark(&mut self, id: &'a str) -> Option<PreviewBookmark> {
        let flat: &'a FlatBookmark = *self.bookmarks.get(id)?;
        if !self.seen.insert(id) {
            return None;
        }
        Some(render(flat))
    }

    /// Mirrors the materializer: reuse a folder already under `parent_id`,
    /// including one an earlier plan sibling would create.
    fn folder(&mut self, node: &'a FolderNode, parent_id: &str) -> PreviewFolder {
        let existing = self.index.find(parent_id, &node.name).map(String::from);
        let reused = existing.is_some();
        let folder_id = match existing {
            Some(id) => {
                self.preview.folders_to_reuse += 1;
                id
            }
            None => {
                self.preview.folders_to_create += 1;
                self.index.insert_planned(parent_id, &node.name)
            }
        };

        let mut folder = PreviewFolder {
            name: node.name.clone(),
            reused,
            bookmarks: Vec::new(),
            folders: Vec::new(),
        };
        for child in &node.children {
            match child {
                PlanChild::Bookmark(r) => {
                    if let Some(b) = self.bookmark(r.as_str()) {
                        folder.bookmarks.push(b);
                    }
                }
                PlanChild::Folder(sub) => {
                    let rendered = self.folder(sub, &folder_id);
                    folder.folders.push(rendered);
                }
            }
        }
        folder
    }
}

fn render(flat: &FlatBookmark) -> PreviewBookmark {
    PreviewBookmark {
        id: flat.id.clone(),
        title: flat.title.clone(),
        domain: flat.domain.clone(),
    }
}

/// Render `plan` against `snapshot`, resolving ids to titles and domains.
pub fn build_preview(snapshot: &TreeSnapshot, plan: &Plan) -> Preview {
    let validation = validate_plan(plan, &snapshot.bookmarks);

    let mut builder = Builder {
        index: FolderIndex::build(&snapshot.roots),
        bookmarks: snapshot
            .bookmarks
            .iter()
            .map(|b| (b.id.as_str(), b))
            .collect(),
        seen: HashSet::new(),
        preview: Preview::default(),
    };

    for r in &plan.bookmarks.bookmark_bar.children {
        if let Some(b) = builder.bookmark(r.as_str()) {
            builder.preview.bookmark_bar.push(b);
        }
    }
    for root in &plan.bookmarks.folders {
        let rendered = builder.folder(root, &snapshot.bookmark_bar_id);
        builder.preview.folders.push(rendered);
    }

    let mut preview = builder.preview;
    preview.dangling = validation.dangling;
    preview.unplaced = snapshot
        .bookmarks
        .iter()
        .filter(|b| validation.unplaced.contains(&b.id))
        .map(render)
        .collect();
    preview
}
