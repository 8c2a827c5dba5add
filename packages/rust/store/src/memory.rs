//! In-memory bookmark tree with Chromium semantics.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tidymarks_shared::{
    BOOKMARK_BAR_ID, BOOKMARK_BAR_TITLE, BookmarkNode, MOBILE_BOOKMARKS_ID, OTHER_BOOKMARKS_ID,
    ROOT_ID, Result, TidymarksError, is_system_id,
};
use tracing::debug;

use crate::BookmarkStore;

/// One stored node. `children` is only meaningful for folders.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub parent_id: Option<String>,
    pub children: Vec<String>,
    /// Host fields this crate does not interpret (guid, timestamps, ...).
    pub extra: Map<String, Value>,
}

impl Entry {
    pub(crate) fn folder(id: &str, parent_id: Option<&str>, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            url: None,
            parent_id: parent_id.map(String::from),
            children: Vec::new(),
            extra: Map::new(),
        }
    }

    fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    fn shallow_node(&self) -> BookmarkNode {
        BookmarkNode {
            id: self.id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            parent_id: self.parent_id.clone(),
            children: None,
        }
    }
}

/// Number of mutating and lookup calls made through [`BookmarkStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub creates: usize,
    pub moves: usize,
    pub child_listings: usize,
}

#[derive(Debug)]
struct Inner {
    nodes: HashMap<String, Entry>,
    next_id: u64,
    counts: OperationCounts,
}

impl Inner {
    fn get(&self, id: &str) -> Result<&Entry> {
        self.nodes
            .get(id)
            .ok_or_else(|| TidymarksError::HostStore(format!("Can't find bookmark for id. ({id})")))
    }

    fn parent_folder(&self, parent_id: &str) -> Result<&Entry> {
        match self.nodes.get(parent_id) {
            Some(parent) if parent.is_folder() => Ok(parent),
            _ => Err(TidymarksError::HostStore(format!(
                "Can't find parent bookmark for id. ({parent_id})"
            ))),
        }
    }

    /// Next free numeric id. Wraps past `u64::MAX` and skips taken ids.
    fn allocate_id(&mut self) -> String {
        let mut id = self.next_id;
        while self.nodes.contains_key(&id.to_string()) {
            id = id.wrapping_add(1);
        }
        self.next_id = id.wrapping_add(1);
        id.to_string()
    }

    fn reserve_id(&mut self, id: &str) {
        if let Ok(n) = id.parse::<u64>() {
            self.next_id = self.next_id.max(n.saturating_add(1));
        }
    }

    /// Whether `candidate` is `ancestor` or lies below it.
    fn is_within(&self, candidate: &str, ancestor: &str) -> bool {
        let mut cursor = Some(candidate.to_string());
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|e| e.parent_id.clone());
        }
        false
    }

    fn insert(&mut self, entry: Entry) -> Result<()> {
        if self.nodes.contains_key(&entry.id) {
            return Err(TidymarksError::validation(format!(
                "duplicate bookmark id {}",
                entry.id
            )));
        }
        if let Some(parent_id) = entry.parent_id.clone() {
            self.parent_folder(&parent_id)?;
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.push(entry.id.clone());
            }
        }
        self.reserve_id(&entry.id);
        self.nodes.insert(entry.id.clone(), entry);
        Ok(())
    }

    fn tree_node(&self, id: &str) -> Option<BookmarkNode> {
        let entry = self.nodes.get(id)?;
        let mut node = entry.shallow_node();
        if entry.is_folder() {
            node.children = Some(
                entry
                    .children
                    .iter()
                    .filter_map(|child| self.tree_node(child))
                    .collect(),
            );
        }
        Some(node)
    }
}

/// An in-memory [`BookmarkStore`].
///
/// Starts with the Chromium system layout: root `"0"` holding the bookmark
/// bar `"1"`, other bookmarks `"2"` and mobile bookmarks `"3"`. New ids are
/// allocated above the highest numeric id seen.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store with only the system folders.
    pub fn new() -> Self {
        let mut inner = Inner {
            nodes: HashMap::new(),
            next_id: 0,
            counts: OperationCounts::default(),
        };
        let layout = [
            Entry::folder(ROOT_ID, None, ""),
            Entry::folder(BOOKMARK_BAR_ID, Some(ROOT_ID), BOOKMARK_BAR_TITLE),
            Entry::folder(OTHER_BOOKMARKS_ID, Some(ROOT_ID), "Other bookmarks"),
            Entry::folder(MOBILE_BOOKMARKS_ID, Some(ROOT_ID), "Mobile bookmarks"),
        ];
        for entry in layout {
            // The fixed layout cannot collide.
            let _ = inner.insert(entry);
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A store holding just a bare root, for importers that bring their own
    /// top-level folders.
    pub(crate) fn with_root(root_title: &str) -> Self {
        let mut inner = Inner {
            nodes: HashMap::new(),
            next_id: 0,
            counts: OperationCounts::default(),
        };
        let _ = inner.insert(Entry::folder(ROOT_ID, None, root_title));
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| TidymarksError::HostStore("bookmark store lock poisoned".into()))
    }

    pub(crate) fn insert_entry(&self, entry: Entry) -> Result<()> {
        self.lock()?.insert(entry)
    }

    /// Read-only access to a node and its children, for exporters.
    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&HashMap<String, Entry>) -> R) -> Result<R> {
        let inner = self.lock()?;
        Ok(f(&inner.nodes))
    }

    /// Seed a bookmark with a fixed id. Not counted as an operation.
    pub fn insert_bookmark(&self, id: &str, parent_id: &str, title: &str, url: &str) -> Result<()> {
        self.insert_entry(Entry {
            id: id.to_string(),
            title: title.to_string(),
            url: Some(url.to_string()),
            parent_id: Some(parent_id.to_string()),
            children: Vec::new(),
            extra: Map::new(),
        })
    }

    /// Seed a folder with a fixed id. Not counted as an operation.
    pub fn insert_folder(&self, id: &str, parent_id: &str, title: &str) -> Result<()> {
        self.insert_entry(Entry::folder(id, Some(parent_id), title))
    }

    /// Parent id of a node, if it exists.
    pub fn parent_of(&self, id: &str) -> Option<String> {
        let inner = self.lock().ok()?;
        inner.nodes.get(id).and_then(|e| e.parent_id.clone())
    }

    /// Ordered child ids of a folder (empty for unknown ids and bookmarks).
    pub fn child_ids(&self, id: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|inner| inner.nodes.get(id).map(|e| e.children.clone()))
            .unwrap_or_default()
    }

    /// Calls made through the [`BookmarkStore`] trait so far.
    pub fn operation_counts(&self) -> OperationCounts {
        self.lock().map(|inner| inner.counts).unwrap_or_default()
    }
}

#[async_trait]
impl BookmarkStore for MemoryStore {
    async fn get_tree(&self) -> Result<Vec<BookmarkNode>> {
        let inner = self.lock()?;
        let root = inner
            .tree_node(ROOT_ID)
            .ok_or_else(|| TidymarksError::HostStore("bookmark tree has no root".into()))?;
        Ok(vec![root])
    }

    async fn get_children(&self, folder_id: &str) -> Result<Vec<BookmarkNode>> {
        let mut inner = self.lock()?;
        inner.counts.child_listings += 1;
        let folder = inner.get(folder_id)?;
        Ok(folder
            .children
            .iter()
            .filter_map(|id| inner.nodes.get(id).map(Entry::shallow_node))
            .collect())
    }

    async fn create_folder(&self, parent_id: &str, title: &str) -> Result<BookmarkNode> {
        let mut inner = self.lock()?;
        inner.counts.creates += 1;
        if parent_id == ROOT_ID {
            return Err(TidymarksError::HostStore(
                "Can't modify the root bookmark folders.".into(),
            ));
        }
        inner.parent_folder(parent_id)?;

        let id = inner.allocate_id();
        let entry = Entry::folder(&id, Some(parent_id), title);
        let node = entry.shallow_node();
        inner.insert(entry)?;
        debug!(%id, parent_id, title, "folder created");
        Ok(node)
    }

    async fn move_node(&self, id: &str, parent_id: &str) -> Result<BookmarkNode> {
        let mut inner = self.lock()?;
        inner.counts.moves += 1;
        let old_parent = inner.get(id)?.parent_id.clone();
        if is_system_id(id) || parent_id == ROOT_ID {
            return Err(TidymarksError::HostStore(
                "Can't modify the root bookmark folders.".into(),
            ));
        }
        inner.parent_folder(parent_id)?;
        if inner.is_within(parent_id, id) {
            return Err(TidymarksError::HostStore(format!(
                "Can't move a folder into itself or its descendant. ({id})"
            )));
        }

        if let Some(old) = old_parent.as_deref().and_then(|p| inner.nodes.get_mut(p)) {
            old.children.retain(|child| child != id);
        }
        if let Some(parent) = inner.nodes.get_mut(parent_id) {
            parent.children.push(id.to_string());
        }
        let entry = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| TidymarksError::HostStore(format!("Can't find bookmark for id. ({id})")))?;
        entry.parent_id = Some(parent_id.to_string());
        Ok(entry.shallow_node())
    }
}
