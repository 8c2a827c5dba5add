//! Core domain types: host bookmark nodes and the flat views derived from them.

use serde::{Deserialize, Serialize};

/// Id of the invisible root node in Chromium numbering.
pub const ROOT_ID: &str = "0";
/// Id of the bookmark bar.
pub const BOOKMARK_BAR_ID: &str = "1";
/// Id of the "Other bookmarks" folder.
pub const OTHER_BOOKMARKS_ID: &str = "2";
/// Id of the "Mobile bookmarks" folder.
pub const MOBILE_BOOKMARKS_ID: &str = "3";

/// The four fixed system node ids, never offered as reuse candidates.
pub const SYSTEM_NODE_IDS: [&str; 4] = [
    ROOT_ID,
    BOOKMARK_BAR_ID,
    OTHER_BOOKMARKS_ID,
    MOBILE_BOOKMARKS_ID,
];

/// Title the host gives the bookmark bar.
pub const BOOKMARK_BAR_TITLE: &str = "Bookmarks bar";

/// Domain recorded for bookmarks whose URL has no parseable host.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Whether `id` is one of the fixed system nodes.
pub fn is_system_id(id: &str) -> bool {
    SYSTEM_NODE_IDS.contains(&id)
}

// ---------------------------------------------------------------------------
// BookmarkNode
// ---------------------------------------------------------------------------

/// A node of the host bookmark tree, as returned by `getTree` / `getChildren`.
///
/// A node with a `url` is a bookmark; a node without one is a folder.
/// `children` is only populated by whole-tree reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    /// Opaque, stable node id.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Target URL; absent for folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Parent folder id; absent for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ordered children (folders only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    /// Whether this node is a folder (has no URL).
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }

    /// Children of this node, empty for bookmarks and shallow reads.
    pub fn child_nodes(&self) -> &[BookmarkNode] {
        self.children.as_deref().unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Flat views
// ---------------------------------------------------------------------------

/// A leaf bookmark with its derived domain. Serialized field names follow the
/// host's camelCase convention because this is what the classifier sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatBookmark {
    pub id: String,
    pub title: String,
    pub url: String,
    /// URL host, or [`UNKNOWN_DOMAIN`].
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// A pre-existing user folder the classifier may reuse by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingFolder {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}
