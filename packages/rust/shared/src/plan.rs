//! The organization plan produced by the classifier.
//!
//! The plan arrives as untrusted JSON. It is decoded here, at the trust
//! boundary, into explicit variants:
//!
//! ```json
//! {
//!   "bookmarks": {
//!     "bookmark_bar": { "children": ["2", "3"] },
//!     "folders": [
//!       { "name": "🚀 Development", "children": ["8", { "name": "📚 Docs", "children": ["9"] }] }
//!     ]
//!   }
//! }
//! ```
//!
//! A folder child is either a bookmark reference (string) or a nested folder
//! (object with `name`). Anything else is rejected.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, TidymarksError};

// ---------------------------------------------------------------------------
// BookmarkRef
// ---------------------------------------------------------------------------

/// A reference to a host bookmark by id.
///
/// Decodes from a JSON string, or from a non-negative integer which is
/// normalized to its decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookmarkRef(String);

impl BookmarkRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookmarkRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for BookmarkRef {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RefVisitor;

        impl Visitor<'_> for RefVisitor {
            type Value = BookmarkRef;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a bookmark id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(BookmarkRef::new(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
                Ok(BookmarkRef(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(BookmarkRef(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                if v < 0 {
                    return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
                }
                Ok(BookmarkRef(v.to_string()))
            }
        }

        deserializer.deserialize_any(RefVisitor)
    }
}

// ---------------------------------------------------------------------------
// Plan nodes
// ---------------------------------------------------------------------------

/// Root of a plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub bookmarks: PlanBookmarks,
}

/// The `bookmarks` object: the bar's direct bookmarks plus the folder roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBookmarks {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bookmark_bar: BookmarkBarNode,
    /// Folder roots, each placed directly under the bookmark bar.
    #[serde(default, deserialize_with = "null_as_default")]
    pub folders: Vec<FolderNode>,
}

/// `null` decodes like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Bookmarks that go directly on the bar. Identified by having no `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBookmarkBar")]
pub struct BookmarkBarNode {
    pub children: Vec<BookmarkRef>,
}

#[derive(Deserialize)]
struct RawBookmarkBar {
    #[serde(default)]
    name: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    children: Vec<BookmarkRef>,
}

impl TryFrom<RawBookmarkBar> for BookmarkBarNode {
    type Error = String;

    fn try_from(raw: RawBookmarkBar) -> std::result::Result<Self, Self::Error> {
        if raw.name.is_some() {
            return Err("`bookmark_bar` must not have a `name`; named folders belong in `folders`".into());
        }
        Ok(Self {
            children: raw.children,
        })
    }
}

/// A named folder and its ordered contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFolder")]
pub struct FolderNode {
    pub name: String,
    pub children: Vec<PlanChild>,
}

#[derive(Deserialize)]
struct RawFolder {
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    children: Vec<PlanChild>,
}

impl TryFrom<RawFolder> for FolderNode {
    type Error = String;

    fn try_from(raw: RawFolder) -> std::result::Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err("folder `name` must not be blank".into());
        }
        Ok(Self {
            name: raw.name,
            children: raw.children,
        })
    }
}

/// One entry of a folder's `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanChild {
    Bookmark(BookmarkRef),
    Folder(FolderNode),
}

impl FolderNode {
    /// Convenience constructor, mostly for tests and fixtures.
    pub fn new(name: impl Into<String>, children: Vec<PlanChild>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Direct child folders, in order.
    pub fn subfolders(&self) -> impl Iterator<Item = &FolderNode> {
        self.children.iter().filter_map(|c| match c {
            PlanChild::Folder(f) => Some(f),
            PlanChild::Bookmark(_) => None,
        })
    }

    /// Number of folders in this subtree, including this one.
    pub fn folder_count(&self) -> usize {
        1 + self.subfolders().map(FolderNode::folder_count).sum::<usize>()
    }

    /// Every bookmark reference in this subtree, depth-first.
    pub fn bookmark_refs(&self) -> Vec<&BookmarkRef> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs<'a>(&'a self, out: &mut Vec<&'a BookmarkRef>) {
        for child in &self.children {
            match child {
                PlanChild::Bookmark(r) => out.push(r),
                PlanChild::Folder(f) => f.collect_refs(out),
            }
        }
    }
}

impl Plan {
    /// Decode a plan from raw JSON text.
    ///
    /// Fails with [`TidymarksError::ClassificationParse`] when the text is not
    /// JSON, lacks the top-level `bookmarks` key, or has a node matching
    /// neither plan variant.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| TidymarksError::classification_parse(format!("not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Decode a plan from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.get("bookmarks").is_none() {
            return Err(TidymarksError::classification_parse(
                "missing required top-level `bookmarks` key",
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| TidymarksError::classification_parse(format!("unexpected plan shape: {e}")))
    }

    /// Every bookmark reference in placement order: bar first, then each
    /// folder tree depth-first.
    pub fn referenced_ids(&self) -> Vec<&BookmarkRef> {
        let mut out: Vec<&BookmarkRef> = self.bookmarks.bookmark_bar.children.iter().collect();
        for folder in &self.bookmarks.folders {
            folder.collect_refs(&mut out);
        }
        out
    }

    /// Total number of folders across all folder trees.
    pub fn folder_count(&self) -> usize {
        self.bookmarks.folders.iter().map(FolderNode::folder_count).sum()
    }
}
