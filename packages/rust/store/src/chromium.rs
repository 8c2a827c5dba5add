//! Chromium `Bookmarks` file codec.
//!
//! A profile's `Bookmarks` file looks like:
//!
//! ```json
//! {
//!   "checksum": "…",
//!   "roots": {
//!     "bookmark_bar": { "id": "1", "name": "Bookmarks bar", "type": "folder", "children": [ … ] },
//!     "other":        { "id": "2", "name": "Other bookmarks", "type": "folder", "children": [ … ] },
//!     "synced":       { "id": "3", "name": "Mobile bookmarks", "type": "folder", "children": [ … ] }
//!   },
//!   "version": 1
//! }
//! ```
//!
//! Loading builds a [`MemoryStore`]; saving writes the store back. Fields we
//! do not interpret (`guid`, `date_added`, `meta_info`, …) are carried through
//! untouched. The checksum is dropped on save since the tree has changed; the
//! browser recomputes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tidymarks_shared::{Result, ROOT_ID, TidymarksError};
use tracing::{info, instrument};

use crate::memory::{Entry, MemoryStore};

/// Microseconds between 1601-01-01 (the WebKit epoch) and the Unix epoch.
const WEBKIT_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

#[derive(Debug, Serialize, Deserialize)]
struct BookmarksFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    roots: Map<String, Value>,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
struct FileNode {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<FileNode>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NodeKind {
    Url,
    Folder,
}

/// A loaded Chromium profile: the editable store plus the file-level fields
/// needed to write it back.
#[derive(Debug)]
pub struct ChromiumProfile {
    store: MemoryStore,
    /// `roots` keys in file order, with the node id each one holds.
    root_keys: Vec<(String, String)>,
    /// Non-folder values found under `roots` (e.g. `sync_transaction_version`).
    root_extras: Map<String, Value>,
    version: u32,
    extra: Map<String, Value>,
}

impl ChromiumProfile {
    /// Read and decode a `Bookmarks` file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TidymarksError::io(path, e))?;
        let profile = Self::from_json(&content)?;
        info!(roots = profile.root_keys.len(), "bookmarks file loaded");
        Ok(profile)
    }

    /// Decode the contents of a `Bookmarks` file.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: BookmarksFile = serde_json::from_str(content)
            .map_err(|e| TidymarksError::TreeRead(format!("malformed Bookmarks file: {e}")))?;

        let store = MemoryStore::with_root("");
        let mut root_keys = Vec::new();
        let mut root_extras = Map::new();

        for (key, value) in file.roots {
            if !value.is_object() || value.get("type").is_none() {
                root_extras.insert(key, value);
                continue;
            }
            let node: FileNode = serde_json::from_value(value).map_err(|e| {
                TidymarksError::TreeRead(format!("malformed root `{key}`: {e}"))
            })?;
            root_keys.push((key, node.id.clone()));
            import_node(&store, node, ROOT_ID)?;
        }

        Ok(Self {
            store,
            root_keys,
            root_extras,
            version: file.version,
            extra: file.extra,
        })
    }

    /// The editable tree.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Encode the current tree as `Bookmarks` file JSON.
    pub fn to_json(&self) -> Result<String> {
        let roots = self.store.with_entries(|nodes| {
            let mut roots = self.root_extras.clone();
            for (key, id) in &self.root_keys {
                if let Some(node) = export_node(nodes, id) {
                    let value = serde_json::to_value(node).unwrap_or(Value::Null);
                    roots.insert(key.clone(), value);
                }
            }
            roots
        })?;

        let file = BookmarksFile {
            checksum: None,
            roots,
            version: self.version,
            extra: self.extra.clone(),
        };
        serde_json::to_string_pretty(&file)
            .map_err(|e| TidymarksError::validation(format!("failed to encode bookmarks: {e}")))
    }

    /// Write the tree back to `path`, replacing the file atomically.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("tidymarks.tmp");
        std::fs::write(&tmp, json).map_err(|e| TidymarksError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| TidymarksError::io(path, e))?;
        info!("bookmarks file saved");
        Ok(())
    }
}

fn import_node(store: &MemoryStore, node: FileNode, parent_id: &str) -> Result<()> {
    let url = match node.kind {
        NodeKind::Url => Some(node.url.ok_or_else(|| {
            TidymarksError::TreeRead(format!("bookmark {} has no url", node.id))
        })?),
        NodeKind::Folder => None,
    };
    let id = node.id;
    store
        .insert_entry(Entry {
            id: id.clone(),
            title: node.name,
            url,
            parent_id: Some(parent_id.to_string()),
            children: Vec::new(),
            extra: node.extra,
        })
        .map_err(|e| TidymarksError::TreeRead(e.to_string()))?;

    for child in node.children.unwrap_or_default() {
        import_node(store, child, &id)?;
    }
    Ok(())
}

fn export_node(nodes: &HashMap<String, Entry>, id: &str) -> Option<FileNode> {
    let entry = nodes.get(id)?;
    let mut extra = entry.extra.clone();
    stamp_new_node(&mut extra);

    let (kind, children) = match entry.url {
        Some(_) => (NodeKind::Url, None),
        None => (
            NodeKind::Folder,
            Some(
                entry
                    .children
                    .iter()
                    .filter_map(|child| export_node(nodes, child))
                    .collect(),
            ),
        ),
    };

    Some(FileNode {
        id: entry.id.clone(),
        name: entry.title.clone(),
        kind,
        url: entry.url.clone(),
        children,
        extra,
    })
}

/// Give nodes created during this session the fields the browser expects.
fn stamp_new_node(extra: &mut Map<String, Value>) {
    if !extra.contains_key("guid") {
        extra.insert("guid".into(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    if !extra.contains_key("date_added") {
        extra.insert("date_added".into(), Value::String(webkit_now()));
    }
}

/// Current time as a WebKit timestamp string (microseconds since 1601).
fn webkit_now() -> String {
    (chrono::Utc::now().timestamp_micros() + WEBKIT_EPOCH_OFFSET_MICROS).to_string()
}

/// Location of the default Chrome profile's `Bookmarks` file on this platform.
pub fn default_bookmarks_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let base = dirs::data_local_dir().map(|d| d.join("Google").join("Chrome").join("User Data"));
    #[cfg(target_os = "macos")]
    let base = dirs::config_dir().map(|d| d.join("Google").join("Chrome"));
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let base = dirs::config_dir().map(|d| d.join("google-chrome"));

    base.map(|b| b.join("Default").join("Bookmarks"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookmarkStore;

    fn fixture() -> String {
        std::fs::read_to_string("../../../fixtures/chromium/Bookmarks.json")
            .expect("read Bookmarks fixture")
    }

    #[tokio::test]
    async fn loads_fixture_tree() {
        let profile = ChromiumProfile::from_json(&fixture()).expect("decode");
        let tree = profile.store().get_tree().await.unwrap();
        let roots = tree[0].child_nodes();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[0].id, "1");
        assert_eq!(roots[0].title, "Bookmarks bar");
        assert_eq!(roots[2].title, "Mobile bookmarks");

        let bar_children = roots[0].child_nodes();
        assert_eq!(bar_children[0].url.as_deref(), Some("https://github.com/"));
        assert_eq!(bar_children[1].title, "Car videos");
        assert!(bar_children[1].is_folder());
    }

    #[tokio::test]
    async fn new_folders_get_ids_above_file_ids() {
        let profile = ChromiumProfile::from_json(&fixture()).unwrap();
        let folder = profile.store().create_folder("1", "📁 Misc").await.unwrap();
        assert_eq!(folder.id, "13");
    }

    #[tokio::test]
    async fn save_roundtrip_preserves_host_fields() {
        let profile = ChromiumProfile::from_json(&fixture()).unwrap();
        profile.store().create_folder("1", "📁 Misc").await.unwrap();
        profile.store().move_node("11", "1").await.unwrap();

        let json = profile.to_json().expect("encode");
        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("checksum").is_none());
        assert_eq!(value["version"], 1);
        assert_eq!(value["roots"]["sync_transaction_version"], "7");

        let bar = &value["roots"]["bookmark_bar"];
        assert_eq!(bar["guid"], "0bc5d13f-2cba-5d74-951f-3f233fe6c908");
        let names: Vec<&str> = bar["children"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["GitHub", "Car videos", "📁 Misc", "Hacker News"]);

        let misc = &bar["children"][2];
        assert_eq!(misc["type"], "folder");
        assert!(misc["guid"].as_str().is_some());
        assert!(misc["date_added"].as_str().is_some());

        let reloaded = ChromiumProfile::from_json(&json).expect("reload");
        assert_eq!(reloaded.store().parent_of("11").as_deref(), Some("1"));
    }

    #[test]
    fn save_writes_file() {
        let profile = ChromiumProfile::from_json(&fixture()).unwrap();
        let path = std::env::temp_dir().join(format!("tm_bookmarks_{}", uuid::Uuid::now_v7()));
        profile.save(&path).expect("save");
        let loaded = ChromiumProfile::load(&path).expect("load");
        assert_eq!(loaded.store().child_ids("1").len(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn malformed_file_is_a_tree_read_error() {
        let err = ChromiumProfile::from_json("{\"roots\": 3}").unwrap_err();
        assert!(matches!(err, TidymarksError::TreeRead(_)));

        let err = ChromiumProfile::from_json(
            r#"{"roots":{"bookmark_bar":{"id":"1","name":"Bar","type":"folder","children":[
                {"id":"4","name":"Broken","type":"url"}]}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("has no url"));
    }

    #[test]
    fn webkit_timestamps_are_after_unix_epoch_offset() {
        let now: i64 = webkit_now().parse().unwrap();
        assert!(now > WEBKIT_EPOCH_OFFSET_MICROS);
    }
}
