//! Tree flattener: one pre-order walk of the host tree.

use tidymarks_shared::{
    BOOKMARK_BAR_ID, BOOKMARK_BAR_TITLE, BookmarkNode, ExistingFolder, FlatBookmark, Result,
    TidymarksError, UNKNOWN_DOMAIN, is_system_id,
};
use tracing::debug;
use url::Url;

/// Everything the engine learns from a single tree read.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    /// The tree as read, kept for previews.
    pub roots: Vec<BookmarkNode>,
    pub bookmarks: Vec<FlatBookmark>,
    pub folders: Vec<ExistingFolder>,
    /// Anchor for top-level plan folders.
    pub bookmark_bar_id: String,
}

impl TreeSnapshot {
    /// Flatten `roots` and locate the bookmark bar.
    pub fn from_roots(roots: Vec<BookmarkNode>) -> Result<Self> {
        let bookmark_bar_id = find_bookmark_bar(&roots)?.id.clone();
        let (bookmarks, folders) = flatten(&roots);
        Ok(Self {
            roots,
            bookmarks,
            folders,
            bookmark_bar_id,
        })
    }
}

/// Walk the tree once, collecting leaf bookmarks and reusable folders.
///
/// Siblings keep their original order. System folders are walked but never
/// listed, and neither are folders with no children.
pub fn flatten(roots: &[BookmarkNode]) -> (Vec<FlatBookmark>, Vec<ExistingFolder>) {
    let mut bookmarks = Vec::new();
    let mut folders = Vec::new();

    let mut stack: Vec<&BookmarkNode> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if let Some(url) = &node.url {
            bookmarks.push(FlatBookmark {
                id: node.id.clone(),
                title: node.title.clone(),
                url: url.clone(),
                domain: domain_of(url),
                parent_id: node.parent_id.clone(),
            });
            continue;
        }

        let children = node.child_nodes();
        if children.is_empty() {
            continue;
        }
        if !is_system_id(&node.id) {
            folders.push(ExistingFolder {
                id: node.id.clone(),
                title: node.title.clone(),
                parent_id: node.parent_id.clone(),
            });
        }
        stack.extend(children.iter().rev());
    }

    (bookmarks, folders)
}

/// Host of `url`, or [`UNKNOWN_DOMAIN`] when it has none.
pub fn domain_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => UNKNOWN_DOMAIN.to_string(),
        },
        Err(e) => {
            debug!(url, error = %e, "unparseable bookmark url");
            UNKNOWN_DOMAIN.to_string()
        }
    }
}

/// The root child titled "Bookmarks bar", or failing that the one with id `"1"`.
pub fn find_bookmark_bar(roots: &[BookmarkNode]) -> Result<&BookmarkNode> {
    let top_level = || roots.iter().flat_map(|root| root.child_nodes());
    top_level()
        .find(|n| n.is_folder() && n.title == BOOKMARK_BAR_TITLE)
        .or_else(|| top_level().find(|n| n.id == BOOKMARK_BAR_ID))
        .ok_or_else(|| TidymarksError::TreeRead("could not find the bookmark bar".into()))
}
