//! Host bookmark store boundary and implementations.
//!
//! The engine only ever talks to a [`BookmarkStore`]. This crate provides:
//! - [`MemoryStore`]: an in-memory tree with Chromium numbering
//! - [`ChromiumProfile`]: load/save of a Chromium `Bookmarks` file on top of a
//!   [`MemoryStore`]

pub mod chromium;
mod memory;

use async_trait::async_trait;
use tidymarks_shared::{BookmarkNode, Result};

pub use chromium::{ChromiumProfile, default_bookmarks_path};
pub use memory::{MemoryStore, OperationCounts};

/// The four host primitives the engine needs.
///
/// Every call is an independent request/response; failures surface as
/// [`tidymarks_shared::TidymarksError::HostStore`] carrying the host message.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// The whole tree, as a list of root nodes with children populated.
    async fn get_tree(&self) -> Result<Vec<BookmarkNode>>;

    /// Direct children of a folder, without their own children.
    async fn get_children(&self, folder_id: &str) -> Result<Vec<BookmarkNode>>;

    /// Create a folder titled `title` as the last child of `parent_id`.
    async fn create_folder(&self, parent_id: &str, title: &str) -> Result<BookmarkNode>;

    /// Move node `id` to the end of `parent_id`'s children.
    async fn move_node(&self, id: &str, parent_id: &str) -> Result<BookmarkNode>;
}
