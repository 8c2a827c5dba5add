//! Shared types, error model, and configuration for Tidymarks.
//!
//! This crate is the foundation depended on by all other Tidymarks crates.
//! It provides:
//! - [`TidymarksError`], the unified error type
//! - Domain types ([`BookmarkNode`], [`FlatBookmark`], [`ExistingFolder`])
//! - The classifier plan ([`Plan`]) and its trust-boundary decoding
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod plan;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, OrganizeConfig, UnplacedPolicy, config_dir,
    config_file_path, database_path, init_config, load_config, load_config_from,
    resolve_api_key, validate_gemini_config,
};
pub use error::{Result, TidymarksError};
pub use plan::{BookmarkBarNode, BookmarkRef, FolderNode, Plan, PlanBookmarks, PlanChild};
pub use types::{
    BOOKMARK_BAR_ID, BOOKMARK_BAR_TITLE, BookmarkNode, ExistingFolder, FlatBookmark,
    MOBILE_BOOKMARKS_ID, OTHER_BOOKMARKS_ID, ROOT_ID, SYSTEM_NODE_IDS, UNKNOWN_DOMAIN,
    is_system_id,
};
