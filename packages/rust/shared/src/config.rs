//! Application configuration for Tidymarks.
//!
//! User config lives at `~/.tidymarks/tidymarks.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TidymarksError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tidymarks.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tidymarks";

/// Database file name inside the config directory.
const DB_FILE_NAME: &str = "tidymarks.db";

// ---------------------------------------------------------------------------
// Config structs (matching tidymarks.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini classifier settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Plan application policies.
    #[serde(default)]
    pub organize: OrganizeConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Organization type sent to the classifier when `--type` is omitted.
    #[serde(default = "default_organization_type")]
    pub organization_type: String,

    /// Path to a Chromium `Bookmarks` file. Unset means the default profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarks_file: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            organization_type: default_organization_type(),
            bookmarks_file: None,
        }
    }
}

fn default_organization_type() -> String {
    "topic".into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for classification.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL (without the `/v1beta/...` path).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_timeout_secs() -> u64 {
    120
}

/// What to do with known bookmarks the plan never mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnplacedPolicy {
    /// Leave them where they are.
    #[default]
    Leave,
    /// Append them to the bookmark bar's children before placement.
    BookmarkBar,
}

impl std::fmt::Display for UnplacedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leave => f.write_str("leave"),
            Self::BookmarkBar => f.write_str("bookmark-bar"),
        }
    }
}

/// `[organize]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeConfig {
    /// Handling of bookmarks missing from the plan.
    #[serde(default)]
    pub unplaced: UnplacedPolicy,

    /// Abort before any mutation if plan validation reports anything.
    #[serde(default)]
    pub strict: bool,

    /// Reuse a stored plan when the classifier payload is unchanged.
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            unplaced: UnplacedPolicy::default(),
            strict: false,
            use_cache: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tidymarks/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TidymarksError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tidymarks/tidymarks.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the path to the plan/run database (`~/.tidymarks/tidymarks.db`).
pub fn database_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(DB_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TidymarksError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        TidymarksError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_gemini_config(&config.gemini)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TidymarksError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TidymarksError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TidymarksError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the classifier client cannot work with.
pub fn validate_gemini_config(gemini: &GeminiConfig) -> Result<()> {
    Url::parse(&gemini.base_url).map_err(|e| {
        TidymarksError::config(format!("gemini.base_url '{}' is not a URL: {e}", gemini.base_url))
    })?;
    if gemini.model.trim().is_empty() {
        return Err(TidymarksError::config("gemini.model must not be empty"));
    }
    if !(0.0..=2.0).contains(&gemini.temperature) {
        return Err(TidymarksError::config(format!(
            "gemini.temperature {} is outside 0.0..=2.0",
            gemini.temperature
        )));
    }
    Ok(())
}

/// Read the Gemini API key from the env var named in config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TidymarksError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey"
        ))),
    }
}
