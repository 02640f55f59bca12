//! Configuration and the key-value preference store

mod preferences;

pub use preferences::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mirror::MirrorEndpoint;

/// Browser-like user agent; several mirrors reject default client agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

/// Configuration for osu-tunes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the per-set asset directories (`<library_dir>/<set_id>/`)
    pub library_dir: PathBuf,
    /// Scratch space for downloaded archives
    pub cache_dir: PathBuf,
    /// SQLite database holding tracks, preserved sets and playlists
    pub database_path: PathBuf,
    /// JSON file backing the preference store
    pub preferences_path: PathBuf,
    /// Default archive mirror order
    pub mirrors: Vec<MirrorEndpoint>,
    /// Provider that serves individual files instead of archives
    pub direct: DirectProviderConfig,
    /// Fallback cover URL, `%s` is replaced by the set ID
    pub cover_url_template: Option<String>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

/// Endpoints of the direct-fetch provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectProviderConfig {
    /// Preference value that selects this provider
    pub name: String,
    /// Manifest URL, `%s` is replaced by the set ID
    pub manifest_template: String,
    /// Per-file URL ending in `{file}`; `%s` is replaced by the set ID and
    /// `{file}` by the URL-encoded file name
    pub file_template: String,
}

impl Default for DirectProviderConfig {
    fn default() -> Self {
        Self {
            name: "sayobot".to_string(),
            manifest_template: "https://api.sayobot.cn/v2/beatmapinfo?0=%s".to_string(),
            file_template: "https://dl.sayobot.cn/beatmaps/files/%s/{file}".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("osu-tunes");
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("osu-tunes");
        let config = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("osu-tunes");

        Self {
            library_dir: data.join("library"),
            cache_dir: cache,
            database_path: data.join("library.db"),
            preferences_path: config.join("preferences.json"),
            mirrors: MirrorEndpoint::defaults(),
            direct: DirectProviderConfig::default(),
            cover_url_template: Some(
                "https://assets.ppy.sh/beatmaps/%s/covers/cover.jpg".to_string(),
            ),
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Create a config that keeps all state below a single root directory
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            library_dir: root.join("library"),
            cache_dir: root.join("cache"),
            database_path: root.join("library.db"),
            preferences_path: root.join("preferences.json"),
            ..Self::default()
        }
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("osu-tunes").join("config.json"))
    }

    /// Load config from disk, falling back to defaults if not found
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| std::fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Save config to disk
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
            std::fs::write(&path, content)?;
        }
        Ok(())
    }

    /// Directory holding the assets of one beatmap set
    pub fn set_dir(&self, set_id: i64) -> PathBuf {
        crate::utils::set_asset_dir(&self.library_dir, set_id)
    }

    /// Directory archives are downloaded into
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Build the HTTP client shared by every fetcher.
    ///
    /// Timeouts are fixed here; the pipeline enforces none of its own.
    pub fn http_client(&self) -> crate::Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout())
            .read_timeout(self.read_timeout())
            .build()?;
        Ok(client)
    }
}
