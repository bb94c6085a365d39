use crate::error::{Error, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_SERVER: &str = "COURSEHUB_SERVER";
const ENV_TOKEN: &str = "COURSEHUB_TOKEN";

fn default_poll_ms() -> u64 {
    1000
}

fn default_cache() -> CacheBackend {
    CacheBackend::Sqlite
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppState {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Id of the signed-in user; own messages are recognised by it.
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_poll_ms")]
    pub connectivity_poll_ms: u64,
    #[serde(default = "default_cache")]
    pub cache: CacheBackend,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            user_id: String::new(),
            connectivity_poll_ms: default_poll_ms(),
            cache: default_cache(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.user_id.is_empty()
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_millis(self.connectivity_poll_ms.max(100))
    }

    // TOML is the canonical format; the JSON file written by older builds is
    // converted on first load.
    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("coursehub.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("com", "coursehub", "CourseHub")?;
        Some(proj.config_dir().join("state.json"))
    }

    pub fn load() -> Self {
        let mut state = match Self::toml_path() {
            Some(path) => Self::load_from(&path, Self::legacy_json_path().as_deref()),
            None => Self::new(),
        };
        state.apply_env(std::env::var(ENV_SERVER).ok(), std::env::var(ENV_TOKEN).ok());
        state
    }

    /// Reads `toml_path`, falling back to `legacy` (and migrating it) when
    /// the TOML file is missing or unreadable.
    pub fn load_from(toml_path: &Path, legacy: Option<&Path>) -> Self {
        if let Ok(text) = fs::read_to_string(toml_path) {
            match toml::from_str::<AppState>(&text) {
                Ok(state) => return state,
                Err(e) => log::warn!("ignoring malformed {}: {}", toml_path.display(), e),
            }
        }

        if let Some(legacy) = legacy {
            if let Ok(bytes) = fs::read(legacy) {
                if let Ok(state) = serde_json::from_slice::<AppState>(&bytes) {
                    if let Err(e) = state.save_to(toml_path) {
                        log::warn!("could not migrate legacy settings: {}", e);
                    }
                    return state;
                }
            }
        }

        Self::new()
    }

    pub fn apply_env(&mut self, server: Option<String>, token: Option<String>) {
        if let Some(server) = server.filter(|s| !s.trim().is_empty()) {
            self.base_url = crate::utils::normalize_url(&server);
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::toml_path().ok_or_else(|| Error::Config("no config dir".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}
