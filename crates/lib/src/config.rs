//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.twin/config.json`) and environment.
//! Paths that are relative are resolved against the config file's parent directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SEED_MESSAGE: &str = "Olá!";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Where the login session is persisted.
    #[serde(default)]
    pub session: SessionConfig,

    /// Front-end options shared by the CLI and desktop.
    #[serde(default)]
    pub ui: UiConfig,
}

/// Backend base URL and the key used for the account endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Base URL of the backend (default "http://127.0.0.1:8000"). Overridden by TWIN_API_URL env.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Bearer key the backend requires on /auth/login and /auth/register. Overridden by TWIN_API_KEY env.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            api_key: None,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Session persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Session file (default `session.json` next to the config file).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Forget any stored login every time a client starts.
    #[serde(default)]
    pub clear_on_startup: bool,
}

/// Front-end options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    /// Directory holding persona avatar images (default `avatars` next to the config file).
    #[serde(default)]
    pub avatar_dir: Option<PathBuf>,

    /// First message sent when a new chat is opened with a persona (default "Olá!").
    #[serde(default)]
    pub seed_message: Option<String>,
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TWIN_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".twin").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or TWIN_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the API base URL: env TWIN_API_URL overrides config. Trailing slashes are dropped.
pub fn resolve_base_url(config: &Config) -> String {
    let url = non_empty_env("TWIN_API_URL").unwrap_or_else(|| {
        let configured = config.api.base_url.trim();
        if configured.is_empty() {
            default_api_base_url()
        } else {
            configured.to_string()
        }
    });
    url.trim_end_matches('/').to_string()
}

/// Resolve the account-endpoint key: env TWIN_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    non_empty_env("TWIN_API_KEY").or_else(|| {
        config
            .api
            .api_key
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Seed message for new chats.
pub fn resolve_seed_message(config: &Config) -> String {
    config
        .ui
        .seed_message
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SEED_MESSAGE.to_string())
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn resolve_relative(config_path: &Path, configured: Option<&PathBuf>, default_name: &str) -> PathBuf {
    let parent = config_parent(config_path);
    match configured {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join(default_name),
    }
}

/// Resolve the session file: `session.path` if set, else `session.json` next to the config file.
pub fn resolve_session_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_relative(config_path, config.session.path.as_ref(), "session.json")
}

/// Resolve the avatar directory: `ui.avatarDir` if set, else `avatars` next to the config file.
pub fn resolve_avatar_dir(config: &Config, config_path: &Path) -> PathBuf {
    resolve_relative(config_path, config.ui.avatar_dir.as_ref(), "avatars")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
        assert!(config.api.api_key.is_none());
        assert!(!config.session.clear_on_startup);
        assert_eq!(resolve_seed_message(&config), "Olá!");
    }

    #[test]
    fn parses_camel_case_keys() {
        let json = r#"{
            "api": { "baseUrl": "https://twin.example/", "apiKey": "k" },
            "session": { "clearOnStartup": true },
            "ui": { "seedMessage": "Hello" }
        }"#;
        let config: Config = serde_json::from_str(json).expect("parse");
        assert_eq!(config.api.base_url, "https://twin.example/");
        assert_eq!(config.api.api_key.as_deref(), Some("k"));
        assert!(config.session.clear_on_startup);
        assert_eq!(resolve_seed_message(&config), "Hello");
    }

    #[test]
    fn empty_object_is_default() {
        let config: Config = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn session_path_default_and_override() {
        let path = Path::new("/home/user/.twin/config.json");
        let mut config = Config::default();
        assert_eq!(
            resolve_session_path(&config, path),
            PathBuf::from("/home/user/.twin/session.json")
        );
        config.session.path = Some(PathBuf::from("state/login.json"));
        assert_eq!(
            resolve_session_path(&config, path),
            PathBuf::from("/home/user/.twin/state/login.json")
        );
        config.session.path = Some(PathBuf::from("/tmp/login.json"));
        assert_eq!(resolve_session_path(&config, path), PathBuf::from("/tmp/login.json"));
    }

    #[test]
    fn avatar_dir_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.twin/config.json");
        assert_eq!(
            resolve_avatar_dir(&config, path),
            PathBuf::from("/home/user/.twin/avatars")
        );
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let path = std::env::temp_dir()
            .join(format!("twin-config-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).expect("load");
        assert_eq!(used, path);
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");
    }
}
