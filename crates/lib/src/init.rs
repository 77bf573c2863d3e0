//! Initialize the configuration directory: create ~/.twin, a default config, and the avatars directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with the default settings if missing.
/// - Creates the `avatars` subdirectory for persona images.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, leaving it", config_path.display());
    }

    let avatars = config_dir.join("avatars");
    if !avatars.exists() {
        std::fs::create_dir_all(&avatars)
            .with_context(|| format!("creating avatars directory {}", avatars.display()))?;
        log::info!("created avatars directory at {}", avatars.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_default_config_once() {
        let dir = std::env::temp_dir().join(format!("twin-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        assert_eq!(init_config_dir(&path).unwrap(), dir);
        assert!(dir.join("avatars").is_dir());

        let (config, _) = crate::config::load_config(Some(path.clone())).unwrap();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8000");

        std::fs::write(&path, r#"{"api":{"baseUrl":"http://example.test"}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = crate::config::load_config(Some(path)).unwrap();
        assert_eq!(config.api.base_url, "http://example.test");
    }
}
