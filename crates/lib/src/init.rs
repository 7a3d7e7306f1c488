//! Initialize the configuration directory: create ~/.chimera and a default config.json.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Log a hint when the config file is missing; the bot still runs on defaults and env.
pub fn warn_if_uninitialized(config_path: &Path) {
    if !config_path.exists() {
        log::warn!(
            "config file not found at {}; using defaults (run `chimera init` to create one)",
            config_path.display()
        );
    }
}

/// Create the config directory and a default `config.json` if they do not exist.
/// The written config contains every field with its default value so it can be edited in place.
/// An existing config file is left untouched.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("chimera-init-test-{}", uuid::Uuid::new_v4()))
            .join("config.json")
    }

    #[test]
    fn init_writes_a_loadable_default_config() {
        let path = temp_config_path();
        let dir = init_config_dir(&path).unwrap();
        assert_eq!(dir, path.parent().unwrap());
        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.typing.delay_ms, 4000);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn init_keeps_an_existing_config() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"typing":{"delayMs":250}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.typing.delay_ms, 250);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
