//! Configuration resolution for the launcher.
//!
//! Priority (highest first): command-line flags, the config file, built-in defaults.
//! The config file is `--config <path>` or `<KIOSK_HOME>/config.toml`.

use anyhow::{Context, Result};
use kiosk_protocol::KioskConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<KIOSK_HOME>/config.toml`
pub fn default_config_path() -> PathBuf {
    kiosk_logging::kiosk_home().join("config.toml")
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// Default path did not exist
    Defaults,
}

/// Flag values that replace file values when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub port: Option<String>,
    pub catalog: Option<PathBuf>,
    pub max_miss: Option<u32>,
}

/// Load the configuration. An explicit path must exist; the default path may not.
pub fn load_config(explicit: Option<&Path>) -> Result<(KioskConfig, ConfigSource)> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !required && !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok((KioskConfig::default(), ConfigSource::Defaults));
    }

    let config = KioskConfig::load(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    info!("Loaded config {}", path.display());
    Ok((config, ConfigSource::File(path)))
}

pub fn apply_overrides(config: &mut KioskConfig, overrides: &Overrides) {
    if let Some(port) = &overrides.port {
        config.reader.port_spec = port.clone();
    }
    if let Some(catalog) = &overrides.catalog {
        config.catalog.path = Some(catalog.clone());
    }
    if let Some(max_miss) = overrides.max_miss {
        config.tracker.max_miss_count = max_miss;
    }
}

/// Load, override, validate.
pub fn resolve(explicit: Option<&Path>, overrides: &Overrides) -> Result<(KioskConfig, ConfigSource)> {
    let (mut config, source) = load_config(explicit)?;
    apply_overrides(&mut config, overrides);
    config.validate().context("Invalid configuration")?;
    Ok((config, source))
}

/// Write the default configuration to `path`. Refuses to overwrite unless `force`.
pub fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    KioskConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = KioskConfig::default();
        apply_overrides(
            &mut config,
            &Overrides {
                port: Some("/dev/ttyUSB0:57600".to_string()),
                catalog: Some(PathBuf::from("articles.json")),
                max_miss: Some(2),
            },
        );
        assert_eq!(config.reader.port_spec, "/dev/ttyUSB0:57600");
        assert_eq!(config.catalog.path, Some(PathBuf::from("articles.json")));
        assert_eq!(config.tracker.max_miss_count, 2);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = KioskConfig::default();
        apply_overrides(&mut config, &Overrides::default());
        assert_eq!(config, KioskConfig::default());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_write_default_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path, false).unwrap();
        assert!(write_default_config(&path, false).is_err());
        write_default_config(&path, true).unwrap();

        let (config, source) = load_config(Some(&path)).unwrap();
        assert_eq!(config, KioskConfig::default());
        assert_eq!(source, ConfigSource::File(path));
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path, false).unwrap();

        let overrides = Overrides {
            max_miss: Some(0),
            ..Overrides::default()
        };
        assert!(resolve(Some(&path), &overrides).is_err());
    }
}
