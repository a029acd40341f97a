//! On-disk configuration for the `layerbox` binary.

use std::fs;
use std::path::{Path, PathBuf};

use layerbox_oci::Platform;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_LOG_LEVEL: &str = "info";

const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error", "fatal"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Driver store root; `--driver-store` takes precedence.
    pub store: Option<PathBuf>,
    /// `os/arch[/variant]` picked from multi-platform images. Defaults to
    /// the host platform.
    pub platform: Option<String>,
}

impl Config {
    /// The `tracing` filter directive for `log_level`.
    pub fn filter_directive(&self) -> &str {
        match self.log_level.as_str() {
            "fatal" => "error",
            "" => DEFAULT_LOG_LEVEL,
            level => level,
        }
    }

    /// The configured image platform, if one is set.
    pub fn platform(&self) -> Result<Option<Platform>> {
        self.platform
            .as_deref()
            .map(|raw| Platform::parse(raw).map_err(|e| Error::Config(e.to_string())))
            .transpose()
    }

    fn with_defaults(mut self) -> Self {
        if self.log_level.is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        self
    }
}

/// Load the config at `path`, or the defaults when no path is given.
///
/// Files ending in `.json` are parsed as JSON, anything else as YAML.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default().with_defaults());
    };

    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let config: Config = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid JSON config {}: {}", path.display(), e)))?
    } else if raw.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid YAML config {}: {}", path.display(), e)))?
    };

    let config = config.with_defaults();
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        return Err(Error::Config(format!(
            "unsupported log_level '{}', expected one of {}",
            config.log_level,
            LOG_LEVELS.join(", ")
        )));
    }
    config.platform()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn no_file_means_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.store, None);
    }

    #[test]
    fn yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.yml", "log_level: debug\nstore: /var/lib/layerbox\n");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store, Some(PathBuf::from("/var/lib/layerbox")));
    }

    #[test]
    fn json_config_and_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.json", r#"{"store": "/data"}"#);
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.store, Some(PathBuf::from("/data")));
    }

    #[test]
    fn empty_yaml_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.yml", "");
        assert_eq!(load_config(Some(&path)).unwrap().log_level, "info");
    }

    #[test]
    fn bad_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.yml", "log_level: chatty\n");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("chatty"), "{}", err);
    }

    #[test]
    fn unreadable_or_malformed_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_config(Some(&dir.path().join("missing.yml"))),
            Err(Error::Config(_))
        ));
        let path = write(&dir, "config.json", "{not json");
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn fatal_maps_to_error_filter() {
        let config = Config {
            log_level: "fatal".to_string(),
            ..Config::default()
        };
        validate_config(&config).unwrap();
        assert_eq!(config.filter_directive(), "error");
    }

    #[test]
    fn platform_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.yml", "platform: windows/amd64\n");
        let platform = load_config(Some(&path)).unwrap().platform().unwrap().unwrap();
        assert_eq!((platform.os.as_str(), platform.architecture.as_str()), ("windows", "amd64"));
        assert_eq!(load_config(None).unwrap().platform().unwrap(), None);

        let path = write(&dir, "bad.yml", "platform: windows\n");
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }
}
