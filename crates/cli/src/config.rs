//! Configuration management for the CLI
//!
//! Defaults come from `~/.config/nodetop/config.json`, overridden by
//! `NODETOP_*` environment variables. Command-line flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default `--sort-by` key
    pub sort_by: Option<String>,
    /// Default for `--sum`
    pub sum: Option<bool>,
    /// Default for `--show-capacity`
    pub show_capacity: Option<bool>,
    /// Default `--request-timeout` in seconds
    pub request_timeout_secs: Option<u64>,
    /// Default output format
    pub default_format: Option<String>,
    /// Default namespace when not reporting all namespaces
    pub default_namespace: Option<String>,
}

impl Config {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, which may be missing
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("NODETOP").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("nodetop").join("config.json"))
    }
}

/// Kubeconfig files to read, in merge order
///
/// An explicit path wins; otherwise `KUBECONFIG` may list several files, and
/// `~/.kube/config` is the fallback.
pub fn kubeconfig_paths(override_path: Option<&str>) -> Result<Vec<PathBuf>> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return Ok(std::env::split_paths(path).collect());
    }

    if let Some(paths) = std::env::var_os("KUBECONFIG").filter(|p| !p.is_empty()) {
        return Ok(std::env::split_paths(&paths).collect());
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(vec![home.join(".kube").join("config")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.sort_by, None);
        assert_eq!(config.default_format, None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "sort_by": "cpu",
                "sum": false,
                "show_capacity": true,
                "default_format": "json",
                "default_namespace": "kube-system"
            }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.sort_by.as_deref(), Some("cpu"));
        assert_eq!(config.sum, Some(false));
        assert_eq!(config.show_capacity, Some(true));
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.default_namespace.as_deref(), Some("kube-system"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "request_timeout_secs": 10 }"#).unwrap();

        std::env::set_var("NODETOP_REQUEST_TIMEOUT_SECS", "45");
        let config = Config::load_from(&path);
        std::env::remove_var("NODETOP_REQUEST_TIMEOUT_SECS");

        assert_eq!(config.unwrap().request_timeout_secs, Some(45));
    }

    #[test]
    fn test_explicit_kubeconfig_path() {
        let paths = kubeconfig_paths(Some("/tmp/kubeconfig")).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/tmp/kubeconfig")]);
    }
}
