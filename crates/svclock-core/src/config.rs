//! Configuration for the service lock registry.
//!
//! The configuration root is resolved once, at process start, and then
//! threaded into [`crate::IdentityResolver`] and [`crate::ServiceRegistry`].

use crate::error::{Result, SvcLockError};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// On-disk layout constants.
pub struct LayoutConfig;

impl LayoutConfig {
    pub const CONFIG_HOME_ENV: &'static str = "XDG_CONFIG_HOME";
    pub const DEFAULT_CONFIG_DIR_NAME: &'static str = ".config";
    pub const DEFAULT_NAMESPACE: &'static str = "gatsby";
    pub const SITES_DIR_NAME: &'static str = "sites";
    pub const SLOT_SUFFIX: &'static str = ".lock";
    pub const RECORD_FILE_NAME: &'static str = "data";
    pub const HOLD_FILE_NAME: &'static str = ".holder";
}

/// Where registry locations live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLockConfig {
    /// Per-user configuration root (`$XDG_CONFIG_HOME` or `~/.config`).
    pub config_root: PathBuf,
    /// Namespace segment under the root, shared by every program using it.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    LayoutConfig::DEFAULT_NAMESPACE.to_string()
}

impl ServiceLockConfig {
    /// Create a configuration rooted at `config_root` with the default namespace.
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            namespace: default_namespace(),
        }
    }

    /// Replace the namespace segment.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Resolve the configuration root from the process environment.
    ///
    /// `XDG_CONFIG_HOME` wins when set to a non-empty value; otherwise the
    /// root is `~/.config` on every platform.
    pub fn from_env() -> Result<Self> {
        let root = resolve_config_root(
            std::env::var_os(LayoutConfig::CONFIG_HOME_ENV),
            dirs::home_dir(),
        )?;
        Ok(Self::new(root))
    }

    /// `<config_root>/<namespace>/sites`
    pub fn sites_dir(&self) -> PathBuf {
        self.config_root
            .join(&self.namespace)
            .join(LayoutConfig::SITES_DIR_NAME)
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }
}

fn resolve_config_root(config_home: Option<OsString>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = config_home.filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let home = home.ok_or_else(|| SvcLockError::Config {
        message: format!(
            "Could not determine home directory and {} is not set",
            LayoutConfig::CONFIG_HOME_ENV
        ),
    })?;
    Ok(home.join(LayoutConfig::DEFAULT_CONFIG_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_home_takes_precedence() {
        let root = resolve_config_root(
            Some(OsString::from("/xdg/config")),
            Some(PathBuf::from("/home/alice")),
        )
        .unwrap();
        assert_eq!(root, PathBuf::from("/xdg/config"));
    }

    #[test]
    fn test_falls_back_to_home_dot_config() {
        let root = resolve_config_root(None, Some(PathBuf::from("/home/alice"))).unwrap();
        assert_eq!(root, PathBuf::from("/home/alice/.config"));

        let root =
            resolve_config_root(Some(OsString::new()), Some(PathBuf::from("/home/alice"))).unwrap();
        assert_eq!(root, PathBuf::from("/home/alice/.config"));
    }

    #[test]
    fn test_missing_home_is_config_error() {
        let err = resolve_config_root(None, None).unwrap_err();
        assert!(matches!(err, SvcLockError::Config { .. }));
    }

    #[test]
    fn test_sites_dir_layout() {
        let config = ServiceLockConfig::new("/cfg");
        assert_eq!(config.sites_dir(), PathBuf::from("/cfg/gatsby/sites"));

        let config = config.with_namespace("other");
        assert_eq!(config.sites_dir(), PathBuf::from("/cfg/other/sites"));
    }

    #[test]
    fn test_deserialize_uses_default_namespace() {
        let config: ServiceLockConfig =
            serde_json::from_str(r#"{"config_root": "/cfg"}"#).unwrap();
        assert_eq!(config, ServiceLockConfig::new("/cfg"));
    }
}
