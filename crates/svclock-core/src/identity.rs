//! Identity resolution: program path to registry location.
//!
//! All functions here are pure; nothing touches the filesystem.

use crate::config::{LayoutConfig, ServiceLockConfig};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Lowercase hex SHA-256 of `input`.
pub fn content_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable identity of one logical program instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn from_program_path(program_path: &str) -> Self {
        Identity(content_digest(program_path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps program paths to registry locations under a fixed configuration root.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    config: ServiceLockConfig,
}

impl IdentityResolver {
    pub fn new(config: ServiceLockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceLockConfig {
        &self.config
    }

    pub fn resolve(&self, program_path: &str) -> Identity {
        Identity::from_program_path(program_path)
    }

    /// Registry location: `<root>/<namespace>/sites/<digest>`.
    pub fn location(&self, program_path: &str) -> PathBuf {
        self.config
            .sites_dir()
            .join(self.resolve(program_path).as_str())
    }

    /// Service slot directory: `<location>/<name>.lock`.
    pub fn slot_path(&self, program_path: &str, name: &str) -> PathBuf {
        self.location(program_path).join(slot_dir_name(name))
    }

    /// Published record file: `<location>/<name>.lock/data`.
    pub fn record_path(&self, program_path: &str, name: &str) -> PathBuf {
        self.slot_path(program_path, name)
            .join(LayoutConfig::RECORD_FILE_NAME)
    }
}

pub(crate) fn slot_dir_name(name: &str) -> String {
    format!("{}{}", name, LayoutConfig::SLOT_SUFFIX)
}

/// Recover a service name from a slot directory name.
pub(crate) fn service_name_from_slot(entry: &str) -> Option<&str> {
    entry
        .strip_suffix(LayoutConfig::SLOT_SUFFIX)
        .filter(|name| !name.is_empty())
}
