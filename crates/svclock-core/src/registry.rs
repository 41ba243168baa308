//! Service registry: per-service exclusivity and metadata discovery.
//!
//! Layout under a registry location:
//!
//! ```text
//! <root>/<namespace>/sites/<digest>/
//!     proxy.lock/
//!         .holder     lock file, holds the pid of the current holder
//!         data        published record
//!     socket.lock/
//!         ...
//! ```
//!
//! Exclusivity is per service slot. Records are opaque strings and outlive
//! the hold that published them.

use crate::config::{LayoutConfig, ServiceLockConfig};
use crate::error::{Result, SvcLockError};
use crate::identity::{self, IdentityResolver};
use crate::lock::SlotLock;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Published records by service name. `None` marks a slot without a readable record.
pub type ServiceMap = BTreeMap<String, Option<String>>;

/// Exclusive ownership of one service slot.
///
/// Dropping the hold releases the slot. Use [`ServiceHold::hold_for_process`]
/// to keep it until the process exits.
#[derive(Debug)]
pub struct ServiceHold {
    name: String,
    slot_path: PathBuf,
    lock: SlotLock,
}

impl ServiceHold {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_path(&self) -> &Path {
        &self.slot_path
    }

    pub fn record_path(&self) -> PathBuf {
        self.slot_path.join(LayoutConfig::RECORD_FILE_NAME)
    }

    /// Overwrite the published record while still holding the slot.
    pub async fn publish(&self, content: &str) -> Result<()> {
        let record_path = self.record_path();
        debug!("Writing service record {}", record_path.display());
        tokio::fs::write(&record_path, content)
            .await
            .map_err(|e| SvcLockError::io_with_path(e, &record_path))
    }

    /// Release the slot. The published record stays readable.
    pub fn release(self) -> Result<()> {
        debug!("Releasing service slot {}", self.name);
        self.lock.release()
    }

    /// Keep the slot locked until the process exits.
    pub fn hold_for_process(self) {
        self.lock.hold_for_process();
    }
}

/// Filesystem-backed registry of named services for program identities.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    resolver: IdentityResolver,
}

impl ServiceRegistry {
    pub fn new(config: ServiceLockConfig) -> Self {
        Self {
            resolver: IdentityResolver::new(config),
        }
    }

    /// Registry rooted at the per-user configuration directory.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ServiceLockConfig::from_env()?))
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Try to take exclusive ownership of `name` and publish `content` into it.
    ///
    /// Returns `Ok(None)` when another process already holds the slot; nothing
    /// is written in that case. A failure to write the record after the slot
    /// was acquired is returned as an error and the slot is released.
    pub async fn acquire_and_publish(
        &self,
        program_path: &str,
        name: &str,
        content: &str,
    ) -> Result<Option<ServiceHold>> {
        validate_service_name(name)?;

        let slot_path = self.resolver.slot_path(program_path, name);
        debug!("Acquiring service slot {}", slot_path.display());

        // create_dir_all tolerates concurrent creators.
        tokio::fs::create_dir_all(&slot_path)
            .await
            .map_err(|e| SvcLockError::io_with_path(e, &slot_path))?;

        let Some(lock) = SlotLock::try_acquire(slot_path.clone()).await? else {
            debug!("Service {} is already held for {}", name, program_path);
            return Ok(None);
        };

        let hold = ServiceHold {
            name: name.to_string(),
            slot_path,
            lock,
        };
        hold.publish(content).await?;

        Ok(Some(hold))
    }

    /// Read the record published for `name`.
    ///
    /// Missing, unreadable and invalidly named records all yield `None`.
    pub async fn lookup(&self, program_path: &str, name: &str) -> Option<String> {
        if validate_service_name(name).is_err() {
            return None;
        }
        read_record(&self.resolver.record_path(program_path, name)).await
    }

    /// Read every published service under `program_path`.
    ///
    /// Fails with [`SvcLockError::RegistryNotFound`] when no service was ever
    /// registered for this identity.
    pub async fn list_all(&self, program_path: &str) -> Result<ServiceMap> {
        let location = self.resolver.location(program_path);
        let names = slot_names(&location).await?;

        let records = join_all(names.iter().map(|name| {
            let record_path = location
                .join(identity::slot_dir_name(name))
                .join(LayoutConfig::RECORD_FILE_NAME);
            async move { read_record(&record_path).await }
        }))
        .await;

        Ok(names.into_iter().zip(records).collect())
    }

    /// Pid recorded by the current or most recent holder of `name`.
    ///
    /// Stale after a holder exits without [`ServiceHold::release`]; see
    /// [`SlotLock::holder_pid`].
    pub async fn holder_pid(&self, program_path: &str, name: &str) -> Option<u32> {
        if validate_service_name(name).is_err() {
            return None;
        }
        SlotLock::holder_pid(self.resolver.slot_path(program_path, name)).await
    }
}

async fn read_record(record_path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(record_path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("No service record at {}: {}", record_path.display(), e);
            None
        }
    }
}

async fn slot_names(location: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(location).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SvcLockError::RegistryNotFound {
                path: location.to_path_buf(),
            });
        }
        Err(e) => return Err(SvcLockError::io_with_path(e, location)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SvcLockError::io_with_path(e, location))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(identity::service_name_from_slot) else {
            continue;
        };
        match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => names.push(name.to_string()),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    Ok(names)
}

/// Check that `name` maps to exactly one slot directory.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SvcLockError::invalid_name(name, "must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(SvcLockError::invalid_name(name, "must not be a relative path"));
    }
    if name.contains(['/', '\\']) {
        return Err(SvcLockError::invalid_name(
            name,
            "must not contain a path separator",
        ));
    }
    if name.ends_with(LayoutConfig::SLOT_SUFFIX) {
        return Err(SvcLockError::invalid_name(
            name,
            format!("must not end with {}", LayoutConfig::SLOT_SUFFIX),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SITE: &str = "/srv/site";

    fn registry(dir: &TempDir) -> ServiceRegistry {
        ServiceRegistry::new(ServiceLockConfig::new(dir.path()))
    }

    #[tokio::test]
    async fn test_publish_then_lookup() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let hold = registry
            .acquire_and_publish(SITE, "proxy", "9000")
            .await
            .unwrap()
            .expect("slot should be free");

        assert_eq!(hold.name(), "proxy");
        assert!(hold.record_path().ends_with("proxy.lock/data"));
        assert_eq!(registry.lookup(SITE, "proxy").await.as_deref(), Some("9000"));
    }

    #[tokio::test]
    async fn test_contended_slot_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let _hold = registry
            .acquire_and_publish(SITE, "proxy", "9000")
            .await
            .unwrap()
            .unwrap();
        let second = registry
            .acquire_and_publish(SITE, "proxy", "9001")
            .await
            .unwrap();

        assert!(second.is_none());
        assert_eq!(registry.lookup(SITE, "proxy").await.as_deref(), Some("9000"));
    }

    #[tokio::test]
    async fn test_hold_publish_overwrites() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let hold = registry
            .acquire_and_publish(SITE, "develop", r#"{"port":8000}"#)
            .await
            .unwrap()
            .unwrap();
        hold.publish("{}").await.unwrap();

        assert_eq!(registry.lookup(SITE, "develop").await.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_record_survives_release() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let hold = registry
            .acquire_and_publish(SITE, "socket", "9090")
            .await
            .unwrap()
            .unwrap();
        hold.release().unwrap();

        assert_eq!(registry.holder_pid(SITE, "socket").await, None);
        assert_eq!(registry.lookup(SITE, "socket").await.as_deref(), Some("9090"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_cause_contention() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let registry = registry.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                while !stop.load(Ordering::Relaxed) {
                    let _ = registry.holder_pid(SITE, "proxy").await;
                    let _ = registry.lookup(SITE, "proxy").await;
                    let _ = registry.list_all(SITE).await;
                }
            })
        };

        let mut contended = 0;
        for i in 0..500 {
            match registry
                .acquire_and_publish(SITE, "proxy", &i.to_string())
                .await
                .unwrap()
            {
                Some(hold) => hold.release().unwrap(),
                None => contended += 1,
            }
        }

        stop.store(true, Ordering::Relaxed);
        reader.await.unwrap();
        assert_eq!(contended, 0, "free slot reported as held");
    }

    #[tokio::test]
    async fn test_list_all_skips_non_slot_entries() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let _hold = registry
            .acquire_and_publish(SITE, "proxy", "9000")
            .await
            .unwrap()
            .unwrap();

        let location = registry.resolver().location(SITE);
        std::fs::write(location.join("stray.lock"), "not a slot").unwrap();
        std::fs::create_dir(location.join("notes")).unwrap();
        std::fs::create_dir(location.join("empty.lock")).unwrap();

        let services = registry.list_all(SITE).await.unwrap();
        let expected: ServiceMap = [
            ("empty".to_string(), None),
            ("proxy".to_string(), Some("9000".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(services, expected);
    }

    #[tokio::test]
    async fn test_list_all_unknown_identity_fails() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let err = registry.list_all("/never/used").await.unwrap_err();
        assert!(err.is_registry_not_found());
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        for name in ["", ".", "..", "a/b", "a\\b", "proxy.lock"] {
            let err = registry
                .acquire_and_publish(SITE, name, "x")
                .await
                .unwrap_err();
            assert!(
                matches!(err, SvcLockError::InvalidServiceName { .. }),
                "{name:?} should be rejected"
            );
            assert_eq!(registry.lookup(SITE, name).await, None);
        }
    }

    #[test]
    fn test_validate_accepts_dotted_names() {
        assert!(validate_service_name("proxy").is_ok());
        assert!(validate_service_name("web.socket").is_ok());
    }
}
