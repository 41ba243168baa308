//! svclock - filesystem-mediated service discovery for sibling processes.
//!
//! Processes that belong to one logical program instance (a supervisor and
//! the workers it spawns) share a registry location derived from a program
//! path. Each named service inside it can be held by at most one process at a
//! time, and its holder publishes an opaque record (typically a port, as JSON)
//! that any process can read back.
//!
//! # Example
//!
//! ```rust,ignore
//! use svclock::ServiceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> svclock::Result<()> {
//!     let registry = ServiceRegistry::from_env()?;
//!
//!     match registry
//!         .acquire_and_publish("/srv/site", "proxy", r#"{"port":9000}"#)
//!         .await?
//!     {
//!         Some(hold) => hold.hold_for_process(),
//!         None => println!("another instance is already running"),
//!     }
//!
//!     let services = registry.list_all("/srv/site").await?;
//!     println!("{services:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod lock;
pub mod registry;

pub use config::{LayoutConfig, ServiceLockConfig};
pub use error::{Result, SvcLockError};
pub use identity::{content_digest, Identity, IdentityResolver};
pub use lock::SlotLock;
pub use registry::{validate_service_name, ServiceHold, ServiceMap, ServiceRegistry};
