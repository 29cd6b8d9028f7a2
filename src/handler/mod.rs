//! Storage handler contract and registry.
//!
//! A handler is the backend-specific adapter performing raw
//! persistence of a session's serialized blob. Each variant
//! implements the same capability set with no shared logic beyond
//! the contract; failures surface as a [`SessionError`], never as
//! silently dropped data.

use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

pub mod filesystem;
pub mod memory;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "memcached")]
pub mod memcached;

#[cfg(feature = "redis")]
pub mod redis;

pub use filesystem::FilesystemHandler;
pub use memory::MemoryHandler;

#[cfg(feature = "database")]
pub use database::DatabaseHandler;

#[cfg(feature = "memcached")]
pub use memcached::MemcachedHandler;

#[cfg(feature = "redis")]
pub use self::redis::RedisHandler;

/// Capability contract for session persistence backends.
///
/// The storage layer serializes the namespace map to a string blob
/// and hands it to a handler keyed by session ID; the handler never
/// interprets the blob.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Prepare the handler for a session.
    ///
    /// `save_path` is only meaningful for path-based backends and is
    /// ignored by the others.
    async fn open(&self, save_path: &str, id: &str) -> SessionResult<()>;

    /// Release any resources tied to the current session.
    async fn close(&self) -> SessionResult<()>;

    /// Read the serialized blob for a session.
    ///
    /// Returns the empty string when no record exists; a missing
    /// record and an empty one are not distinguished.
    async fn read(&self, id: &str) -> SessionResult<String>;

    /// Write the serialized blob for a session.
    async fn write(&self, id: &str, data: &str) -> SessionResult<()>;

    /// Delete the backing record for a session.
    ///
    /// Deleting a record that does not exist is a success.
    async fn destroy(&self, id: &str) -> SessionResult<()>;

    /// Reap records that have not been written for longer than
    /// `max_lifetime`. Returns the number of records removed.
    ///
    /// Backends with native expiry return `Ok(0)` and rely on their
    /// own reaping.
    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize>;

    /// Probe whether this handler variant can be used in the current
    /// build/environment. Must be side-effect-free and callable
    /// before construction.
    fn is_supported() -> bool
    where
        Self: Sized,
    {
        true
    }
}

/// Explicit registry of handler variants, keyed by name.
///
/// Each entry carries a capability probe; callers enumerate the
/// supported subset and pick a handler themselves. Nothing is
/// selected automatically.
///
/// # Examples
///
/// ```
/// use tessera_session::HandlerRegistry;
///
/// let registry = HandlerRegistry::with_builtin();
/// assert!(registry.supported().contains(&"filesystem"));
/// ```
pub struct HandlerRegistry {
    probes: BTreeMap<&'static str, fn() -> bool>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            probes: BTreeMap::new(),
        }
    }

    /// Create a registry populated with the compiled-in handlers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();

        registry.register("filesystem", FilesystemHandler::is_supported);
        registry.register("memory", MemoryHandler::is_supported);

        #[cfg(feature = "database")]
        registry.register("database", DatabaseHandler::is_supported);

        #[cfg(feature = "memcached")]
        registry.register("memcached", MemcachedHandler::is_supported);

        #[cfg(feature = "redis")]
        registry.register("redis", RedisHandler::is_supported);

        registry
    }

    /// Register a handler probe under a name.
    pub fn register(&mut self, name: &'static str, probe: fn() -> bool) {
        self.probes.insert(name, probe);
    }

    /// All registered handler names.
    pub fn names(&self) -> Vec<&'static str> {
        self.probes.keys().copied().collect()
    }

    /// Names of the handlers whose capability probe passes.
    pub fn supported(&self) -> Vec<&'static str> {
        self.probes
            .iter()
            .filter(|(_, probe)| probe())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Whether a handler is registered under this name.
    pub fn contains(&self, name: &str) -> bool {
        self.probes.contains_key(name)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Reject session IDs that could escape a path- or key-based store.
pub(crate) fn validate_id(id: &str) -> SessionResult<()> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.contains('\0')
    {
        return Err(SessionError::Handler(format!("Invalid session ID: {id:?}")));
    }

    Ok(())
}
