//! Memcached session storage handler.
//!
//! This module requires the `memcached` feature flag.

use crate::error::{SessionError, SessionResult};
use crate::handler::{SessionHandler, validate_id};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Memcached-backed session handler.
///
/// Keys are namespaced with a caller-supplied prefix; expiry is
/// managed by the server from the time-to-live passed on each write,
/// so [`SessionHandler::gc`] is a no-op.
#[derive(Clone)]
pub struct MemcachedHandler {
    client: Arc<Mutex<memcache::Client>>,
    prefix: String,
    ttl: Duration,
}

impl MemcachedHandler {
    /// Connect to Memcached and create a handler with the default
    /// prefix (`"tessera:"`) and a 15 minute time-to-live.
    pub async fn new(url: &str) -> SessionResult<Self> {
        if !url.starts_with("memcache://") {
            return Err(SessionError::Config(
                "Memcached URL must start with memcache://".to_string(),
            ));
        }

        let client = memcache::connect(url)
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            prefix: "tessera:".to_string(),
            ttl: Duration::from_secs(900),
        })
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the record time-to-live. A zero duration stores records
    /// without expiry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }
}

#[async_trait]
impl SessionHandler for MemcachedHandler {
    async fn open(&self, _save_path: &str, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> SessionResult<String> {
        validate_id(id)?;

        let client = self.client.lock().await;
        let data: Option<String> = client.get(&self.key(id))?;

        Ok(data.unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &str) -> SessionResult<()> {
        validate_id(id)?;

        let client = self.client.lock().await;
        client.set(&self.key(id), data, self.ttl.as_secs() as u32)?;

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        validate_id(id)?;

        let client = self.client.lock().await;

        // Deleting a missing key reports false, which is fine
        let _ = client.delete(&self.key(id))?;

        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> SessionResult<usize> {
        // Memcached manages expiry on its own
        Ok(0)
    }
}
