//! In-memory session storage handler.

use crate::error::SessionResult;
use crate::handler::{SessionHandler, validate_id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory session handler.
///
/// Entries live for the lifetime of the process; clones share the
/// same underlying map, so one handler can back several storage
/// instances (e.g. consecutive requests in tests).
#[derive(Clone, Default)]
pub struct MemoryHandler {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

#[derive(Clone)]
struct MemoryEntry {
    data: String,
    written_at: Instant,
}

impl MemoryHandler {
    /// Create an empty in-memory handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored session records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the handler holds no records.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionHandler for MemoryHandler {
    async fn open(&self, _save_path: &str, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> SessionResult<String> {
        validate_id(id)?;

        let entries = self.entries.read().await;
        Ok(entries
            .get(id)
            .map(|entry| entry.data.clone())
            .unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &str) -> SessionResult<()> {
        validate_id(id)?;

        self.entries.write().await.insert(
            id.to_string(),
            MemoryEntry {
                data: data.to_string(),
                written_at: Instant::now(),
            },
        );

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        validate_id(id)?;

        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| entry.written_at.elapsed() <= max_lifetime);

        Ok(before - entries.len())
    }
}
