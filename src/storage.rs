//! Namespaced session storage over a raw persistence handler.

use crate::error::{SessionError, SessionResult};
use crate::handler::SessionHandler;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Generate a new unique session ID.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Contract for a session store: a structured, namespaced variable
/// store owning session identity and lifecycle flags.
///
/// `set` and `remove` return the previous value (or `None`) for the
/// key, enabling compare-and-swap style call sites.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The session ID.
    fn id(&self) -> &str;

    /// Replace the session ID. Only meaningful before [`start`](Storage::start).
    fn set_id(&mut self, id: &str);

    /// The session name.
    fn name(&self) -> &str;

    /// Replace the session name.
    fn set_name(&mut self, name: &str);

    /// Whether the store has been started through this handle.
    fn is_started(&self) -> bool;

    /// Whether the underlying session engine reports an active session.
    fn is_active(&self) -> bool;

    /// Start the session, loading persisted data from the handler.
    /// Idempotent.
    async fn start(&mut self) -> SessionResult<()>;

    /// Flush the variable store to the handler and release it.
    async fn close(&mut self) -> SessionResult<()>;

    /// Regenerate the session ID, optionally destroying the old
    /// backing record (otherwise it is left to garbage collection).
    async fn regenerate(&mut self, destroy: bool) -> SessionResult<()>;

    /// Get a value, starting the store first if necessary.
    async fn get(&mut self, name: &str, namespace: &str) -> SessionResult<Option<Value>>;

    /// Set a value, returning the previous one.
    async fn set(&mut self, name: &str, value: Value, namespace: &str)
    -> SessionResult<Option<Value>>;

    /// Whether a value exists.
    async fn has(&mut self, name: &str, namespace: &str) -> SessionResult<bool>;

    /// Remove a value, returning the previous one.
    async fn remove(&mut self, name: &str, namespace: &str) -> SessionResult<Option<Value>>;

    /// Replace one namespace with an empty mapping; other namespaces
    /// are untouched.
    async fn clear(&mut self, namespace: &str) -> SessionResult<()>;

    /// All variables in one namespace.
    async fn all(&mut self, namespace: &str) -> SessionResult<HashMap<String, Value>>;

    /// Snapshot of every namespace.
    async fn all_namespaces(&mut self)
    -> SessionResult<HashMap<String, HashMap<String, Value>>>;

    /// Drop every namespace.
    async fn clear_all(&mut self) -> SessionResult<()>;
}

/// Session store bridging a [`SessionHandler`]'s raw string contract
/// to a namespaced variable store.
///
/// The persisted blob is the JSON encoding of the namespace map.
/// Accessors lazily start the store; `start` is idempotent.
///
/// # Examples
///
/// ```
/// use tessera_session::{MemoryHandler, NativeStorage, Storage};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut store = NativeStorage::new(MemoryHandler::new());
///
/// let previous = store.set("user", json!("alice"), "auth").await?;
/// assert!(previous.is_none());
/// assert_eq!(store.get("user", "auth").await?, Some(json!("alice")));
///
/// store.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct NativeStorage<H: SessionHandler> {
    handler: H,
    id: String,
    name: String,
    save_path: String,
    started: bool,
    active: bool,
    data: HashMap<String, HashMap<String, Value>>,
}

impl<H: SessionHandler> NativeStorage<H> {
    /// Create a store over a handler with a fresh session ID and the
    /// default session name.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            id: generate_session_id(),
            name: "tessera_session".to_string(),
            save_path: String::new(),
            started: false,
            active: false,
            data: HashMap::new(),
        }
    }

    /// Resume an existing session ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the session name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the save path handed to the handler on open.
    pub fn with_save_path(mut self, save_path: impl Into<String>) -> Self {
        self.save_path = save_path.into();
        self
    }

    /// The handler backing this store.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn decode(blob: &str) -> SessionResult<HashMap<String, HashMap<String, Value>>> {
        if blob.is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(blob).map_err(|e| SessionError::Deserialization(e.to_string()))
    }

    fn encode(&self) -> SessionResult<String> {
        serde_json::to_string(&self.data).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    async fn ensure_started(&mut self) -> SessionResult<()> {
        if !self.started {
            self.start().await?;
        }

        Ok(())
    }
}

#[async_trait]
impl<H: SessionHandler> Storage for NativeStorage<H> {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn is_active(&self) -> bool {
        self.active
    }

    /// Start the session.
    ///
    /// Fails with a lifecycle fault when the store is active without
    /// having been started through this handle (the underlying
    /// session was opened by another code path). Whether response
    /// headers can still be written is the embedding server's check
    /// to make before calling this.
    async fn start(&mut self) -> SessionResult<()> {
        if self.started {
            return Ok(());
        }

        if self.active {
            return Err(SessionError::Lifecycle(
                "Failed to start the session: already active".to_string(),
            ));
        }

        self.handler.open(&self.save_path, &self.id).await?;

        let blob = self.handler.read(&self.id).await?;
        self.data = Self::decode(&blob)?;

        self.active = true;
        self.started = true;

        debug!(id = %self.id, "session storage started");

        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        if !self.started {
            return Ok(());
        }

        let blob = self.encode()?;
        self.handler.write(&self.id, &blob).await?;
        self.handler.close().await?;

        self.started = false;
        self.active = false;

        debug!(id = %self.id, "session storage closed");

        Ok(())
    }

    async fn regenerate(&mut self, destroy: bool) -> SessionResult<()> {
        let old_id = std::mem::replace(&mut self.id, generate_session_id());

        if destroy {
            self.handler.destroy(&old_id).await?;
        }

        if self.started {
            let blob = self.encode()?;
            self.handler.write(&self.id, &blob).await?;
        }

        debug!(old_id = %old_id, id = %self.id, destroy, "session id regenerated");

        Ok(())
    }

    async fn get(&mut self, name: &str, namespace: &str) -> SessionResult<Option<Value>> {
        self.ensure_started().await?;

        Ok(self
            .data
            .get(namespace)
            .and_then(|vars| vars.get(name))
            .cloned())
    }

    async fn set(
        &mut self,
        name: &str,
        value: Value,
        namespace: &str,
    ) -> SessionResult<Option<Value>> {
        self.ensure_started().await?;

        Ok(self
            .data
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), value))
    }

    async fn has(&mut self, name: &str, namespace: &str) -> SessionResult<bool> {
        self.ensure_started().await?;

        Ok(self
            .data
            .get(namespace)
            .is_some_and(|vars| vars.contains_key(name)))
    }

    async fn remove(&mut self, name: &str, namespace: &str) -> SessionResult<Option<Value>> {
        self.ensure_started().await?;

        Ok(self
            .data
            .get_mut(namespace)
            .and_then(|vars| vars.remove(name)))
    }

    async fn clear(&mut self, namespace: &str) -> SessionResult<()> {
        self.ensure_started().await?;

        self.data.insert(namespace.to_string(), HashMap::new());
        Ok(())
    }

    async fn all(&mut self, namespace: &str) -> SessionResult<HashMap<String, Value>> {
        self.ensure_started().await?;

        Ok(self.data.get(namespace).cloned().unwrap_or_default())
    }

    async fn all_namespaces(
        &mut self,
    ) -> SessionResult<HashMap<String, HashMap<String, Value>>> {
        self.ensure_started().await?;

        Ok(self.data.clone())
    }

    async fn clear_all(&mut self) -> SessionResult<()> {
        self.ensure_started().await?;

        self.data.clear();
        Ok(())
    }
}
