//! Session state machine and policy layer.

use crate::config::{CookieParams, SecurityCheck, SessionOptions};
use crate::error::{SessionError, SessionResult};
use crate::events::{SessionEvent, SessionObserver};
use crate::input::ClientInput;
use crate::storage::Storage;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Namespace used when the caller does not pick one, and home of the
/// reserved bookkeeping keys.
pub const DEFAULT_NAMESPACE: &str = "default";

const COUNTER_KEY: &str = "session.counter";
const TIMER_START_KEY: &str = "session.timer.start";
const TIMER_LAST_KEY: &str = "session.timer.last";
const TIMER_NOW_KEY: &str = "session.timer.now";
const CLIENT_ADDRESS_KEY: &str = "session.client.address";
const CLIENT_FORWARDED_KEY: &str = "session.client.forwarded";
const CLIENT_BROWSER_KEY: &str = "session.client.browser";

/// Bookkeeping keys in the default namespace, written only by the
/// session's own lifecycle methods.
const RESERVED_KEYS: [&str; 7] = [
    COUNTER_KEY,
    TIMER_START_KEY,
    TIMER_LAST_KEY,
    TIMER_NOW_KEY,
    CLIENT_ADDRESS_KEY,
    CLIENT_FORWARDED_KEY,
    CLIENT_BROWSER_KEY,
];

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, before the first start
    Inactive,
    /// Started and validated
    Active,
    /// Validation found the session past its expiry window
    Expired,
    /// Destroyed; namespaces cleared and identity revoked
    Destroyed,
    /// Closed; data flushed to the handler
    Closed,
    /// A security check rejected the session
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            SessionState::Inactive => "inactive",
            SessionState::Active => "active",
            SessionState::Expired => "expired",
            SessionState::Destroyed => "destroyed",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        };

        f.write_str(state)
    }
}

/// Session manager: owns expiry policy, fixation checks,
/// counter/timer bookkeeping and lifecycle orchestration over an
/// injected [`Storage`].
///
/// Validation failures are not errors: `start` leaves the session in
/// the [`Expired`](SessionState::Expired) or
/// [`Error`](SessionState::Error) state and callers inspect
/// [`state`](Session::state) and react, typically by forcing a
/// [`restart`](Session::restart).
///
/// # Examples
///
/// ```
/// use tessera_session::{ClientInput, MemoryHandler, NativeStorage, Session, SessionOptions, SessionState};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = SessionOptions::new()
///     .with_expire(15)
///     .with_security("fix_address")?;
///
/// let store = NativeStorage::new(MemoryHandler::new());
/// let mut session = Session::new(store, options)
///     .with_client_input(ClientInput::new().with_remote_addr("203.0.113.7"));
///
/// session.start().await?;
/// assert_eq!(session.state(), SessionState::Active);
///
/// session.set("cart", vec!["item1"], "shop").await?;
/// let cart: Option<Vec<String>> = session.get("cart", "shop").await?;
/// assert_eq!(cart, Some(vec!["item1".to_string()]));
///
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<S: Storage> {
    store: S,
    state: SessionState,
    prefix: String,
    expire: Duration,
    security: Vec<SecurityCheck>,
    force_ssl: bool,
    cookie_domain: Option<String>,
    cookie_path: Option<String>,
    input: ClientInput,
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl<S: Storage> Session<S> {
    /// Create a session over a store.
    ///
    /// The expiry option is given in minutes and converted to seconds
    /// here, once; every later comparison is in seconds.
    pub fn new(mut store: S, options: SessionOptions) -> Self {
        if let Some(name) = &options.name {
            store.set_name(name);
        }

        if let Some(id) = &options.id {
            store.set_id(id);
        }

        Self {
            store,
            state: SessionState::Inactive,
            prefix: options.prefix,
            expire: Duration::from_secs(options.expire * 60),
            security: options.security,
            force_ssl: options.force_ssl,
            cookie_domain: options.cookie_domain,
            cookie_path: options.cookie_path,
            input: ClientInput::default(),
            observers: Vec::new(),
        }
    }

    /// Set the client request facts used by validation.
    pub fn with_client_input(mut self, input: ClientInput) -> Self {
        self.input = input;
        self
    }

    /// Replace the client request facts (e.g. on a new request).
    pub fn set_client_input(&mut self, input: ClientInput) {
        self.input = input;
    }

    /// Register a lifecycle observer.
    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session expiry window; zero means no expiry.
    pub fn expire(&self) -> Duration {
        self.expire
    }

    /// The session ID.
    pub fn id(&self) -> &str {
        self.store.id()
    }

    /// Replace the session ID.
    pub fn set_id(&mut self, id: &str) {
        self.store.set_id(id);
    }

    /// The session name.
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Replace the session name.
    pub fn set_name(&mut self, name: &str) {
        self.store.set_name(name);
    }

    /// Whether the session is active: requires both the `Active`
    /// state and a live store.
    pub fn is_active(&self) -> bool {
        if self.state == SessionState::Active {
            return self.store.is_active();
        }

        false
    }

    /// Whether the store has been started.
    pub fn is_started(&self) -> bool {
        self.store.is_started()
    }

    /// Whether this is the first start of the session (usage counter
    /// is exactly one).
    pub async fn is_new(&mut self) -> SessionResult<bool> {
        let counter: Option<u64> = self.get(COUNTER_KEY, DEFAULT_NAMESPACE).await?;
        Ok(counter == Some(1))
    }

    /// Parameters for the cookie carrying the session identity.
    /// `secure` is forced when the session forces SSL; `http_only`
    /// is always set.
    pub fn cookie_params(&self) -> CookieParams {
        CookieParams {
            name: self.store.name().to_string(),
            value: self.store.id().to_string(),
            domain: self.cookie_domain.clone(),
            path: self.cookie_path.clone(),
            secure: self.force_ssl,
            http_only: true,
        }
    }

    /// Get a value from a namespace.
    pub async fn get<T: DeserializeOwned>(
        &mut self,
        name: &str,
        namespace: &str,
    ) -> SessionResult<Option<T>> {
        let namespace = self.prefixed(namespace);

        Ok(self
            .store
            .get(name, &namespace)
            .await?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    /// Set a value in a namespace, returning the previous raw value.
    pub async fn set<T: Serialize>(
        &mut self,
        name: &str,
        value: T,
        namespace: &str,
    ) -> SessionResult<Option<Value>> {
        let namespace = self.prefixed(namespace);
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;

        self.store.set(name, value, &namespace).await
    }

    /// Whether a value exists in a namespace.
    pub async fn has(&mut self, name: &str, namespace: &str) -> SessionResult<bool> {
        let namespace = self.prefixed(namespace);
        self.store.has(name, &namespace).await
    }

    /// Remove a value from a namespace, returning the previous value.
    pub async fn remove(&mut self, name: &str, namespace: &str) -> SessionResult<Option<Value>> {
        let namespace = self.prefixed(namespace);
        self.store.remove(name, &namespace).await
    }

    /// Clear one namespace; other namespaces are untouched.
    pub async fn clear(&mut self, namespace: &str) -> SessionResult<()> {
        let namespace = self.prefixed(namespace);
        self.store.clear(&namespace).await
    }

    /// All variables in a namespace.
    pub async fn all(&mut self, namespace: &str) -> SessionResult<HashMap<String, Value>> {
        let namespace = self.prefixed(namespace);
        self.store.all(&namespace).await
    }

    /// Start the session.
    ///
    /// No-op when the store is already started. Otherwise starts the
    /// store, bumps the usage counter, updates the timers and runs
    /// validation; validation failures leave the session in the
    /// `Expired` or `Error` state rather than returning an error.
    pub async fn start(&mut self) -> SessionResult<()> {
        if self.store.is_started() {
            return Ok(());
        }

        self.store.start().await?;
        self.state = SessionState::Active;

        self.set_counter().await?;
        self.set_timers().await?;
        self.validate(false).await?;

        debug!(id = %self.store.id(), state = %self.state, "session started");

        self.notify(SessionEvent::Started);

        Ok(())
    }

    /// Destroy the session: clear every namespace, revoke the
    /// identity and delete the backing record.
    ///
    /// Destroying an already-destroyed session is a no-op success.
    pub async fn destroy(&mut self) -> SessionResult<()> {
        if self.state == SessionState::Destroyed {
            return Ok(());
        }

        self.store.clear_all().await?;

        // Fork refuses outside the active state; the old record is
        // then left to garbage collection, as before.
        match self.fork(true).await {
            Ok(()) | Err(SessionError::Lifecycle(_)) => {}
            Err(e) => return Err(e),
        }

        self.state = SessionState::Destroyed;

        debug!(id = %self.store.id(), "session destroyed");

        Ok(())
    }

    /// Restart an expired or rejected session: destroy it, start a
    /// fresh cycle and replay the previous application data under the
    /// new identity.
    pub async fn restart(&mut self) -> SessionResult<()> {
        let snapshot = self.store.all_namespaces().await?;

        self.destroy().await?;

        if self.state != SessionState::Destroyed {
            return Err(SessionError::Lifecycle(
                "Session could not be destroyed for restart".to_string(),
            ));
        }

        self.store.start().await?;

        self.set_counter().await?;
        self.set_timers().await?;
        self.validate(true).await?;

        // Replay application data; bookkeeping keys were reseeded
        // above and stay fresh.
        let default_namespace = self.prefixed(DEFAULT_NAMESPACE);

        for (namespace, vars) in snapshot {
            for (name, value) in vars {
                if namespace == default_namespace && RESERVED_KEYS.contains(&name.as_str()) {
                    continue;
                }

                self.store.set(&name, value, &namespace).await?;
            }
        }

        debug!(id = %self.store.id(), "session restarted");

        self.notify(SessionEvent::Restarted);

        Ok(())
    }

    /// Regenerate the session identity, optionally discarding the old
    /// backing record. Fails unless the session is active.
    pub async fn fork(&mut self, destroy_old: bool) -> SessionResult<()> {
        if self.state != SessionState::Active {
            return Err(SessionError::Lifecycle(format!(
                "Cannot fork a session in state '{}'",
                self.state
            )));
        }

        self.store.regenerate(destroy_old).await?;

        if destroy_old {
            self.set_counter().await?;
            self.set_timers().await?;
        }

        Ok(())
    }

    /// Write session data through the handler and end the session.
    pub async fn close(&mut self) -> SessionResult<()> {
        self.store.close().await?;
        self.state = SessionState::Closed;

        Ok(())
    }

    fn prefixed(&self, namespace: &str) -> String {
        format!("{}{namespace}", self.prefix)
    }

    async fn set_counter(&mut self) -> SessionResult<()> {
        let counter: u64 = self
            .get(COUNTER_KEY, DEFAULT_NAMESPACE)
            .await?
            .unwrap_or(0);

        self.set(COUNTER_KEY, counter + 1, DEFAULT_NAMESPACE)
            .await?;

        Ok(())
    }

    async fn set_timers(&mut self) -> SessionResult<()> {
        let now = Utc::now().timestamp();

        if !self.has(TIMER_START_KEY, DEFAULT_NAMESPACE).await? {
            self.set(TIMER_START_KEY, now, DEFAULT_NAMESPACE).await?;
            self.set(TIMER_LAST_KEY, now, DEFAULT_NAMESPACE).await?;
            self.set(TIMER_NOW_KEY, now, DEFAULT_NAMESPACE).await?;
        }

        let last: i64 = self
            .get(TIMER_NOW_KEY, DEFAULT_NAMESPACE)
            .await?
            .unwrap_or(now);

        self.set(TIMER_LAST_KEY, last, DEFAULT_NAMESPACE).await?;
        self.set(TIMER_NOW_KEY, now, DEFAULT_NAMESPACE).await?;

        Ok(())
    }

    /// Run the security checks.
    ///
    /// Returns `Ok(false)` and downgrades the state when a check
    /// fails; I/O faults are the only errors.
    async fn validate(&mut self, restart: bool) -> SessionResult<bool> {
        if restart {
            self.state = SessionState::Active;

            self.remove(CLIENT_ADDRESS_KEY, DEFAULT_NAMESPACE).await?;
            self.remove(CLIENT_FORWARDED_KEY, DEFAULT_NAMESPACE).await?;
            self.remove(CLIENT_BROWSER_KEY, DEFAULT_NAMESPACE).await?;
        }

        // Timeout check; timers are unix seconds, expire was
        // converted from minutes at construction
        if self.expire > Duration::ZERO {
            let current: i64 = self
                .get(TIMER_NOW_KEY, DEFAULT_NAMESPACE)
                .await?
                .unwrap_or(0);

            let last: i64 = self
                .get(TIMER_LAST_KEY, DEFAULT_NAMESPACE)
                .await?
                .unwrap_or(0);

            if last + (self.expire.as_secs() as i64) < current {
                self.state = SessionState::Expired;
                warn!(id = %self.store.id(), "session expired");

                return Ok(false);
            }
        }

        // Record the forwarded address in case it is needed later;
        // informational only, never a security check
        if let Some(forwarded) = self.input.forwarded_for.clone() {
            self.set(CLIENT_FORWARDED_KEY, forwarded, DEFAULT_NAMESPACE)
                .await?;
        }

        if self.security.contains(&SecurityCheck::FixAddress) {
            if let Some(addr) = self.input.remote_addr.clone() {
                let known: Option<String> =
                    self.get(CLIENT_ADDRESS_KEY, DEFAULT_NAMESPACE).await?;

                match known {
                    None => {
                        self.set(CLIENT_ADDRESS_KEY, addr, DEFAULT_NAMESPACE)
                            .await?;
                    }
                    Some(known) if known != addr => {
                        self.state = SessionState::Error;
                        warn!(id = %self.store.id(), "session client address changed");

                        return Ok(false);
                    }
                    Some(_) => {}
                }
            }
        }

        if self.security.contains(&SecurityCheck::FixBrowser) {
            if let Some(agent) = self.input.user_agent.clone() {
                let known: Option<String> =
                    self.get(CLIENT_BROWSER_KEY, DEFAULT_NAMESPACE).await?;

                if known.is_none() {
                    self.set(CLIENT_BROWSER_KEY, agent, DEFAULT_NAMESPACE)
                        .await?;
                }

                // A changed user agent is recorded knowledge only; it
                // never rejects the session.
            }
        }

        Ok(true)
    }

    fn notify(&self, event: SessionEvent) {
        for observer in &self.observers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                observer.on_session_event(event);
            }));

            if outcome.is_err() {
                warn!(?event, "session observer panicked");
            }
        }
    }
}
