//! Session management with namespaced state and pluggable storage
//! handlers.
//!
//! A [`Session`] is the state-machine and policy layer: it owns
//! expiry, fixation checks and counter/timer bookkeeping, and
//! orchestrates the lifecycle of an explicitly injected
//! [`Storage`]. The storage bridges a raw [`SessionHandler`] (file,
//! SQL table, cache server) to a structured variable store keyed by
//! namespace then name.
//!
//! One logical session is scoped to one request; mutual exclusion on
//! a session ID is the backing store's to provide, this crate
//! performs no additional locking.
//!
//! # Features
//!
//! - `redis` - Redis session handler (enabled by default)
//! - `memcached` - Memcached session handler
//! - `database` - SQLite session handler
//!
//! # Examples
//!
//! ```
//! use tessera_session::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let options = SessionOptions::new()
//!         .with_expire(15)
//!         .with_security("fix_address")?;
//!
//!     let store = NativeStorage::new(MemoryHandler::new());
//!     let mut session = Session::new(store, options)
//!         .with_client_input(ClientInput::new().with_remote_addr("203.0.113.7"));
//!
//!     session.start().await?;
//!     assert_eq!(session.state(), SessionState::Active);
//!
//!     // Namespaces keep independent consumers from colliding
//!     session.set("user_id", 123, "auth").await?;
//!     session.set("cart", vec!["item1"], "shop").await?;
//!
//!     let user_id: Option<i32> = session.get("user_id", "auth").await?;
//!     assert_eq!(user_id, Some(123));
//!
//!     // Flush to the handler and end the session
//!     session.close().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Handler discovery
//!
//! Handlers register in an explicit registry; callers enumerate the
//! supported subset and pick one themselves:
//!
//! ```
//! use tessera_session::HandlerRegistry;
//!
//! let registry = HandlerRegistry::with_builtin();
//! for name in registry.supported() {
//!     println!("available handler: {name}");
//! }
//! ```
//!
//! ## Redis handler (default feature)
//!
//! ```no_run
//! use tessera_session::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), SessionError> {
//! let handler = RedisHandler::new("redis://localhost:6379")
//!     .await?
//!     .with_prefix("myapp:sess:")
//!     .with_ttl(Duration::from_secs(900));
//!
//! let store = NativeStorage::new(handler);
//! let mut session = Session::new(store, SessionOptions::new());
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod input;
pub mod session;
pub mod storage;

pub use config::{CookieParams, SecurityCheck, SessionOptions};
pub use error::{SessionError, SessionResult};
pub use events::{SessionEvent, SessionObserver};
pub use handler::{FilesystemHandler, HandlerRegistry, MemoryHandler, SessionHandler};
pub use input::ClientInput;
pub use session::{DEFAULT_NAMESPACE, Session, SessionState};
pub use storage::{NativeStorage, Storage, generate_session_id};

#[cfg(feature = "database")]
pub use handler::DatabaseHandler;

#[cfg(feature = "memcached")]
pub use handler::MemcachedHandler;

#[cfg(feature = "redis")]
pub use handler::RedisHandler;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CookieParams, SecurityCheck, SessionOptions};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::events::{SessionEvent, SessionObserver};
    pub use crate::handler::{FilesystemHandler, HandlerRegistry, MemoryHandler, SessionHandler};
    pub use crate::input::ClientInput;
    pub use crate::session::{Session, SessionState};
    pub use crate::storage::{NativeStorage, Storage, generate_session_id};

    #[cfg(feature = "database")]
    pub use crate::handler::DatabaseHandler;

    #[cfg(feature = "memcached")]
    pub use crate::handler::MemcachedHandler;

    #[cfg(feature = "redis")]
    pub use crate::handler::RedisHandler;
}
