//! Redis session storage handler.

use crate::error::{SessionError, SessionResult};
use crate::handler::{SessionHandler, validate_id};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Redis-backed session handler.
///
/// Keys are namespaced with a caller-supplied prefix to avoid
/// collisions across applications sharing one server. When a
/// time-to-live is configured the record is written with `SETEX` and
/// Redis reaps expired records itself; [`SessionHandler::gc`] is then
/// a no-op.
///
/// # Examples
///
/// ```no_run
/// use tessera_session::RedisHandler;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = RedisHandler::new("redis://localhost:6379")
///     .await?
///     .with_prefix("myapp:sess:")
///     .with_ttl(Duration::from_secs(900));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisHandler {
    conn: ConnectionManager,
    prefix: String,
    ttl: Duration,
}

impl RedisHandler {
    /// Connect to Redis and create a handler with the default prefix
    /// (`"tessera:"`) and a 15 minute time-to-live.
    pub async fn new(url: &str) -> SessionResult<Self> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(SessionError::Config(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        let client = redis::Client::open(url)
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            prefix: "tessera:".to_string(),
            ttl: Duration::from_secs(900),
        })
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the record time-to-live. A zero duration writes records
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
impl SessionHandler for RedisHandler {
    async fn open(&self, _save_path: &str, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> SessionResult<String> {
        validate_id(id)?;

        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.key(id)).await?;

        Ok(data.unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &str) -> SessionResult<()> {
        validate_id(id)?;

        let mut conn = self.conn.clone();
        let key = self.key(id);

        if self.ttl.as_secs() > 0 {
            let _: () = conn.set_ex(key, data, self.ttl.as_secs()).await?;
        } else {
            let _: () = conn.set(key, data).await?;
        }

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        validate_id(id)?;

        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(id)).await?;

        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> SessionResult<usize> {
        // Redis expires records itself when a ttl is set
        Ok(0)
    }
}
