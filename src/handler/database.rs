//! SQL session storage handler.
//!
//! This module requires the `database` feature flag.

use crate::error::{SessionError, SessionResult};
use crate::handler::{SessionHandler, validate_id};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use std::time::Duration;

/// SQLite-backed session handler.
///
/// Records live in a `(session_id, data, time)` table where `time` is
/// the unix timestamp of the last write; gc deletes rows older than
/// the requested maximum lifetime.
///
/// # Examples
///
/// ```no_run
/// use tessera_session::DatabaseHandler;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = DatabaseHandler::new("sqlite::memory:").await?;
/// handler.create_table().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DatabaseHandler {
    pool: SqlitePool,
    table: String,
}

impl DatabaseHandler {
    /// Connect to the database and create a handler over the default
    /// `sessions` table.
    pub async fn new(url: &str) -> SessionResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            table: "sessions".to_string(),
        })
    }

    /// Use a different table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Create the session table if it does not exist.
    pub async fn create_table(&self) -> SessionResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                session_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                time INTEGER NOT NULL
            )",
            self.table
        );

        sqlx::query(&sql).execute(&self.pool).await?;

        Ok(())
    }
}

#[async_trait]
impl SessionHandler for DatabaseHandler {
    async fn open(&self, _save_path: &str, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> SessionResult<String> {
        validate_id(id)?;

        let sql = format!("SELECT data FROM {} WHERE session_id = ?", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| row.get::<String, _>("data"))
            .unwrap_or_default())
    }

    async fn write(&self, id: &str, data: &str) -> SessionResult<()> {
        validate_id(id)?;

        let sql = format!(
            "INSERT INTO {} (session_id, data, time) VALUES (?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET data = excluded.data, time = excluded.time",
            self.table
        );

        sqlx::query(&sql)
            .bind(id)
            .bind(data)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        validate_id(id)?;

        let sql = format!("DELETE FROM {} WHERE session_id = ?", self.table);
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        let cutoff = chrono::Utc::now().timestamp() - max_lifetime.as_secs() as i64;

        let sql = format!("DELETE FROM {} WHERE time < ?", self.table);
        let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn handler() -> (DatabaseHandler, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("sessions.db").display()
        );

        let handler = DatabaseHandler::new(&url).await.unwrap();
        handler.create_table().await.unwrap();

        (handler, dir)
    }

    #[tokio::test]
    async fn round_trip() {
        let (handler, _dir) = handler().await;

        assert_eq!(handler.read("id").await.unwrap(), "");

        handler.write("id", "blob").await.unwrap();
        assert_eq!(handler.read("id").await.unwrap(), "blob");

        handler.write("id", "updated").await.unwrap();
        assert_eq!(handler.read("id").await.unwrap(), "updated");

        handler.destroy("id").await.unwrap();
        assert_eq!(handler.read("id").await.unwrap(), "");
    }

    #[tokio::test]
    async fn gc_reaps_old_rows() {
        let (handler, _dir) = handler().await;
        handler.write("id", "blob").await.unwrap();

        assert_eq!(handler.gc(Duration::from_secs(3600)).await.unwrap(), 0);

        // A zero lifetime makes every previously written row stale
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(handler.gc(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(handler.read("id").await.unwrap(), "");
    }
}
