//! Filesystem session storage handler.

use crate::error::{SessionError, SessionResult};
use crate::handler::{SessionHandler, validate_id};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Filesystem-backed session handler storing one file per session ID.
///
/// # Examples
///
/// ```no_run
/// use tessera_session::FilesystemHandler;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = FilesystemHandler::new("/tmp/sessions").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemHandler {
    base_dir: PathBuf,
}

impl FilesystemHandler {
    /// Create a new filesystem handler rooted at `path`, creating the
    /// directory if it does not exist.
    ///
    /// The path may carry up to two `;`-separated leading settings
    /// segments (a `N;/path` style save path); the characters after
    /// the last semicolon are the directory.
    pub async fn new(path: &str) -> SessionResult<Self> {
        let base_dir = Self::parse_save_path(path)?;

        fs::create_dir_all(&base_dir).await.map_err(|e| {
            SessionError::Config(format!(
                "Failed to create session directory {base_dir:?}: {e}"
            ))
        })?;

        debug!(path = ?base_dir, "initialized filesystem session handler");

        Ok(Self { base_dir })
    }

    /// Directory session files are stored in.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn parse_save_path(path: &str) -> SessionResult<PathBuf> {
        if path.matches(';').count() > 2 {
            return Err(SessionError::Config(format!("Invalid save path {path:?}")));
        }

        // Characters after the last semicolon are the path
        let dir = path.rsplit(';').next().unwrap_or_default();

        if dir.is_empty() {
            return Err(SessionError::Config(format!("Invalid save path {path:?}")));
        }

        Ok(PathBuf::from(dir))
    }

    fn session_file(&self, id: &str) -> SessionResult<PathBuf> {
        validate_id(id)?;
        Ok(self.base_dir.join(format!("sess_{id}")))
    }
}

#[async_trait]
impl SessionHandler for FilesystemHandler {
    async fn open(&self, _save_path: &str, _id: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> SessionResult<String> {
        let path = self.session_file(id)?;

        match fs::read_to_string(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(SessionError::Handler(format!(
                "Failed to read session file {path:?}: {e}"
            ))),
        }
    }

    async fn write(&self, id: &str, data: &str) -> SessionResult<()> {
        let path = self.session_file(id)?;

        fs::write(&path, data).await.map_err(|e| {
            SessionError::Handler(format!("Failed to write session file {path:?}: {e}"))
        })
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let path = self.session_file(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Handler(format!(
                "Failed to remove session file {path:?}: {e}"
            ))),
        }
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        let mut reaped = 0;

        let mut entries = fs::read_dir(&self.base_dir).await.map_err(|e| {
            SessionError::Handler(format!(
                "Failed to scan session directory {:?}: {e}",
                self.base_dir
            ))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::Handler(format!("Failed to scan session directory: {e}")))?
        {
            if !entry.file_name().to_string_lossy().starts_with("sess_") {
                continue;
            }

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };

            let stale = metadata
                .modified()
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .is_some_and(|age| age > max_lifetime);

            if stale && fs::remove_file(entry.path()).await.is_ok() {
                reaped += 1;
            }
        }

        if reaped > 0 {
            debug!(reaped, "filesystem session gc");
        }

        Ok(reaped)
    }
}
