/// Persisted client session storage
use crate::error::{AuthError, AuthResult};
use crate::session::Session;
use async_trait::async_trait;
use std::path::PathBuf;

/// Persisted storage for the single client session blob
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the persisted session. Missing or corrupt data is "no
    /// session", never an error.
    async fn load(&self) -> Option<Session>;

    /// Persist the session, replacing any previous blob
    async fn save(&self, session: &Session) -> AuthResult<()>;

    /// Erase the persisted blob. Idempotent.
    async fn clear(&self) -> AuthResult<()>;
}

/// File-backed store holding one JSON blob
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Option<Session> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Discarding corrupt session blob: {}", e);
                None
            }
        }
    }

    async fn save(&self, session: &Session) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(session)
            .map_err(|e| AuthError::Internal(format!("Failed to serialize session: {}", e)))?;
        tokio::fs::write(&self.path, bytes).await?;

        Ok(())
    }

    async fn clear(&self) -> AuthResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
