//! Session persistence
//!
//! Keeps the access token between runs in a small JSON file, the way a
//! browser client keeps it in local storage. Written by `login --token`,
//! read on startup, removed on logout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Session store errors
#[derive(Error, Debug)]
pub enum SessionStoreError {
    #[error("Session file I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {path:?} is malformed: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What is written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub stored_at: DateTime<Utc>,
}

/// File-backed session store
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored session, or `None` if there is no file
    pub fn load(&self) -> Result<Option<StoredSession>, SessionStoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let session = serde_json::from_str(&content).map_err(|source| SessionStoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(session))
    }

    /// Access token of the stored session, ignoring an unreadable file
    pub fn access_token(&self) -> Option<String> {
        match self.load() {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    /// Persist a token, creating parent directories as needed
    pub fn save(&self, access_token: &str) -> Result<StoredSession, SessionStoreError> {
        let session = StoredSession {
            access_token: access_token.to_string(),
            stored_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let json = serde_json::to_string_pretty(&session).map_err(|source| {
            SessionStoreError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|source| self.io_error(source))?;

        tracing::debug!(path = ?self.path, "Session stored");
        Ok(session)
    }

    /// Remove the stored session. Missing file is not an error.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
