//! Login session: the bearer token, user id, and username the API client reads on every call.
//!
//! The store is shared by the client and the front-ends. Reads are synchronous; writes happen only
//! on login, logout, and when the backend rejects the token. When opened with a path the session
//! is persisted as JSON and removed again on clear.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Credentials of the signed-in interviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shared, optionally persisted, session holder.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
    path: Option<PathBuf>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SessionStore {
    /// Store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: None,
        }
    }

    /// Open a persisted store. An unreadable or corrupt file is ignored (signed out).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = match read_session_file(&path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("ignoring session file {}: {}", path.display(), e);
                None
            }
        };
        Self {
            inner: Arc::new(RwLock::new(session)),
            path: Some(path),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<Session> {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.read().as_ref().map(|s| s.user_id)
    }

    pub fn username(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.username.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().is_some()
    }

    /// Replace the session and persist it.
    pub fn set(&self, session: Session) -> Result<(), SessionError> {
        if let Some(ref path) = self.path {
            write_session_file(path, &session)?;
        }
        *self.write() = Some(session);
        Ok(())
    }

    /// Forget the session (memory and file).
    pub fn clear(&self) -> Result<(), SessionError> {
        *self.write() = None;
        if let Some(ref path) = self.path {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("removed session file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn read_session_file(path: &Path) -> Result<Option<Session>, SessionError> {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let session: Session = serde_json::from_slice(&data)?;
    if session.token.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(session))
}

fn write_session_file(path: &Path, session: &Session) -> Result<(), SessionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            token: "tok".to_string(),
            user_id: 7,
            username: "ana".to_string(),
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("twin-session-test-{}", uuid::Uuid::new_v4()))
            .join("session.json")
    }

    #[test]
    fn in_memory_set_and_clear() {
        let store = SessionStore::in_memory();
        assert!(!store.is_signed_in());
        store.set(sample()).expect("set");
        assert_eq!(store.token().as_deref(), Some("tok"));
        assert_eq!(store.user_id(), Some(7));
        assert_eq!(store.username().as_deref(), Some("ana"));
        store.clear().expect("clear");
        assert!(store.get().is_none());
    }

    #[test]
    fn clones_share_state() {
        let store = SessionStore::in_memory();
        let other = store.clone();
        store.set(sample()).expect("set");
        assert!(other.is_signed_in());
    }

    #[test]
    fn persists_across_open_and_clear_removes_file() {
        let path = temp_path();
        let store = SessionStore::open(&path);
        assert!(!store.is_signed_in());
        store.set(sample()).expect("set");
        assert!(path.exists());

        let reopened = SessionStore::open(&path);
        assert_eq!(reopened.get(), Some(sample()));

        reopened.clear().expect("clear");
        assert!(!path.exists());
        assert!(!SessionStore::open(&path).is_signed_in());
    }

    #[test]
    fn corrupt_file_is_signed_out() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();
        assert!(!SessionStore::open(&path).is_signed_in());
    }
}
