use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hack2heart_core::Session;
use tokio::sync::watch;
use tracing::{debug, info};

/// The session file only holds a handful of short strings.
pub const MAX_SESSION_FILE_BYTES: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file metadata read failed: {0}")]
    Metadata(#[source] io::Error),
    #[error("session file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("session file read failed: {0}")]
    Read(#[source] io::Error),
    #[error("session file parse failed: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("session dir create failed: {0}")]
    CreateDir(#[source] io::Error),
    #[error("session serialize failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("session tmp write failed: {0}")]
    WriteTmp(#[source] io::Error),
    #[error("session rename failed: {0}")]
    Rename(#[source] io::Error),
    #[error("session remove failed: {0}")]
    Remove(#[source] io::Error),
}

/// Shared session context.
///
/// `update` is the only way to change the session; every subscriber sees the
/// new value.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<Option<Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionStore {
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn update(&self, session: Option<Session>) {
        debug!(
            present = session.is_some(),
            registered = session.as_ref().is_some_and(Session::is_registered),
            "session updated"
        );
        self.tx.send_replace(session);
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.tx
            .borrow()
            .as_ref()
            .and_then(Session::bearer_token)
            .map(str::to_owned)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join("session.json")
}

/// Missing file means "no session".
pub fn load_session_from_path(path: &Path) -> Result<Option<Session>, SessionError> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SessionError::Metadata(err)),
    };
    if meta.len() > MAX_SESSION_FILE_BYTES {
        return Err(SessionError::TooLarge {
            size: meta.len(),
            max: MAX_SESSION_FILE_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(SessionError::Read)?;
    serde_json::from_str::<Session>(&data)
        .map(Some)
        .map_err(SessionError::Parse)
}

pub fn save_session_to_path(path: &Path, session: &Session) -> Result<(), SessionError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(SessionError::CreateDir)?;
    }

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(session).map_err(SessionError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(SessionError::WriteTmp)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(SessionError::Rename)?;
    info!(path = %path.display(), "session saved");
    Ok(())
}

pub fn clear_session_file(path: &Path) -> Result<(), SessionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SessionError::Remove(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Session {
        Session {
            github_oauth_id: Some("1".to_owned()),
            github_name: Some("octo".to_owned()),
            access_token: Some("gh".to_owned()),
            service_token: Some("svc".to_owned()),
            ..Session::default()
        }
    }

    #[test]
    fn update_notifies_subscribers() {
        let store = SessionStore::default();
        let mut rx = store.subscribe();
        assert!(store.current().is_none());

        store.update(Some(registered()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&registered()));
        assert_eq!(store.bearer_token().as_deref(), Some("svc"));

        store.update(None);
        assert!(rx.has_changed().unwrap());
        assert!(store.bearer_token().is_none());
    }

    #[test]
    fn update_without_subscribers_still_applies() {
        let store = SessionStore::new(None);
        store.update(Some(registered()));
        assert_eq!(store.current(), Some(registered()));
    }
}
