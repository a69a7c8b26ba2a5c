//! Session token jar.
//!
//! Plays the role the HTTP-only `access_token` / `refresh_token` cookies play
//! in a browser: the only authoritative record of whether a session exists.
//! Everything else (the status probe, [`Session`](super::Session)) derives
//! its view from here.
//!
//! The jar can optionally be backed by a TOML file so a session survives
//! across CLI runs. Persistence is best-effort: failures are logged and the
//! in-memory state stays authoritative.
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::api::AuthStatus;

/// Access token lifetime (1 hour), matching the cookie max-age.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
/// Refresh token lifetime (30 days).
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Maximum session file size accepted on load (64 KB).
const MAX_SESSION_FILE_SIZE: u64 = 64 * 1024;

#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("Failed to access session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid session file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to encode session file: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("Session file too large ({0} bytes)")]
    TooLarge(u64),
}

struct StoredToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn new(value: String, ttl_secs: i64) -> Self {
        Self {
            value: SecretString::from(value),
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct JarState {
    access: Option<StoredToken>,
    refresh: Option<StoredToken>,
}

/// On-disk representation. Only ever written with user-only permissions.
#[derive(Serialize, Deserialize, Default)]
struct SessionFile {
    access_token: Option<FileToken>,
    refresh_token: Option<FileToken>,
}

#[derive(Serialize, Deserialize)]
struct FileToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl From<FileToken> for StoredToken {
    fn from(t: FileToken) -> Self {
        Self {
            value: SecretString::from(t.value),
            expires_at: t.expires_at,
        }
    }
}

impl From<&StoredToken> for FileToken {
    fn from(t: &StoredToken) -> Self {
        Self {
            value: t.value.expose_secret().to_string(),
            expires_at: t.expires_at,
        }
    }
}

/// Holder of the access/refresh token pair.
///
/// Expired tokens read as absent, exactly as an expired cookie would.
pub struct TokenJar {
    state: Mutex<JarState>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for TokenJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("TokenJar")
            .field("access_token", &status.is_authenticated.then_some("[REDACTED]"))
            .field("refresh_token", &status.has_refresh_token.then_some("[REDACTED]"))
            .field("path", &self.path)
            .finish()
    }
}

impl Default for TokenJar {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TokenJar {
    /// A jar that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(JarState::default()),
            path: None,
        }
    }

    /// A jar backed by `path`. A missing file starts an empty session; an
    /// unreadable or corrupt one is logged and also starts empty.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match load_session_file(&path) {
            Ok(Some(file)) => {
                tracing::debug!(path = %path.display(), "Loaded session file");
                JarState {
                    access: file.access_token.map(StoredToken::from),
                    refresh: file.refresh_token.map(StoredToken::from),
                }
            }
            Ok(None) => JarState::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                JarState::default()
            }
        };
        Self {
            state: Mutex::new(state),
            path: Some(path),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JarState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn access_token(&self) -> Option<SecretString> {
        let now = Utc::now();
        self.lock()
            .access
            .as_ref()
            .filter(|t| t.is_live(now))
            .map(|t| t.value.clone())
    }

    pub fn refresh_token(&self) -> Option<SecretString> {
        let now = Utc::now();
        self.lock()
            .refresh
            .as_ref()
            .filter(|t| t.is_live(now))
            .map(|t| t.value.clone())
    }

    /// Store a fresh access token with the standard 1 hour lifetime.
    pub fn store_access(&self, token: String) {
        let mut state = self.lock();
        state.access = Some(StoredToken::new(token, ACCESS_TOKEN_TTL_SECS));
        self.persist(&state);
    }

    /// Store a fresh refresh token with the standard 30 day lifetime.
    pub fn store_refresh(&self, token: String) {
        let mut state = self.lock();
        state.refresh = Some(StoredToken::new(token, REFRESH_TOKEN_TTL_SECS));
        self.persist(&state);
    }

    /// Store both tokens under one lock so no reader sees half a login.
    pub fn store_pair(&self, access: String, refresh: String) {
        let mut state = self.lock();
        state.access = Some(StoredToken::new(access, ACCESS_TOKEN_TTL_SECS));
        state.refresh = Some(StoredToken::new(refresh, REFRESH_TOKEN_TTL_SECS));
        self.persist(&state);
    }

    /// Drop the access token only, as if its cookie had expired.
    pub fn clear_access(&self) {
        let mut state = self.lock();
        state.access = None;
        self.persist(&state);
    }

    /// Drop both tokens.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.access = None;
        state.refresh = None;
        self.persist(&state);
    }

    /// Status probe: which tokens exist and are unexpired. Never mutates.
    pub fn status(&self) -> AuthStatus {
        let now = Utc::now();
        let state = self.lock();
        AuthStatus {
            is_authenticated: state.access.as_ref().is_some_and(|t| t.is_live(now)),
            has_refresh_token: state.refresh.as_ref().is_some_and(|t| t.is_live(now)),
        }
    }

    #[cfg(test)]
    fn store_access_expiring_at(&self, token: &str, expires_at: DateTime<Utc>) {
        self.lock().access = Some(StoredToken {
            value: SecretString::from(token.to_string()),
            expires_at,
        });
    }

    fn persist(&self, state: &JarState) {
        let Some(path) = &self.path else {
            return;
        };
        let file = SessionFile {
            access_token: state.access.as_ref().map(FileToken::from),
            refresh_token: state.refresh.as_ref().map(FileToken::from),
        };
        if let Err(e) = write_session_file(path, &file) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist session file");
        }
    }
}

fn load_session_file(path: &Path) -> Result<Option<SessionFile>, SessionFileError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_SESSION_FILE_SIZE => {
            return Err(SessionFileError::TooLarge(meta.len()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SessionFileError::Io(e)),
        Ok(_) => {}
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SessionFileError::Io(e)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(toml::from_str(&content)?))
}

/// Write-to-temp-then-rename so a crash never leaves a half-written session.
fn write_session_file(path: &Path, file: &SessionFile) -> Result<(), SessionFileError> {
    let content = toml::to_string(file)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let result = options.open(&temp_path).and_then(|mut temp_file| {
        temp_file.write_all(content.as_bytes())?;
        temp_file.sync_all()
    });
    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    std::fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_jar_status() {
        let jar = TokenJar::in_memory();
        assert_eq!(jar.status(), AuthStatus::default());
        assert!(jar.access_token().is_none());
        assert!(jar.refresh_token().is_none());
    }

    #[test]
    fn test_store_pair_and_clear_access() {
        let jar = TokenJar::in_memory();
        jar.store_pair("acc".into(), "ref".into());
        assert_eq!(
            jar.status(),
            AuthStatus {
                is_authenticated: true,
                has_refresh_token: true
            }
        );
        assert_eq!(jar.access_token().unwrap().expose_secret(), "acc");

        jar.clear_access();
        let status = jar.status();
        assert!(!status.is_authenticated);
        assert!(status.has_refresh_token);
        assert_eq!(jar.refresh_token().unwrap().expose_secret(), "ref");
    }

    #[test]
    fn test_expired_access_token_reads_as_absent() {
        let jar = TokenJar::in_memory();
        jar.store_refresh("ref".into());
        jar.store_access_expiring_at("old", Utc::now() - Duration::seconds(1));
        assert!(jar.access_token().is_none());
        assert!(!jar.status().is_authenticated);
        assert!(jar.status().has_refresh_token);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let jar = TokenJar::in_memory();
        jar.store_pair("super-secret-access".into(), "super-secret-refresh".into());
        let debug_output = format!("{:?}", jar);
        assert!(!debug_output.contains("super-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_persistent_jar_round_trips_through_file() {
        let dir = std::env::temp_dir().join("newsline_tokens_test_persist");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");
        std::fs::remove_file(&path).ok();

        let jar = TokenJar::persistent(&path);
        jar.store_pair("acc".into(), "ref".into());
        drop(jar);

        let reopened = TokenJar::persistent(&path);
        assert!(reopened.status().is_authenticated);
        assert_eq!(reopened.refresh_token().unwrap().expose_secret(), "ref");

        reopened.clear();
        let cleared = TokenJar::persistent(&path);
        assert_eq!(cleared.status(), AuthStatus::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join("newsline_tokens_test_perms");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");
        std::fs::remove_file(&path).ok();

        let jar = TokenJar::persistent(&path);
        jar.store_access("acc".into());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_session_file_starts_empty() {
        let dir = std::env::temp_dir().join("newsline_tokens_test_corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let jar = TokenJar::persistent(&path);
        assert_eq!(jar.status(), AuthStatus::default());

        std::fs::remove_dir_all(&dir).ok();
    }
}
