//! Desktop client token cache.
//!
//! One JSON file holds the client's tokens across process restarts. The
//! file is shared between concurrently running client instances, so every
//! read-modify-write cycle takes an advisory lock: an exclusive sidecar
//! lock file created with `create_new`, removed when the guard drops, with
//! a bounded retry while another instance holds it.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Cached token information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Refresh token (optional)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token expiration time (Unix timestamp)
    #[serde(default)]
    pub expires_at: Option<u64>,

    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenInfo {
    /// Create token info from a token endpoint response
    #[must_use]
    pub fn from_response(
        access_token: String,
        token_type: Option<String>,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        scope: Option<String>,
    ) -> Self {
        let expires_at = expires_in.map(|secs| now_secs() + secs);

        Self {
            access_token,
            token_type: token_type.unwrap_or_else(default_token_type),
            refresh_token,
            expires_at,
            scope,
        }
    }

    /// Check if the token is expired (with 60 second buffer)
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now_secs() + 60 >= expires_at)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Advisory lock guard; the lock file is removed on drop.
struct CacheLock {
    path: PathBuf,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release cache lock");
        }
    }
}

/// File-backed token cache with exclusive, persistent storage.
pub struct TokenCache {
    path: PathBuf,
    lock_timeout: Duration,
}

impl TokenCache {
    /// Create a cache at an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Internal(format!("Failed to create token cache dir: {e}"))
                })?;
            }
        }

        Ok(Self {
            path,
            lock_timeout: Duration::from_secs(2),
        })
    }

    /// Create the cache in the platform-appropriate default location.
    ///
    /// # Errors
    ///
    /// Returns an error when no platform data directory can be determined.
    pub fn default_location() -> Result<Self> {
        let root = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| Error::Internal("Cannot determine data directory".to_string()))?;

        Self::new(root.join("authgate").join("token.cache.json"))
    }

    /// Path of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token, if any.
    ///
    /// An expired token is still returned so the caller can attempt a
    /// refresh; an unreadable cache is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error when the advisory lock cannot be acquired.
    pub fn load(&self) -> Result<Option<TokenInfo>> {
        let _lock = self.acquire_lock()?;

        if !self.path.exists() {
            debug!(path = %self.path.display(), "No cached token");
            return Ok(None);
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<TokenInfo>(&content) {
                Ok(token) => {
                    if token.is_expired() {
                        debug!("Cached token is expired");
                    }
                    Ok(Some(token))
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse cached token");
                    Ok(None)
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read token cache");
                Ok(None)
            }
        }
    }

    /// Save a token to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock cannot be acquired or the file
    /// cannot be written.
    pub fn save(&self, token: &TokenInfo) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let content = serde_json::to_string_pretty(token)
            .map_err(|e| Error::Internal(format!("Failed to serialize token: {e}")))?;

        fs::write(&self.path, content)
            .map_err(|e| Error::Internal(format!("Failed to write token cache: {e}")))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        info!(path = %self.path.display(), "Saved token to cache");
        Ok(())
    }

    /// Remove the cached token.
    ///
    /// # Errors
    ///
    /// Returns an error when the lock cannot be acquired or the file
    /// cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;

        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| Error::Internal(format!("Failed to delete token cache: {e}")))?;
            info!("Cleared token cache");
        }

        Ok(())
    }

    /// Acquire the advisory lock, retrying while another instance holds it.
    fn acquire_lock(&self) -> Result<CacheLock> {
        let lock_path = self.path.with_extension("lock");
        let deadline = std::time::Instant::now() + self.lock_timeout;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => {
                    return Ok(CacheLock {
                        path: lock_path,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if std::time::Instant::now() >= deadline {
                        return Err(Error::Internal(format!(
                            "Token cache is locked by another instance: {}",
                            lock_path.display()
                        )));
                    }
                    sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(Error::Internal(format!(
                        "Failed to create cache lock: {e}"
                    )));
                }
            }
        }
    }
}
