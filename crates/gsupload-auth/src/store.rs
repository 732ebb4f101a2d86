//! On-disk token cache.
//!
//! One JSON file per [`CacheKey`] inside the user cache directory.  Every
//! failure to load is a [`CacheError`] the caller treats as "no cached
//! token"; a failure to save is reported but never fatal.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::CacheError;
use crate::identity::CacheKey;
use crate::token::TokenRecord;

/// Platform user cache directory, or the working directory if unknown.
pub fn user_cache_dir() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(|| {
        warn!("no user cache directory on this platform; caching tokens in the working directory");
        PathBuf::from(".")
    })
}

/// Reads and writes cached [`TokenRecord`]s.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
    enabled: bool,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    /// Store rooted at the configured cache directory.
    pub fn from_config(config: &AuthConfig) -> Self {
        let dir = config.cache_dir.clone().unwrap_or_else(user_cache_dir);
        Self::new(dir, config.cache_tokens)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the cache file for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Load the token cached under `key`.
    pub fn load(&self, key: &CacheKey) -> Result<TokenRecord, CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }

        let path = self.path_for(key);
        let bytes = fs::read(&path).map_err(|source| CacheError::Unreadable {
            key: key.clone(),
            source,
        })?;
        let token = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Malformed { key: key.clone(), source })?;

        debug!(key = %key, "loaded cached token");
        Ok(token)
    }

    /// Write `token` under `key`, replacing any previous record.
    ///
    /// A disabled store accepts and discards the token.
    pub fn save(&self, key: &CacheKey, token: &TokenRecord) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(token).map_err(CacheError::Encode)?;
        let write_err = |source| CacheError::Write {
            key: key.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut file = open_private(&path).map_err(write_err)?;
        file.write_all(&json).map_err(write_err)?;

        debug!(key = %key, "cached token");
        Ok(())
    }
}

/// Create or truncate `path`, readable by the owner only where supported.
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
