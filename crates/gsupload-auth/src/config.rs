//! Auth configuration.
//!
//! [`AuthConfig`] carries everything the client factory needs besides the
//! client identity itself: provider endpoints, the caching and traffic-echo
//! switches, and an optional callback deadline.  [`CredentialSource`]
//! resolves a single credential from an explicit value or a file.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;

/// Google's OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

/// Authorization and token endpoints of an OAuth2 provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    /// Where the user is sent to grant access.
    pub auth_url: String,
    /// Where authorization codes and refresh tokens are exchanged.
    pub token_url: String,
}

impl ProviderEndpoints {
    /// Endpoints of Google's OAuth2 service.
    pub fn google() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    /// Google's endpoints, each overridable from the environment.
    ///
    /// | Variable             | Default            |
    /// |----------------------|--------------------|
    /// | `GSUPLOAD_AUTH_URL`  | [`GOOGLE_AUTH_URL`]  |
    /// | `GSUPLOAD_TOKEN_URL` | [`GOOGLE_TOKEN_URL`] |
    pub fn from_env() -> Self {
        let defaults = Self::google();
        Self {
            auth_url: std::env::var("GSUPLOAD_AUTH_URL").unwrap_or(defaults.auth_url),
            token_url: std::env::var("GSUPLOAD_TOKEN_URL").unwrap_or(defaults.token_url),
        }
    }
}

/// Settings consumed by [`ClientFactory`](crate::ClientFactory).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Provider endpoints.
    pub endpoints: ProviderEndpoints,
    /// Read and write the on-disk token cache (default `true`).
    pub cache_tokens: bool,
    /// Echo request and response bytes to the diagnostic sink (default `false`).
    pub echo_traffic: bool,
    /// Directory holding token cache files.  `None` means the platform
    /// user cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Give up waiting for the browser redirect after this long.  `None`
    /// waits until the process is killed.
    pub callback_timeout: Option<Duration>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::google(),
            cache_tokens: true,
            echo_traffic: false,
            cache_dir: None,
            callback_timeout: None,
        }
    }
}

impl AuthConfig {
    /// Build the configuration from environment variables.
    ///
    /// Endpoints follow [`ProviderEndpoints::from_env`];
    /// `GSUPLOAD_CACHE_DIR` overrides the token cache directory.
    pub fn from_env() -> Self {
        Self {
            endpoints: ProviderEndpoints::from_env(),
            cache_dir: std::env::var_os("GSUPLOAD_CACHE_DIR").map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Where a credential comes from: an explicit value, or else a file.
#[derive(Debug, Clone)]
pub struct CredentialSource {
    /// Explicit value; a non-empty value wins over the file.
    pub value: Option<String>,
    /// File whose trimmed contents are used when no value is given.
    pub file: PathBuf,
}

impl CredentialSource {
    pub fn new(value: Option<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            value,
            file: file.into(),
        }
    }

    /// Resolve the credential, trimming surrounding whitespace.
    ///
    /// `what` names the credential in error messages (e.g. `"client id"`).
    pub fn resolve(&self, what: &str) -> Result<String, AuthError> {
        if let Some(value) = self.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }

        let contents = std::fs::read_to_string(&self.file).map_err(|e| {
            AuthError::Configuration(format!(
                "no {what} given and cannot read {}: {e}",
                self.file.display()
            ))
        })?;

        let value = contents.trim();
        if value.is_empty() {
            return Err(AuthError::Configuration(format!(
                "no {what} given and {} is empty",
                self.file.display()
            )));
        }
        Ok(value.to_string())
    }
}
