//! Error types for the gsupload auth crate.
//!
//! [`AuthError`] is returned by every operation a caller of the client
//! factory can observe.  [`CacheError`] never escapes the factory: a failed
//! load falls back to the interactive flow and a failed save is only logged.

use std::time::Duration;

use crate::identity::CacheKey;

/// Errors that can abort obtaining or using an OAuth token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credential material is missing or unreadable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider rejected the code exchange or the refresh grant.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// The provider redirected back with an `error` parameter.
    #[error("authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    /// The callback listener stopped before delivering a code.
    #[error("callback listener stopped before an authorization code arrived")]
    CallbackAbandoned,

    /// No valid callback arrived before the configured deadline.
    #[error("no authorization callback received within {0:?}")]
    CallbackTimeout(Duration),

    /// Network or protocol failure talking to the provider or an API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic I/O error (binding the callback listener, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons the token cache could not be used.
///
/// Messages name the cache entry by its printable [`CacheKey`], never by
/// file path: the file name embeds the client secret.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Caching has been turned off for this run.
    #[error("token caching is disabled")]
    Disabled,

    /// The cache file is absent or cannot be read.
    #[error("cannot read token cache for {key}: {source}")]
    Unreadable {
        key: CacheKey,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but does not hold a token record.
    #[error("malformed token cache for {key}: {source}")]
    Malformed {
        key: CacheKey,
        #[source]
        source: serde_json::Error,
    },

    /// The token could not be written to disk.
    #[error("cannot write token cache for {key}: {source}")]
    Write {
        key: CacheKey,
        #[source]
        source: std::io::Error,
    },

    /// The token could not be serialised.
    #[error("cannot encode token: {0}")]
    Encode(#[source] serde_json::Error),
}
