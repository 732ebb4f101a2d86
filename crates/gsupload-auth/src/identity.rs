//! OAuth client identity and the token cache key derived from it.

use std::fmt;

use crate::config::CredentialSource;
use crate::error::AuthError;

/// Prefix of every cache key, so cache files are recognisable on disk.
const CACHE_KEY_PREFIX: &str = "gsupload";

/// The OAuth client a token is requested for, plus the requested scope.
///
/// Resolved once per run and passed by reference through the flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientIdentity {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }

    /// Resolve the client id and secret from their sources.
    ///
    /// Fails with [`AuthError::Configuration`] before any network activity
    /// if either credential is unavailable.
    pub fn resolve(
        client_id: &CredentialSource,
        client_secret: &CredentialSource,
        scope: &str,
    ) -> Result<Self, AuthError> {
        let client_id = client_id.resolve("client id")?;
        let client_secret = client_secret.resolve("client secret")?;
        Ok(Self::new(client_id, client_secret, scope))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Key under which this identity's token is cached.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_identity(self)
    }
}

/// File-name-safe key naming a cached token.
///
/// The file name is built from `gsupload-{client_id}-{client_secret}-{scope}`,
/// form-url-encoded so that scopes (which are URLs) never introduce path
/// separators.  `Display` and `Debug` show only the client id and scope.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    file_name: String,
    label: String,
}

impl CacheKey {
    pub fn for_identity(identity: &ClientIdentity) -> Self {
        let raw = format!(
            "{CACHE_KEY_PREFIX}-{}-{}-{}",
            identity.client_id, identity.client_secret, identity.scope
        );
        Self {
            file_name: url::form_urlencoded::byte_serialize(raw.as_bytes()).collect(),
            label: format!("{} ({})", identity.client_id, identity.scope),
        }
    }

    /// Cache file name.  Contains the client secret; never log it.
    pub fn as_str(&self) -> &str {
        &self.file_name
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

    #[test]
    fn equal_identities_share_a_key() {
        let a = ClientIdentity::new("abc", "xyz", "s1");
        let b = ClientIdentity::new("abc", "xyz", "s1");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn scope_changes_the_key() {
        let a = ClientIdentity::new("abc", "xyz", "s1");
        let b = ClientIdentity::new("abc", "xyz", "s2");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn secret_changes_the_key() {
        let a = ClientIdentity::new("abc", "xyz", "s1");
        let b = ClientIdentity::new("abc", "uvw", "s1");
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn key_is_a_single_path_component() {
        let key = ClientIdentity::new("id.apps.googleusercontent.com", "secret", STORAGE_SCOPE)
            .cache_key();
        assert!(!key.as_str().contains('/'));
        assert!(!key.as_str().contains(':'));
        assert!(key.as_str().starts_with("gsupload-id.apps.googleusercontent.com-secret-https%3A%2F%2F"));
    }

    #[test]
    fn printed_key_hides_the_secret() {
        let key = ClientIdentity::new("abc", "TOPSECRET", "s1").cache_key();
        assert!(key.as_str().contains("TOPSECRET"));
        assert_eq!(key.to_string(), "abc (s1)");
        assert!(!format!("{key:?}").contains("TOPSECRET"));
    }

    #[test]
    fn resolve_reads_both_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let secret_file = dir.path().join("clientsecret.dat");
        std::fs::write(&secret_file, "xyz\n").unwrap();

        let identity = ClientIdentity::resolve(
            &CredentialSource::new(Some("abc".into()), dir.path().join("clientid.dat")),
            &CredentialSource::new(None, &secret_file),
            "s1",
        )
        .unwrap();

        assert_eq!(identity, ClientIdentity::new("abc", "xyz", "s1"));
    }
}
