//! Token records and the provider's token endpoint.
//!
//! Both grants the crate uses (authorization code and refresh token) post a
//! form to the same endpoint and read the same JSON response, which is
//! turned into a [`TokenRecord`] with an absolute expiry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderEndpoints;
use crate::error::AuthError;
use crate::identity::ClientIdentity;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// An OAuth2 token as issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl TokenRecord {
    /// `true` if the token expires less than `margin` from now.
    ///
    /// Tokens without an expiry never expire.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expiry.is_some_and(|expiry| expiry - margin <= Utc::now())
    }

    /// Value of the `Authorization` header for this token.
    pub fn authorization_header(&self) -> String {
        let token_type = if self.token_type.is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            &self.token_type
        };
        format!("{token_type} {}", self.access_token)
    }
}

/// JSON body returned by the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert to a record; `previous_refresh` is kept when the provider
    /// does not rotate the refresh token.
    fn into_record(self, previous_refresh: Option<String>) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            token_type: self
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
        }
    }
}

/// Exchange an authorization code for a token.
///
/// `redirect_uri` must be the exact URI sent in the authorization request.
pub async fn exchange_code(
    http: &reqwest::Client,
    endpoints: &ProviderEndpoints,
    identity: &ClientIdentity,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenRecord, AuthError> {
    let response = request_token(
        http,
        &endpoints.token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", identity.client_id()),
            ("client_secret", identity.client_secret()),
        ],
    )
    .await?;

    Ok(response.into_record(None))
}

/// Obtain a fresh access token with a refresh token.
pub async fn refresh(
    http: &reqwest::Client,
    endpoints: &ProviderEndpoints,
    identity: &ClientIdentity,
    refresh_token: &str,
) -> Result<TokenRecord, AuthError> {
    let response = request_token(
        http,
        &endpoints.token_url,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", identity.client_id()),
            ("client_secret", identity.client_secret()),
        ],
    )
    .await?;

    Ok(response.into_record(Some(refresh_token.to_string())))
}

async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let res = http.post(token_url).form(form).send().await?;

    if !res.status().is_success() {
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        return Err(AuthError::Exchange(format!(
            "provider returned {status}: {text}"
        )));
    }

    let body = res.text().await?;
    let response: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| AuthError::Exchange(format!("unexpected token response: {e}")))?;
    debug!(
        has_refresh_token = response.refresh_token.is_some(),
        expires_in = ?response.expires_in,
        "token endpoint responded"
    );
    Ok(response)
}
