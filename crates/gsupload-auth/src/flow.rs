//! Interactive authorization-code flow.
//!
//! [`AuthorizationFlow::run`] walks through
//! `Idle → AwaitingUserAction → AwaitingCallback → Exchanging → Done`,
//! ending in `Failed` on any error:
//!
//! 1. Generate a fresh `state` and start a [`CallbackListener`].
//! 2. Build the authorization URL with the listener as redirect URI, print
//!    and log it, and try to open it in a browser on a detached thread.
//! 3. Wait for the listener to deliver a code (optionally with a deadline).
//! 4. Exchange the code at the token endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{self, BrowserOpener};
use crate::callback::CallbackListener;
use crate::config::ProviderEndpoints;
use crate::error::AuthError;
use crate::identity::ClientIdentity;
use crate::token::{self, TokenRecord};
use crate::transport::{self, EchoSink};

/// Where a flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingUserAction,
    AwaitingCallback,
    Exchanging,
    Done,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingUserAction => "awaiting user action",
            Self::AwaitingCallback => "awaiting callback",
            Self::Exchanging => "exchanging",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Obtains a token by sending the user through the provider's consent page.
pub struct AuthorizationFlow {
    http: reqwest::Client,
    endpoints: ProviderEndpoints,
    openers: Arc<Vec<Box<dyn BrowserOpener>>>,
    callback_timeout: Option<Duration>,
    prompt: EchoSink,
    state: FlowState,
}

impl AuthorizationFlow {
    pub fn new(http: reqwest::Client, endpoints: ProviderEndpoints) -> Self {
        Self {
            http,
            endpoints,
            openers: Arc::new(browser::default_openers()),
            callback_timeout: None,
            prompt: transport::stdout_sink(),
            state: FlowState::Idle,
        }
    }

    /// Replace the browser openers.
    #[must_use]
    pub fn with_openers(mut self, openers: Arc<Vec<Box<dyn BrowserOpener>>>) -> Self {
        self.openers = openers;
        self
    }

    /// Fail with [`AuthError::CallbackTimeout`] if no callback arrives in time.
    #[must_use]
    pub fn with_callback_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Print the authorization URL to `sink` instead of stdout.
    #[must_use]
    pub fn with_prompt(mut self, sink: EchoSink) -> Self {
        self.prompt = sink;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Run the flow to completion for `identity`.
    pub async fn run(&mut self, identity: &ClientIdentity) -> Result<TokenRecord, AuthError> {
        let result = self.drive(identity).await;
        self.transition(if result.is_ok() {
            FlowState::Done
        } else {
            FlowState::Failed
        });
        result
    }

    async fn drive(&mut self, identity: &ClientIdentity) -> Result<TokenRecord, AuthError> {
        let state = generate_state();
        let listener = CallbackListener::start(state.as_str()).await?;
        let redirect_uri = listener.base_url();
        let auth_url = authorization_url(&self.endpoints, identity, &redirect_uri, &state)?;

        self.transition(FlowState::AwaitingUserAction);
        info!(url = %auth_url, "authorize this app in your browser");
        transport::echo(
            &self.prompt,
            format!("Visit this URL to authorize gsupload:\n\n{auth_url}\n\n").as_bytes(),
        );

        // Never joined: the runtime must not wait on it at shutdown.
        let openers = Arc::clone(&self.openers);
        let url = auth_url.to_string();
        if let Err(e) = std::thread::Builder::new()
            .name("browser-opener".into())
            .spawn(move || browser::open_best_effort(&openers, &url))
        {
            warn!(error = %e, "could not start the browser opener");
        }

        self.transition(FlowState::AwaitingCallback);
        let code = listener.wait(self.callback_timeout).await?;

        self.transition(FlowState::Exchanging);
        let token =
            token::exchange_code(&self.http, &self.endpoints, identity, &code, &redirect_uri)
                .await?;
        info!("authorization code exchanged for a token");
        Ok(token)
    }

    fn transition(&mut self, next: FlowState) {
        debug!(from = %self.state, to = %next, "authorization flow");
        self.state = next;
    }
}

/// Authorization URL for `identity`, redirecting to `redirect_uri`.
///
/// Requests offline access so the provider issues a refresh token.
pub fn authorization_url(
    endpoints: &ProviderEndpoints,
    identity: &ClientIdentity,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&endpoints.auth_url).map_err(|e| {
        AuthError::Configuration(format!(
            "invalid authorization endpoint {}: {e}",
            endpoints.auth_url
        ))
    })?;

    url.query_pairs_mut()
        .append_pair("access_type", "offline")
        .append_pair("client_id", identity.client_id())
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", identity.scope())
        .append_pair("state", state);
    Ok(url)
}

/// Fresh anti-forgery value for one flow.
fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    format!("st{}", URL_SAFE_NO_PAD.encode(bytes))
}
