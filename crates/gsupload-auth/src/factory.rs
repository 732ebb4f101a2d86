//! Builds authenticated clients, from the token cache when possible.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::browser::{self, BrowserOpener};
use crate::config::{AuthConfig, CredentialSource};
use crate::error::AuthError;
use crate::flow::AuthorizationFlow;
use crate::identity::ClientIdentity;
use crate::store::TokenStore;
use crate::token::TokenRecord;
use crate::transport::{self, AuthorizedClient, EchoSink};

/// Hands out [`AuthorizedClient`]s for client identities.
///
/// A cached token is used when one loads; otherwise the interactive
/// [`AuthorizationFlow`] runs and its token is cached for the next run.
pub struct ClientFactory {
    config: AuthConfig,
    http: reqwest::Client,
    store: TokenStore,
    openers: Arc<Vec<Box<dyn BrowserOpener>>>,
    echo_sink: EchoSink,
    prompt_sink: EchoSink,
}

impl ClientFactory {
    pub fn new(config: AuthConfig) -> Self {
        let store = TokenStore::from_config(&config);
        Self {
            config,
            http: reqwest::Client::new(),
            store,
            openers: Arc::new(browser::default_openers()),
            echo_sink: transport::stdout_sink(),
            prompt_sink: transport::stdout_sink(),
        }
    }

    /// Replace the browser openers used by the interactive flow.
    #[must_use]
    pub fn with_openers(mut self, openers: Vec<Box<dyn BrowserOpener>>) -> Self {
        self.openers = Arc::new(openers);
        self
    }

    /// Send echoed traffic to `sink` instead of stdout.
    #[must_use]
    pub fn with_echo_sink(mut self, sink: EchoSink) -> Self {
        self.echo_sink = sink;
        self
    }

    /// Print the authorization URL to `sink` instead of stdout.
    #[must_use]
    pub fn with_prompt_sink(mut self, sink: EchoSink) -> Self {
        self.prompt_sink = sink;
        self
    }

    /// Resolve the client credentials, then [`get_client`](Self::get_client).
    ///
    /// Missing credentials fail with [`AuthError::Configuration`] before
    /// anything touches the network.
    pub async fn client_for(
        &self,
        client_id: &CredentialSource,
        client_secret: &CredentialSource,
        scope: &str,
    ) -> Result<AuthorizedClient, AuthError> {
        let identity = ClientIdentity::resolve(client_id, client_secret, scope)?;
        self.get_client(&identity).await
    }

    /// Client authenticated as `identity`.
    pub async fn get_client(&self, identity: &ClientIdentity) -> Result<AuthorizedClient, AuthError> {
        let key = identity.cache_key();

        let token = match self.store.load(&key) {
            Ok(token) => {
                debug!(key = %key, "using cached token");
                token
            }
            Err(miss) => {
                info!(reason = %miss, "no usable cached token; starting authorization");
                let token = self.authorize(identity).await?;
                if let Err(e) = self.store.save(&key, &token) {
                    warn!(error = %e, "failed to cache OAuth token");
                }
                token
            }
        };

        let mut client = AuthorizedClient::new(
            self.http.clone(),
            identity.clone(),
            self.config.endpoints.clone(),
            token,
        );
        if self.store.is_enabled() {
            client = client.with_persistence(self.store.clone(), key);
        }
        if self.config.echo_traffic {
            client = client.with_echo(Arc::clone(&self.echo_sink));
        }
        Ok(client)
    }

    async fn authorize(&self, identity: &ClientIdentity) -> Result<TokenRecord, AuthError> {
        let mut flow = AuthorizationFlow::new(self.http.clone(), self.config.endpoints.clone())
            .with_openers(Arc::clone(&self.openers))
            .with_prompt(Arc::clone(&self.prompt_sink))
            .with_callback_timeout(self.config.callback_timeout);
        flow.run(identity).await
    }
}
