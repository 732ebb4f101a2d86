//! # gsupload-auth
//!
//! OAuth2 authorization-code flow for a single local user, with the
//! resulting token cached on disk so later runs skip the browser.
//!
//! The crate provides:
//!
//! * [`ClientFactory`]: resolves the client identity, loads a cached token
//!   or runs the interactive flow, and returns an [`AuthorizedClient`].
//! * [`AuthorizedClient`]: `reqwest` wrapper that attaches the bearer
//!   token, refreshes it before expiry and can echo all traffic.
//! * [`AuthorizationFlow`] and [`CallbackListener`]: the interactive part, where
//!   a one-shot loopback listener receives the provider's redirect.
//! * [`TokenStore`]: one JSON file per identity in the user cache dir.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use gsupload_auth::{AuthConfig, ClientFactory, CredentialSource};
//!
//! # async fn run() -> Result<(), gsupload_auth::AuthError> {
//! let factory = ClientFactory::new(AuthConfig::from_env());
//! let client = factory
//!     .client_for(
//!         &CredentialSource::new(None, "clientid.dat"),
//!         &CredentialSource::new(None, "clientsecret.dat"),
//!         "https://www.googleapis.com/auth/devstorage.read_write",
//!     )
//!     .await?;
//!
//! let res = client
//!     .send(client.get("https://storage.googleapis.com/my-bucket"))
//!     .await?;
//! println!("{}", res.status());
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod callback;
pub mod config;
pub mod error;
pub mod factory;
pub mod flow;
pub mod identity;
pub mod store;
pub mod tee;
pub mod token;
pub mod transport;

pub use browser::{BrowserOpener, CommandOpener, SystemOpener};
pub use callback::CallbackListener;
pub use config::{AuthConfig, CredentialSource, ProviderEndpoints};
pub use error::{AuthError, CacheError};
pub use factory::ClientFactory;
pub use flow::{AuthorizationFlow, FlowState};
pub use identity::{CacheKey, ClientIdentity};
pub use store::TokenStore;
pub use tee::Tee;
pub use token::TokenRecord;
pub use transport::{AuthorizedClient, EchoSink};
