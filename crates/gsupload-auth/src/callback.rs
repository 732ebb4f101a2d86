//! One-shot local listener for the OAuth redirect.
//!
//! [`CallbackListener::start`] binds an ephemeral port on the loopback
//! interface and serves every request with a single handler:
//!
//! * `/favicon.ico` is answered with 404 and otherwise ignored.
//! * A request whose `state` differs from the expected value is answered
//!   with 500 and ignored.
//! * A matching request with a non-empty `code` gets the success page and
//!   the code is delivered to the waiting caller.
//! * A matching request with an `error` gets a failure page and the error
//!   is delivered instead.
//! * Anything else is answered with 500 and ignored.
//!
//! Delivery happens at most once.  Later requests (browser retries, a
//! reloaded tab) still get an answer but never reach the caller.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::AuthError;

// ---------------------------------------------------------------------------
// Responses and delivery
// ---------------------------------------------------------------------------

const SUCCESS_PAGE: &str = "<h1>Success</h1>Authorized. You may close this window.";
const DENIED_PAGE: &str = "<h1>Authorization failed</h1>You may close this window and retry.";

/// What the listener hands to the waiting caller: a code or a provider error.
pub type CallbackResult = Result<String, AuthError>;

/// A callback the listener refused to act on.
#[derive(Debug, thiserror::Error)]
pub enum CallbackRejection {
    /// The `state` parameter is missing or belongs to another flow.
    #[error("state mismatch (received {received:?})")]
    StateMismatch { received: Option<String> },

    /// `state` matched but neither `code` nor `error` was present.
    #[error("callback carries no code")]
    MissingCode,
}

impl IntoResponse for CallbackRejection {
    fn into_response(self) -> Response {
        warn!(reason = %self, "rejected OAuth callback; still waiting");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// State shared with the request handler.
struct CallbackState {
    expected_state: String,
    delivery: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

impl CallbackState {
    /// Hand `result` to the caller unless something was already delivered.
    fn deliver(&self, result: CallbackResult) {
        let sender = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                if sender.send(result).is_err() {
                    debug!("callback arrived after the flow stopped waiting");
                }
            }
            None => debug!("duplicate callback ignored"),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<Response, CallbackRejection> {
    let received = params.remove("state");
    if received.as_deref() != Some(state.expected_state.as_str()) {
        return Err(CallbackRejection::StateMismatch { received });
    }

    if let Some(code) = params.remove("code").filter(|c| !c.is_empty()) {
        info!("authorization code received");
        // The page is written after this returns; graceful shutdown lets it
        // finish even if the flow drops the listener first.
        state.deliver(Ok(code));
        return Ok(Html(SUCCESS_PAGE).into_response());
    }

    if let Some(error) = params.remove("error") {
        let detail = match params.remove("error_description") {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        warn!(error = %detail, "provider denied authorization");
        state.deliver(Err(AuthError::AuthorizationDenied(detail)));
        return Ok((StatusCode::BAD_REQUEST, Html(DENIED_PAGE)).into_response());
    }

    Err(CallbackRejection::MissingCode)
}

fn router(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/favicon.ico", get(favicon))
        .fallback(handle_callback)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// A running redirect listener and the receiving end of its delivery.
///
/// Dropping the listener stops it from accepting connections.
pub struct CallbackListener {
    addr: SocketAddr,
    delivery: oneshot::Receiver<CallbackResult>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CallbackListener {
    /// Bind a free loopback port and start serving.
    pub async fn start(expected_state: impl Into<String>) -> Result<Self, AuthError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;

        let (delivery_tx, delivery_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = router(Arc::new(CallbackState {
            expected_state: expected_state.into(),
            delivery: Mutex::new(Some(delivery_tx)),
        }));

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "callback listener failed");
            }
            debug!(address = %addr, "callback listener stopped");
        });

        info!(address = %addr, "callback listener started");
        Ok(Self {
            addr,
            delivery: delivery_rx,
            shutdown: Some(shutdown_tx),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to use as the OAuth redirect URI, e.g. `http://127.0.0.1:49152`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the first delivery, then shut the listener down.
    ///
    /// With `deadline` set, gives up with [`AuthError::CallbackTimeout`].
    pub async fn wait(mut self, deadline: Option<Duration>) -> CallbackResult {
        let received = match deadline {
            Some(limit) => tokio::time::timeout(limit, &mut self.delivery)
                .await
                .map_err(|_| AuthError::CallbackTimeout(limit))?,
            None => (&mut self.delivery).await,
        };
        received.map_err(|_| AuthError::CallbackAbandoned)?
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
