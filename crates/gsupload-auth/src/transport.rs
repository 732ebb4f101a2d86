//! HTTP client that authenticates every request with the user's token.
//!
//! [`AuthorizedClient`] attaches the token as an `Authorization` header,
//! refreshes it shortly before it expires and, when asked, echoes all
//! traffic to a diagnostic sink.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::{StreamExt, future, stream};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response};
use tracing::{info, warn};

use crate::config::ProviderEndpoints;
use crate::error::AuthError;
use crate::identity::{CacheKey, ClientIdentity};
use crate::store::TokenStore;
use crate::tee::Tee;
use crate::token::{self, TokenRecord};

/// Refresh tokens this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Echo sink
// ---------------------------------------------------------------------------

/// Shared writer for echoed traffic and user prompts.
pub type EchoSink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Echo sink writing to the process's standard output.
pub fn stdout_sink() -> EchoSink {
    Arc::new(Mutex::new(Box::new(io::stdout())))
}

/// `Write` adapter over an [`EchoSink`].
struct EchoWriter(EchoSink);

impl Write for EchoWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

/// Write `bytes` to `sink` and flush; failures are ignored.
pub(crate) fn echo(sink: &EchoSink, bytes: &[u8]) {
    let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = out.write_all(bytes).and_then(|()| out.flush());
}

// ---------------------------------------------------------------------------
// Authorized client
// ---------------------------------------------------------------------------

/// An authenticated HTTP client for one identity.
///
/// Cloning is cheap; clones share the token.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    identity: ClientIdentity,
    endpoints: ProviderEndpoints,
    token: Arc<tokio::sync::Mutex<TokenRecord>>,
    persist: Option<(TokenStore, CacheKey)>,
    echo: Option<EchoSink>,
}

impl AuthorizedClient {
    pub fn new(
        http: reqwest::Client,
        identity: ClientIdentity,
        endpoints: ProviderEndpoints,
        token: TokenRecord,
    ) -> Self {
        Self {
            http,
            identity,
            endpoints,
            token: Arc::new(tokio::sync::Mutex::new(token)),
            persist: None,
            echo: None,
        }
    }

    /// Write refreshed tokens back to `store` under `key`.
    #[must_use]
    pub fn with_persistence(mut self, store: TokenStore, key: CacheKey) -> Self {
        self.persist = Some((store, key));
        self
    }

    /// Echo every request and response to `sink`.
    #[must_use]
    pub fn with_echo(mut self, sink: EchoSink) -> Self {
        self.echo = Some(sink);
        self
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> TokenRecord {
        self.token.lock().await.clone()
    }

    /// Start building a request; send it with [`send`](Self::send).
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.http.request(method, url)
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn put(&self, url: impl IntoUrl) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Build and send a request with the token attached.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        self.execute(builder.build()?).await
    }

    /// Send `request` with the token attached.
    ///
    /// Transport failures are returned as [`AuthError::Http`] and are not
    /// retried.
    pub async fn execute(&self, mut request: Request) -> Result<Response, AuthError> {
        let mut credential = HeaderValue::from_str(&self.authorization().await?)
            .map_err(|e| AuthError::Exchange(format!("token is not a valid header value: {e}")))?;
        credential.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, credential);

        match &self.echo {
            None => Ok(self.http.execute(request).await?),
            Some(sink) => self.execute_echoed(request, sink).await,
        }
    }

    /// Current `Authorization` value, refreshing the token first if needed.
    async fn authorization(&self) -> Result<String, AuthError> {
        let mut current = self.token.lock().await;

        if current.expires_within(chrono::Duration::seconds(REFRESH_MARGIN_SECS)) {
            match current.refresh_token.clone() {
                Some(refresh_token) => {
                    info!("access token expired; refreshing");
                    *current =
                        token::refresh(&self.http, &self.endpoints, &self.identity, &refresh_token)
                            .await?;
                    if let Some((store, key)) = &self.persist {
                        if let Err(e) = store.save(key, &current) {
                            warn!(error = %e, "failed to cache refreshed token");
                        }
                    }
                }
                None => warn!("access token expired and no refresh token is available"),
            }
        }

        Ok(current.authorization_header())
    }

    async fn execute_echoed(&self, request: Request, sink: &EchoSink) -> Result<Response, AuthError> {
        echo(sink, &format_request(&request));

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                echo(sink, format!("[response]\nERROR: {e}\n").as_bytes());
                return Err(e.into());
            }
        };

        echo(sink, &format_response_head(&response));
        Ok(replay_echoed(response, Arc::clone(sink)))
    }
}

// ---------------------------------------------------------------------------
// Echo formatting
// ---------------------------------------------------------------------------

/// Request line, headers and (buffered) body between `[request]` markers.
fn format_request(request: &Request) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"\n[request]\n");
    out.extend_from_slice(
        format!("{} {} {:?}\r\n", request.method(), request.url(), request.version()).as_bytes(),
    );
    write_headers(&mut out, request.headers());
    if let Some(body) = request.body() {
        out.extend_from_slice(body.as_bytes().unwrap_or(&b"<streaming body>"[..]));
    }
    out.extend_from_slice(b"\n[/request]\n");
    out
}

/// `name: value` lines plus the blank separator line.  Sensitive values
/// (the bearer credential) are not echoed.
fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        if value.is_sensitive() {
            out.extend_from_slice(b"<redacted>");
        } else {
            out.extend_from_slice(value.as_bytes());
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

fn format_response_head(response: &Response) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"[response]\n");
    out.extend_from_slice(format!("{:?} {}\r\n", response.version(), response.status()).as_bytes());
    write_headers(&mut out, response.headers());
    out
}

/// Rebuild `response` so its body is echoed as the caller reads it.
///
/// The closing `[/response]` marker is written when the body is exhausted.
fn replay_echoed(response: Response, sink: EchoSink) -> Response {
    let status = response.status();
    let version = response.version();
    let headers = response.headers().clone();

    let tail_sink = Arc::clone(&sink);
    let tail = stream::once(async move { echo(&tail_sink, b"\n[/response]\n") })
        .filter_map(|()| future::ready(None::<Result<Bytes, reqwest::Error>>));
    let body = Tee::new(Box::pin(response.bytes_stream()), EchoWriter(sink)).chain(tail);

    let mut rebuilt = http::Response::new(reqwest::Body::wrap_stream(body));
    *rebuilt.status_mut() = status;
    *rebuilt.version_mut() = version;
    *rebuilt.headers_mut() = headers;
    Response::from(rebuilt)
}
