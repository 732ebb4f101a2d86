use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gsupload_auth::{
    AuthConfig, AuthError, BrowserOpener, ClientFactory, ClientIdentity, CredentialSource,
    ProviderEndpoints, TokenRecord, TokenStore,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stands in for the user's browser: hands the URL to the test instead.
struct ChannelOpener(mpsc::UnboundedSender<String>);

impl BrowserOpener for ChannelOpener {
    fn name(&self) -> &str {
        "test channel"
    }

    fn open(&self, url: &str) -> io::Result<()> {
        self.0
            .send(url.to_string())
            .map_err(|_| io::Error::other("test receiver dropped"))
    }
}

struct Harness {
    provider: MockServer,
    cache: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            provider: MockServer::start().await,
            cache: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self, cache_tokens: bool) -> AuthConfig {
        AuthConfig {
            endpoints: ProviderEndpoints {
                auth_url: format!("{}/o/oauth2/auth", self.provider.uri()),
                token_url: format!("{}/o/oauth2/token", self.provider.uri()),
            },
            cache_tokens,
            cache_dir: Some(self.cache.path().to_path_buf()),
            ..AuthConfig::default()
        }
    }

    fn factory(&self, cache_tokens: bool) -> (ClientFactory, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = ClientFactory::new(self.config(cache_tokens))
            .with_openers(vec![Box::new(ChannelOpener(tx))])
            .with_prompt_sink(Arc::new(Mutex::new(Box::new(io::sink()))));
        (factory, rx)
    }

    fn store(&self) -> TokenStore {
        TokenStore::new(self.cache.path(), true)
    }

    async fn mock_exchange(&self, code: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/o/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "refresh_token": "1//refresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&self.provider)
            .await;
    }
}

fn identity() -> ClientIdentity {
    ClientIdentity::new("abc", "xyz", "s1")
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

/// Answer the redirect the way the provider would after consent.
async fn approve(q: &HashMap<String, String>, code: &str) -> StatusCode {
    callback(&q["redirect_uri"], &[("state", q["state"].as_str()), ("code", code)]).await
}

async fn callback(redirect_uri: &str, params: &[(&str, &str)]) -> StatusCode {
    reqwest::Client::new()
        .get(redirect_uri)
        .query(params)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn first_run_authorizes_and_caches_the_token() {
    let harness = Harness::new().await;
    harness.mock_exchange("CODE1", "ACCESS1").await;
    let (factory, mut opened) = harness.factory(true);

    let pending = tokio::spawn(async move { factory.get_client(&identity()).await });

    let auth_url = opened.recv().await.unwrap();
    assert!(auth_url.contains("scope=s1"));
    let q = query(&auth_url);
    assert_eq!(q["client_id"], "abc");
    assert_eq!(q["access_type"], "offline");

    let status = approve(&q, "CODE1").await;
    assert_eq!(status, StatusCode::OK);

    let client = pending.await.unwrap().unwrap();
    assert_eq!(client.token().await.access_token, "ACCESS1");

    let cached = harness.store().load(&identity().cache_key()).unwrap();
    assert_eq!(cached.access_token, "ACCESS1");
    assert_eq!(cached.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn cached_token_skips_the_browser() {
    let harness = Harness::new().await;
    let cached = TokenRecord {
        access_token: "ACCESS1".into(),
        refresh_token: Some("1//refresh".into()),
        expiry: None,
        token_type: "Bearer".into(),
    };
    harness.store().save(&identity().cache_key(), &cached).unwrap();
    let (factory, mut opened) = harness.factory(true);

    let client = factory.get_client(&identity()).await.unwrap();

    assert_eq!(client.token().await, cached);
    assert!(opened.try_recv().is_err(), "browser must not be opened");
}

#[tokio::test]
async fn wrong_state_keeps_the_flow_waiting() {
    let harness = Harness::new().await;
    harness.mock_exchange("CODE1", "ACCESS1").await;
    let (factory, mut opened) = harness.factory(true);

    let pending = tokio::spawn(async move { factory.get_client(&identity()).await });
    let q = query(&opened.recv().await.unwrap());
    let redirect_uri = &q["redirect_uri"];

    let status = callback(redirect_uri, &[("state", "wrong"), ("code", "EVIL")]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let status = reqwest::get(format!("{redirect_uri}/favicon.ico")).await.unwrap().status();
    assert_eq!(status, StatusCode::NOT_FOUND);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished(), "flow must still be waiting");

    let status = approve(&q, "CODE1").await;
    assert_eq!(status, StatusCode::OK);

    let client = pending.await.unwrap().unwrap();
    assert_eq!(client.token().await.access_token, "ACCESS1");
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let harness = Harness::new().await;
    let (factory, mut opened) = harness.factory(true);
    let missing = harness.cache.path().join("clientid.dat");

    let err = match factory
        .client_for(
            &CredentialSource::new(None, &missing),
            &CredentialSource::new(None, &missing),
            "s1",
        )
        .await
    {
        Ok(_) => panic!("expected a configuration error"),
        Err(e) => e,
    };

    assert!(matches!(err, AuthError::Configuration(_)));
    assert!(opened.try_recv().is_err());
    assert!(harness.provider.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_cache_always_runs_the_flow() {
    let harness = Harness::new().await;
    let stale = TokenRecord {
        access_token: "CACHED".into(),
        refresh_token: None,
        expiry: None,
        token_type: "Bearer".into(),
    };
    harness.store().save(&identity().cache_key(), &stale).unwrap();
    harness.mock_exchange("CODE2", "FRESH").await;
    let (factory, mut opened) = harness.factory(false);

    let pending = tokio::spawn(async move { factory.get_client(&identity()).await });
    let q = query(&opened.recv().await.unwrap());
    approve(&q, "CODE2").await;

    let client = pending.await.unwrap().unwrap();
    assert_eq!(client.token().await.access_token, "FRESH");

    // Caching disabled: the file on disk is untouched.
    let on_disk = harness.store().load(&identity().cache_key()).unwrap();
    assert_eq!(on_disk.access_token, "CACHED");
}

#[tokio::test]
async fn rejected_exchange_is_fatal() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&harness.provider)
        .await;
    let (factory, mut opened) = harness.factory(true);

    let pending = tokio::spawn(async move { factory.get_client(&identity()).await });
    let q = query(&opened.recv().await.unwrap());
    approve(&q, "BAD").await;

    let err = match pending.await.unwrap() {
        Ok(_) => panic!("expected the exchange to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, AuthError::Exchange(ref msg) if msg.contains("invalid_grant")));
    assert!(harness.store().load(&identity().cache_key()).is_err());
}

#[tokio::test]
async fn denied_consent_ends_the_flow() {
    let harness = Harness::new().await;
    let (factory, mut opened) = harness.factory(true);

    let pending = tokio::spawn(async move { factory.get_client(&identity()).await });
    let q = query(&opened.recv().await.unwrap());
    let status = callback(
        &q["redirect_uri"],
        &[("state", q["state"].as_str()), ("error", "access_denied")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let err = match pending.await.unwrap() {
        Ok(_) => panic!("expected a denial"),
        Err(e) => e,
    };
    assert!(matches!(err, AuthError::AuthorizationDenied(_)));
}
