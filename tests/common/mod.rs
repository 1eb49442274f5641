//! Common test utilities for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use fedikit::error::AppError;
use fedikit::federation::crypto::{self, KeyPair, SignaturePadding};
use fedikit::federation::signature::{build_signing_string, format_http_date, format_signature_header};
use fedikit::federation::{FederationClient, HttpResponse, NativeActor};
use fedikit::{AppState, LocalActor, config};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// One request seen by [`RecordingClient`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
enum Route {
    Respond { status: StatusCode, body: Vec<u8> },
    Unreachable,
}

/// In-memory stand-in for remote servers
///
/// Serves canned responses by exact URL and records every request. URLs
/// without a route answer 404.
#[derive(Default)]
pub struct RecordingClient {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.routes.lock().expect("routes lock").insert(
            url.to_string(),
            Route::Respond {
                status,
                body: body.into(),
            },
        );
    }

    pub fn respond_json(&self, url: &str, body: &Value) {
        self.respond(url, 200, serde_json::to_vec(body).expect("json"));
    }

    /// Make `url` fail at the transport level.
    pub fn unreachable(&self, url: &str) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.to_string(), Route::Unreachable);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn posts(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::POST)
            .collect()
    }

    fn handle(&self, request: RecordedRequest) -> Result<HttpResponse, AppError> {
        let url = request.url.clone();
        self.requests.lock().expect("requests lock").push(request);

        let route = self.routes.lock().expect("routes lock").get(&url).cloned();
        match route {
            Some(Route::Respond { status, body }) => Ok(HttpResponse {
                status,
                headers: HeaderMap::new(),
                body,
            }),
            Some(Route::Unreachable) => {
                Err(AppError::Transport(format!("connection refused: {}", url)))
            }
            None => Ok(HttpResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Vec::new(),
            }),
        }
    }
}

#[async_trait]
impl FederationClient for RecordingClient {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, AppError> {
        self.handle(RecordedRequest {
            method: Method::GET,
            url: url.to_string(),
            headers,
            body: Vec::new(),
            content_type: None,
        })
    }

    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<HttpResponse, AppError> {
        self.handle(RecordedRequest {
            method: Method::POST,
            url: url.to_string(),
            headers,
            body,
            content_type: Some(content_type.to_string()),
        })
    }
}

/// Small RSA key pair; fine for tests, too weak for real use
pub fn test_keys() -> KeyPair {
    crypto::generate_keypair(1024).expect("key generation should work")
}

pub fn host_meta(base_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">
  <Link rel="lrdd" template="{}/.well-known/webfinger?resource={{uri}}"/>
</XRD>"#,
        base_url
    )
}

pub fn webfinger_jrd(subject: &str, profile_url: &str) -> Value {
    json!({
        "subject": subject,
        "aliases": [profile_url],
        "links": [
            {"rel": "http://webfinger.net/rel/profile-page", "type": "text/html", "href": profile_url},
            {"rel": "self", "type": "application/activity+json", "href": profile_url}
        ]
    })
}

pub fn native_actor(base_url: &str, username: &str, public_key_pem: &str) -> Value {
    let actor = NativeActor::local(
        base_url,
        username,
        username,
        "",
        public_key_pem,
        Utc::now(),
    )
    .expect("native actor");
    serde_json::to_value(actor).expect("actor json")
}

/// Mastodon-style actor; lacks `liked` so only the compatible schema fits
pub fn mastodon_actor(base_url: &str, username: &str, public_key_pem: &str) -> Value {
    let actor_url = format!("{}/users/{}", base_url, username);
    json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            "https://w3id.org/security/v1",
            {"toot": "http://joinmastodon.org/ns#", "discoverable": "toot:discoverable"}
        ],
        "id": actor_url,
        "type": "Person",
        "following": format!("{}/following", actor_url),
        "followers": format!("{}/followers", actor_url),
        "inbox": format!("{}/inbox", actor_url),
        "outbox": format!("{}/outbox", actor_url),
        "featured": format!("{}/collections/featured", actor_url),
        "preferredUsername": username,
        "name": "",
        "summary": "<p></p>",
        "url": format!("{}/@{}", base_url, username),
        "manuallyApprovesFollowers": false,
        "discoverable": true,
        "published": "2023-01-01T00:00:00Z",
        "publicKey": {
            "id": format!("{}#main-key", actor_url),
            "owner": actor_url,
            "publicKeyPem": public_key_pem
        },
        "tag": [],
        "attachment": [],
        "endpoints": {"sharedInbox": format!("{}/inbox", base_url)}
    })
}

/// A remote server hosting one actor, served through a [`RecordingClient`]
pub struct RemoteActor {
    pub base_url: String,
    pub host: String,
    pub username: String,
    pub keys: KeyPair,
}

impl RemoteActor {
    pub fn new(host: &str, username: &str) -> Self {
        Self {
            base_url: format!("https://{}", host),
            host: host.to_string(),
            username: username.to_string(),
            keys: test_keys(),
        }
    }

    pub fn actor_url(&self) -> String {
        format!("{}/users/{}", self.base_url, self.username)
    }

    pub fn key_id(&self) -> String {
        format!("{}#main-key", self.actor_url())
    }

    pub fn host_meta_url(&self) -> String {
        format!("{}/.well-known/host-meta", self.base_url)
    }

    pub fn webfinger_url(&self) -> String {
        format!(
            "{}/.well-known/webfinger?resource=acct:{}@{}",
            self.base_url, self.username, self.host
        )
    }

    /// Register host-meta, WebFinger and a native profile.
    pub fn publish(&self, client: &RecordingClient) {
        self.publish_profile(
            client,
            native_actor(&self.base_url, &self.username, &self.keys.public_key_pem),
        );
    }

    /// Register host-meta, WebFinger and `profile`.
    pub fn publish_profile(&self, client: &RecordingClient, profile: Value) {
        client.respond(&self.host_meta_url(), 200, host_meta(&self.base_url));
        client.respond_json(
            &self.webfinger_url(),
            &webfinger_jrd(
                &format!("acct:{}@{}", self.username, self.host),
                &self.actor_url(),
            ),
        );
        client.respond_json(&self.actor_url(), &profile);
    }

    /// Headers of a request from this actor, signed over `signed_headers`.
    pub fn signed_headers(
        &self,
        method: &Method,
        path: &str,
        local_host: &str,
        date: DateTime<Utc>,
        body: &[u8],
        padding: SignaturePadding,
    ) -> HeaderMap {
        let names = ["(request-target)", "host", "date", "digest"];

        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_str(local_host).expect("host"));
        headers.insert(
            "date",
            HeaderValue::from_str(&format_http_date(date)).expect("date"),
        );
        headers.insert(
            "digest",
            HeaderValue::from_str(&crypto::digest_header(body)).expect("digest"),
        );

        let signing_string = build_signing_string(method.as_str(), path, &names, &headers);
        let signature = crypto::sign(
            signing_string.as_bytes(),
            &self.keys.private_key_pem,
            padding,
        )
        .expect("signing works");
        let header = format_signature_header(&self.key_id(), &names, &BASE64.encode(signature));
        headers.insert("signature", HeaderValue::from_str(&header).expect("signature"));

        headers
    }
}

/// Configuration for a local instance at `https://local.example`
pub fn test_config(temp_dir: &TempDir) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            domain: "local.example".to_string(),
            protocol: "https".to_string(),
        },
        actor: config::ActorConfig {
            username: "testuser".to_string(),
            display_name: "Test User".to_string(),
            summary: "Test account".to_string(),
            private_key_path: temp_dir.path().join("private.pem"),
            public_key_path: temp_dir.path().join("public.pem"),
        },
        federation: config::FederationConfig {
            max_date_skew_seconds: 43_200,
            signing_padding: SignaturePadding::Pkcs1v15,
            allow_local_targets: false,
            request_timeout_seconds: 10,
            user_agent: "fedikit-test".to_string(),
        },
        cache: config::CacheConfig {
            profile_ttl: 86_400,
            max_profiles: 100,
            prune_interval_seconds: 300,
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Local actor for `config` with fresh test keys
pub fn test_local_actor(config: &config::AppConfig) -> LocalActor {
    LocalActor {
        username: config.actor.username.clone(),
        display_name: config.actor.display_name.clone(),
        summary: config.actor.summary.clone(),
        keys: test_keys(),
        published: Utc::now(),
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub remote: Arc<RecordingClient>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Start the router on a random port; remote servers are stubbed.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let local_actor = test_local_actor(&config);

        let remote = RecordingClient::new();
        let state = AppState::with_client(config, local_actor, remote.clone());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = fedikit::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            remote,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}
