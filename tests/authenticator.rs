//! Inbound HTTP Signature authentication

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{RecordingClient, RemoteActor};
use fedikit::error::AppError;
use fedikit::federation::crypto::SignaturePadding;
use fedikit::federation::{
    ActorResolver, DEFAULT_MAX_DATE_SKEW_SECONDS, MemoryProfileCache, ProfileCache,
    SignatureAuthenticator, TargetPolicy,
};
use http::{HeaderValue, Method, Request};

const INBOX_PATH: &str = "/users/testuser/inbox";
const BODY: &[u8] = br#"{"type":"Follow","actor":"https://remote.example/users/alice"}"#;

fn authenticator(
    client: &Arc<RecordingClient>,
    cache: Option<Arc<dyn ProfileCache>>,
) -> SignatureAuthenticator {
    let resolver = ActorResolver::new(client.clone(), TargetPolicy::strict());
    SignatureAuthenticator::new(resolver, cache, DEFAULT_MAX_DATE_SKEW_SECONDS)
}

fn request(headers: http::HeaderMap) -> Request<()> {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri(format!("https://local.example{}", INBOX_PATH))
        .body(())
        .expect("request");
    *request.headers_mut() = headers;
    request
}

#[tokio::test]
async fn accepts_correctly_signed_request_under_both_paddings() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);
    let auth = authenticator(&client, None);

    for padding in [SignaturePadding::Pkcs1v15, SignaturePadding::Pss] {
        let headers = alice.signed_headers(
            &Method::POST,
            INBOX_PATH,
            "local.example",
            Utc::now(),
            BODY,
            padding,
        );
        auth.authenticate(&request(headers))
            .await
            .unwrap_or_else(|e| panic!("{padding:?} signature should verify: {e}"));
    }
}

#[tokio::test]
async fn mastodon_profile_keys_verify() {
    let client = RecordingClient::new();
    let bob = RemoteActor::new("mastodon.example", "bob");
    bob.publish_profile(
        &client,
        common::mastodon_actor(&bob.base_url, "bob", &bob.keys.public_key_pem),
    );

    let headers = bob.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );
    authenticator(&client, None)
        .authenticate(&request(headers))
        .await
        .expect("mastodon-style actor verifies");
}

#[tokio::test]
async fn stale_dates_fail_even_with_valid_signature() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);
    let auth = authenticator(&client, None);

    for offset in [Duration::hours(13), Duration::hours(-13)] {
        let headers = alice.signed_headers(
            &Method::POST,
            INBOX_PATH,
            "local.example",
            Utc::now() + offset,
            BODY,
            SignaturePadding::Pkcs1v15,
        );
        let result = auth.authenticate(&request(headers)).await;
        assert!(
            matches!(result, Err(AppError::BadRequest(ref m)) if m == "stale"),
            "offset {offset} should be stale, got {result:?}"
        );
    }
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn dates_inside_the_window_are_accepted() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);

    let headers = alice.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now() - Duration::hours(11),
        BODY,
        SignaturePadding::Pkcs1v15,
    );
    authenticator(&client, None)
        .authenticate(&request(headers))
        .await
        .expect("11 hours of skew is tolerated");
}

#[tokio::test]
async fn malformed_signature_header_fails_before_any_network_call() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    let auth = authenticator(&client, None);

    for bad in [
        "keyId=\"k\"",
        "signature=\"abc\",headers=\"date\",keyId=\"k\"",
        "keyId=\"\",headers=\"date\",signature=\"abc\"",
        "Bearer token",
    ] {
        let mut headers = alice.signed_headers(
            &Method::POST,
            INBOX_PATH,
            "local.example",
            Utc::now(),
            BODY,
            SignaturePadding::Pkcs1v15,
        );
        headers.insert("signature", HeaderValue::from_static(bad));

        let result = auth.authenticate(&request(headers)).await;
        assert!(
            matches!(result, Err(AppError::Unauthorized(ref m)) if m == "invalid signature format"),
            "{bad:?} should be rejected as malformed"
        );
    }
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn tampered_header_is_signature_mismatch() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);

    let mut headers = alice.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );
    headers.insert("host", HeaderValue::from_static("evil.example"));

    let result = authenticator(&client, None)
        .authenticate(&request(headers))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "signature mismatch"));
}

#[tokio::test]
async fn signature_for_another_path_is_rejected() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);

    let headers = alice.signed_headers(
        &Method::POST,
        "/inbox",
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );

    let result = authenticator(&client, None)
        .authenticate(&request(headers))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "signature mismatch"));
}

#[tokio::test]
async fn key_from_another_actor_is_rejected() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    let mallory = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);

    // Same keyId as alice, signed with a different private key.
    let headers = mallory.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );

    let result = authenticator(&client, None)
        .authenticate(&request(headers))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "signature mismatch"));
}

#[tokio::test]
async fn undecodable_signature_is_mismatch() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);

    let mut headers = alice.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );
    let header = format!(
        "keyId=\"{}\",headers=\"(request-target) host date\",signature=\"***not base64***\"",
        alice.key_id()
    );
    headers.insert("signature", HeaderValue::from_str(&header).expect("header"));

    let result = authenticator(&client, None)
        .authenticate(&request(headers))
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "signature mismatch"));
}

#[tokio::test]
async fn missing_headers_map_to_their_errors() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    let auth = authenticator(&client, None);
    let signed = alice.signed_headers(
        &Method::POST,
        INBOX_PATH,
        "local.example",
        Utc::now(),
        BODY,
        SignaturePadding::Pkcs1v15,
    );

    let mut no_signature = signed.clone();
    no_signature.remove("signature");
    let result = auth.authenticate(&request(no_signature)).await;
    assert!(matches!(result, Err(AppError::Unauthorized(ref m)) if m == "missing signature"));

    let mut no_date = signed;
    no_date.remove("date");
    let result = auth.authenticate(&request(no_date)).await;
    assert!(matches!(result, Err(AppError::BadRequest(ref m)) if m == "missing date"));
}

#[tokio::test]
async fn signer_profile_is_cached_between_requests() {
    let client = RecordingClient::new();
    let alice = RemoteActor::new("remote.example", "alice");
    alice.publish(&client);
    let cache = Arc::new(MemoryProfileCache::new(None, 10));
    let auth = authenticator(&client, Some(cache.clone() as Arc<dyn ProfileCache>));

    for _ in 0..2 {
        let headers = alice.signed_headers(
            &Method::POST,
            INBOX_PATH,
            "local.example",
            Utc::now(),
            BODY,
            SignaturePadding::Pkcs1v15,
        );
        auth.authenticate(&request(headers)).await.expect("verifies");
    }

    assert_eq!(client.requests().len(), 3, "second request is served from cache");
    assert_eq!(cache.stats().await.valid_entries, 1);
}
