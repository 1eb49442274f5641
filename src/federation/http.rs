//! HTTP client capability
//!
//! The federation core only needs `GET` and `POST` with custom headers and
//! raw response bytes. Production code uses [`ReqwestClient`]; tests plug in
//! recording stubs.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode, header};

use super::target::TargetPolicy;
use crate::error::AppError;

/// Media type of ActivityStreams documents
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Media type sent on outbound ActivityPub payloads
pub const ACTIVITY_JSON_HEADER: &str = "application/activity+json; charset=utf-8";

/// JSON-LD media type with the ActivityStreams profile
pub const JSON_LD_HEADER: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Media type of host-meta documents
pub const XRD_XML: &str = "application/xrd+xml";

/// WebFinger JRD media type
pub const JRD_JSON: &str = "application/jrd+json";

const MAX_REDIRECTS: usize = 5;

/// Redirect the target policy refused to follow
#[derive(Debug, thiserror::Error)]
#[error("redirect to {0} refused by target policy")]
struct RedirectRefused(String);

/// Raw response from a remote server
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body (empty if none)
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `Content-Type` header value, if any
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outbound HTTP capability used by the resolver and the dispatcher
#[async_trait]
pub trait FederationClient: Send + Sync {
    /// Issue a GET request with the given headers.
    ///
    /// # Errors
    /// `AppError::Transport` on connection, TLS or timeout failures. Non-2xx
    /// statuses are returned as responses, not errors.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, AppError>;

    /// Issue a POST request with the given headers, body and content type.
    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<HttpResponse, AppError>;
}

/// [`FederationClient`] backed by `reqwest`
#[derive(Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with the given user agent and request timeout.
    ///
    /// Redirects are followed only to hosts `policy` accepts as remote
    /// targets; a refused redirect fails the request with
    /// `AppError::ForbiddenTarget`.
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        policy: TargetPolicy,
    ) -> Result<Self, AppError> {
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            let allowed = attempt
                .url()
                .host_str()
                .is_some_and(|host| policy.check_remote_host(host).is_ok());
            if !allowed {
                let target = attempt.url().to_string();
                attempt.error(RedirectRefused(target))
            } else if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });

        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(redirect_policy)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self { inner })
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse, AppError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl FederationClient for ReqwestClient {
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<HttpResponse, AppError> {
        let response = self
            .inner
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;

        Self::into_response(response).await
    }

    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<HttpResponse, AppError> {
        let response = self
            .inner
            .post(url)
            .headers(headers)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;

        Self::into_response(response).await
    }
}

/// Map a failed request to `ForbiddenTarget` when the target policy stopped
/// a redirect, `Transport` otherwise.
fn request_error(method: &str, url: &str, error: reqwest::Error) -> AppError {
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        if let Some(refused) = cause.downcast_ref::<RedirectRefused>() {
            return AppError::ForbiddenTarget(format!(
                "{} {} redirected to {}",
                method, url, refused.0
            ));
        }
        source = cause.source();
    }
    AppError::Transport(format!("{} {} failed: {}", method, url, error))
}

/// Build a header map with a single `Accept` header.
pub fn accept_headers(accept: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, http::HeaderValue::from_static(accept));
    headers
}
