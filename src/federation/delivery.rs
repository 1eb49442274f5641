//! Activity delivery
//!
//! Signs an activity with the local actor's key and POSTs it to each remote
//! inbox. Inboxes are handled one after another in the order given; a failure
//! at one inbox is logged and never stops delivery to the rest.

use std::sync::Arc;
use std::time::Instant;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use http::{HeaderMap, HeaderValue, header};
use rsa::RsaPrivateKey;
use serde::Serialize;
use url::Url;

use super::crypto::{self, SignaturePadding};
use super::http::{ACTIVITY_JSON_HEADER, FederationClient, HttpResponse};
use super::signature::{
    OUTBOUND_SIGNED_HEADERS, build_signing_string, format_http_date, format_signature_header,
};
use super::target::TargetPolicy;
use crate::error::AppError;

/// Addressing sentinel for public activities; never a real inbox
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// What happened at one inbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Inbox answered 2xx
    Delivered { status: u16 },
    /// Inbox answered with a non-2xx status
    Rejected { status: u16 },
    /// Request could not be signed or sent
    Failed { error: String },
    /// URL is not a deliverable inbox
    Skipped { reason: String },
}

/// Result of a delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Target inbox URI, as given
    pub inbox_uri: String,
    pub outcome: DeliveryOutcome,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

/// Where and how to POST for one inbox
#[derive(Debug, Clone, PartialEq, Eq)]
struct InboxTarget {
    url: String,
    /// `Host` header value; includes the port when the URL names one
    host: String,
    path: String,
}

/// Headers and body shared by every inbox of one `federate` call
struct SignedPayload<'a> {
    body: Vec<u8>,
    date: String,
    digest: String,
    key_id: &'a str,
    private_key: RsaPrivateKey,
}

/// Signs and delivers activities to remote inboxes
#[derive(Clone)]
pub struct FederationDispatcher {
    client: Arc<dyn FederationClient>,
    padding: SignaturePadding,
    policy: TargetPolicy,
}

impl FederationDispatcher {
    /// Create a dispatcher.
    ///
    /// # Arguments
    /// * `client` - Outbound HTTP client
    /// * `padding` - RSA padding for signatures (PKCS#1 v1.5 for Mastodon
    ///   compatibility)
    /// * `policy` - Which inbox hosts may be contacted
    pub fn new(
        client: Arc<dyn FederationClient>,
        padding: SignaturePadding,
        policy: TargetPolicy,
    ) -> Self {
        Self {
            client,
            padding,
            policy,
        }
    }

    /// Deliver `payload` to every inbox in `remote_inboxes`.
    ///
    /// Never fails as a whole: each inbox gets its own [`DeliveryResult`], in
    /// input order. Failures are logged and not retried.
    ///
    /// # Arguments
    /// * `payload` - Activity to deliver; serialized with sorted keys
    /// * `remote_inboxes` - Inbox URLs
    /// * `key_id` - Full URL to the public key (actor#main-key)
    /// * `private_key_pem` - RSA private key in PEM format
    pub async fn federate<T, S>(
        &self,
        payload: &T,
        remote_inboxes: &[S],
        key_id: &str,
        private_key_pem: &str,
    ) -> Vec<DeliveryResult>
    where
        T: Serialize + ?Sized,
        S: AsRef<str>,
    {
        let signed = match Self::prepare(payload, key_id, private_key_pem) {
            Ok(signed) => signed,
            Err(error) => {
                tracing::error!(%error, key_id = %key_id, "Cannot sign activity; nothing delivered");
                return remote_inboxes
                    .iter()
                    .map(|inbox| DeliveryResult {
                        inbox_uri: inbox.as_ref().to_string(),
                        outcome: DeliveryOutcome::Failed {
                            error: error.to_string(),
                        },
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(remote_inboxes.len());
        for inbox in remote_inboxes {
            let inbox = inbox.as_ref();
            let outcome = match self.inbox_target(inbox) {
                Ok(target) => self.deliver(&target, &signed).await,
                Err(reason) => {
                    tracing::debug!(inbox = %inbox, %reason, "Skipping inbox");
                    DeliveryOutcome::Skipped { reason }
                }
            };
            results.push(DeliveryResult {
                inbox_uri: inbox.to_string(),
                outcome,
            });
        }

        let delivered = results.iter().filter(|r| r.is_delivered()).count();
        tracing::info!(
            delivered,
            attempted = results.len(),
            "Batch delivery complete"
        );

        results
    }

    fn prepare<'a, T: Serialize + ?Sized>(
        payload: &T,
        key_id: &'a str,
        private_key_pem: &str,
    ) -> Result<SignedPayload<'a>, AppError> {
        let body = canonical_json(payload)?;
        let private_key = crypto::parse_private_key(private_key_pem)?;

        Ok(SignedPayload {
            digest: crypto::digest_header(&body),
            date: format_http_date(chrono::Utc::now()),
            body,
            key_id,
            private_key,
        })
    }

    /// Validate `inbox` as a delivery target, or give the reason to skip it.
    fn inbox_target(&self, inbox: &str) -> Result<InboxTarget, String> {
        if inbox == PUBLIC_COLLECTION {
            return Err("public collection".to_string());
        }

        let url = Url::parse(inbox).map_err(|e| format!("invalid URL: {}", e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(format!("unsupported scheme {}", url.scheme()));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => return Err("no host".to_string()),
        };

        let path = url.path();
        if path.is_empty() || path == "/" {
            return Err("no path".to_string());
        }

        self.policy
            .check_remote_host(&host)
            .map_err(|e| e.to_string())?;

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };

        Ok(InboxTarget {
            url: inbox.to_string(),
            host,
            path: path.to_string(),
        })
    }

    async fn deliver(&self, target: &InboxTarget, signed: &SignedPayload<'_>) -> DeliveryOutcome {
        use crate::metrics::{FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

        let headers = match self.signed_headers(target, signed) {
            Ok(headers) => headers,
            Err(error) => {
                tracing::error!(inbox = %target.url, %error, "Failed to sign delivery");
                return DeliveryOutcome::Failed {
                    error: error.to_string(),
                };
            }
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&target.url, headers, signed.body.clone(), ACTIVITY_JSON_HEADER)
            .await;
        FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["outbound"])
            .observe(started.elapsed().as_secs_f64());

        match response {
            Ok(response) if response.is_success() => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["outbound", "success"])
                    .inc();
                tracing::info!(inbox = %target.url, status = %response.status, "Delivered activity");
                DeliveryOutcome::Delivered {
                    status: response.status.as_u16(),
                }
            }
            Ok(response) => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["outbound", "failure"])
                    .inc();
                log_rejection(&target.url, &response);
                DeliveryOutcome::Rejected {
                    status: response.status.as_u16(),
                }
            }
            Err(error) => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["outbound", "error"])
                    .inc();
                tracing::warn!(inbox = %target.url, %error, "Delivery failed");
                DeliveryOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    fn signed_headers(
        &self,
        target: &InboxTarget,
        signed: &SignedPayload<'_>,
    ) -> Result<HeaderMap, AppError> {
        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid header value {:?}: {}", v, e)))
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, value(&target.host)?);
        headers.insert(header::DATE, value(&signed.date)?);
        headers.insert("digest", value(&signed.digest)?);

        let signing_string =
            build_signing_string("post", &target.path, &OUTBOUND_SIGNED_HEADERS, &headers);
        let signature =
            crypto::sign_with_key(signing_string.as_bytes(), &signed.private_key, self.padding)?;
        let signature_header = format_signature_header(
            signed.key_id,
            &OUTBOUND_SIGNED_HEADERS,
            &BASE64.encode(signature),
        );
        headers.insert("signature", value(&signature_header)?);

        Ok(headers)
    }
}

/// Serialize `payload` with object keys in sorted order.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, AppError> {
    use anyhow::Context;

    let value = serde_json::to_value(payload).context("Failed to serialize activity")?;
    let body = serde_json::to_vec(&value).context("Failed to serialize activity")?;
    Ok(body)
}

fn log_rejection(inbox: &str, response: &HttpResponse) {
    let is_json = response
        .content_type()
        .is_some_and(|content_type| content_type.contains("json"));
    let json_body = if is_json {
        serde_json::from_slice::<serde_json::Value>(&response.body).ok()
    } else {
        None
    };

    match json_body {
        Some(body) => {
            tracing::warn!(inbox = %inbox, status = %response.status, %body, "Inbox rejected activity");
        }
        None => {
            tracing::warn!(
                inbox = %inbox,
                status = %response.status,
                body = %response.text_lossy(),
                "Inbox rejected activity"
            );
        }
    }
}
