//! Inbound HTTP Signature authentication
//!
//! Checks the `Date` and `Signature` headers of a request from a remote
//! server and verifies the signature with the key advertised by the
//! signing actor. All header checks run before any network request.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Request, header};

use super::cache::ProfileCache;
use super::crypto;
use super::resolver::ActorResolver;
use super::signature::{
    actor_url_from_key_id, build_signing_string, parse_http_date, parse_signature_header,
};
use crate::error::AppError;

/// Default accepted clock difference between sender and receiver (12 hours)
pub const DEFAULT_MAX_DATE_SKEW_SECONDS: u64 = 43_200;

/// Verifies signed inbound requests
#[derive(Clone)]
pub struct SignatureAuthenticator {
    resolver: ActorResolver,
    cache: Option<Arc<dyn ProfileCache>>,
    max_skew_seconds: i64,
}

impl SignatureAuthenticator {
    pub fn new(
        resolver: ActorResolver,
        cache: Option<Arc<dyn ProfileCache>>,
        max_skew_seconds: u64,
    ) -> Self {
        Self {
            resolver,
            cache,
            max_skew_seconds: i64::try_from(max_skew_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Authenticate `request`.
    ///
    /// # Errors
    /// - `Unauthorized("missing signature")` without a `Signature` header
    /// - `BadRequest("missing date")` without a `Date` header
    /// - `BadRequest` for an unparsable date, `BadRequest("stale")` when the
    ///   date is too far from now in either direction
    /// - `Unauthorized("invalid signature format")` for a malformed header
    /// - resolution errors for the signing actor, `LengthRequired` for an
    ///   empty key
    /// - `Unauthorized("signature mismatch")` when verification fails
    pub async fn authenticate<B>(&self, request: &Request<B>) -> Result<(), AppError> {
        self.authenticate_parts(request.method(), request.uri().path(), request.headers())
            .await
    }

    /// Authenticate a request given as method, path and headers.
    pub async fn authenticate_parts(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<(), AppError> {
        let result = self.verify(method, path, headers, Utc::now()).await;

        let label = if result.is_ok() { "success" } else { "failure" };
        crate::metrics::SIGNATURE_VERIFICATIONS_TOTAL
            .with_label_values(&[label])
            .inc();

        result
    }

    async fn verify(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // 1. Required headers
        let signature_header = headers
            .get("signature")
            .ok_or_else(|| AppError::Unauthorized("missing signature".to_string()))?;
        let date_header = headers
            .get(header::DATE)
            .ok_or_else(|| AppError::BadRequest("missing date".to_string()))?;

        // 2. Date is recent, in either direction
        let date = date_header
            .to_str()
            .ok()
            .and_then(parse_http_date)
            .ok_or_else(|| AppError::BadRequest("invalid date".to_string()))?;
        self.check_skew(date, now)?;

        // 3. Signature parameters
        let signature_header = signature_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("invalid signature format".to_string()))?;
        let params = parse_signature_header(signature_header)?;

        // 4. Signer's key
        let actor_url = actor_url_from_key_id(&params.key_id);
        let identity = self
            .resolver
            .fetch_public_identity(actor_url, self.cache.as_deref())
            .await?;

        // 5. Signature over the live request headers
        let signing_string = build_signing_string(method.as_str(), path, &params.headers, headers);
        let signature = BASE64
            .decode(params.signature_base64.as_bytes())
            .map_err(|_| AppError::Unauthorized("signature mismatch".to_string()))?;

        if !crypto::verify(
            signing_string.as_bytes(),
            &signature,
            &identity.public_key_pem,
        )? {
            tracing::warn!(actor = %actor_url, key_id = %params.key_id, "Signature mismatch");
            return Err(AppError::Unauthorized("signature mismatch".to_string()));
        }

        tracing::info!(actor = %actor_url, key_id = %params.key_id, "Verified HTTP signature");
        Ok(())
    }

    fn check_skew(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
        let skew = (now - date).num_seconds().abs();
        if skew > self.max_skew_seconds {
            tracing::debug!(skew, max = self.max_skew_seconds, "Rejected stale request date");
            return Err(AppError::BadRequest("stale".to_string()));
        }
        Ok(())
    }
}
