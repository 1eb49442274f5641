//! ActivityPub endpoints
//!
//! - Actor profile
//! - Inbox (signed activity receiving)

use axum::body::{Body, Bytes};
use axum::{
    Router,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::crypto::digest_header;
use crate::federation::http::ACTIVITY_JSON_HEADER;
use crate::metrics::{ACTIVITIES_RECEIVED_TOTAL, FEDERATION_REQUESTS_TOTAL};

/// JSON body served as `application/activity+json; charset=utf-8`
pub struct ActivityJson<T>(pub T);

impl<T: Serialize> IntoResponse for ActivityJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => ([(header::CONTENT_TYPE, ACTIVITY_JSON_HEADER)], body).into_response(),
            Err(e) => AppError::Internal(e.into()).into_response(),
        }
    }
}

/// Create ActivityPub router
///
/// Routes:
/// - GET /users/:username - Actor profile
/// - POST /users/:username/inbox - Personal inbox
/// - POST /inbox - Shared inbox
///
/// Both inboxes require a valid HTTP Signature.
pub fn activitypub_router(state: AppState) -> Router<AppState> {
    let inboxes = Router::new()
        .route("/users/:username/inbox", post(inbox))
        .route("/inbox", post(shared_inbox))
        .route_layer(middleware::from_fn_with_state(state, require_signature));

    Router::new()
        .route("/users/:username", get(actor))
        .merge(inboxes)
}

/// Middleware rejecting requests without a valid HTTP Signature
///
/// # Usage
/// ```ignore
/// let signed_routes = Router::new()
///     .route("/inbox", post(handler))
///     .route_layer(middleware::from_fn_with_state(state, require_signature));
/// ```
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    if let Err(error) = state
        .authenticator
        .authenticate_parts(&parts.method, parts.uri.path(), &parts.headers)
        .await
    {
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["inbound", error.error_type()])
            .inc();
        tracing::info!(path = %parts.uri.path(), %error, "Rejected inbound request");
        return Err(error);
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// GET /users/:username
///
/// Returns the local actor document.
///
/// Content-Type: application/activity+json
async fn actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    if username != state.local_actor.username {
        return Err(AppError::NotFound);
    }

    let document = state
        .local_actor
        .document(&state.config.server.base_url())?;
    Ok(ActivityJson(document).into_response())
}

/// POST /users/:username/inbox
async fn inbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    if username != state.local_actor.username {
        return Err(AppError::NotFound);
    }
    accept_activity(&headers, &body)
}

/// POST /inbox
async fn shared_inbox(headers: HeaderMap, body: Bytes) -> Result<StatusCode, AppError> {
    accept_activity(&headers, &body)
}

/// Check and record an authenticated activity.
///
/// Activities are acknowledged, not processed.
fn accept_activity(headers: &HeaderMap, body: &[u8]) -> Result<StatusCode, AppError> {
    // Digest is optional; when sent it must match the body.
    if let Some(digest) = headers.get("digest").and_then(|v| v.to_str().ok()) {
        if digest.starts_with("SHA-256=") && digest != digest_header(body) {
            return Err(AppError::BadRequest("digest mismatch".to_string()));
        }
    }

    let activity: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let activity_type = activity
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("Unknown");
    let actor = activity
        .get("actor")
        .and_then(|a| a.as_str())
        .unwrap_or_default();

    ACTIVITIES_RECEIVED_TOTAL
        .with_label_values(&[activity_type])
        .inc();
    FEDERATION_REQUESTS_TOTAL
        .with_label_values(&["inbound", "accepted"])
        .inc();
    tracing::info!(activity_type, actor, "Accepted activity");

    Ok(StatusCode::ACCEPTED)
}
