//! Well-known endpoints
//!
//! - /.well-known/host-meta
//! - /.well-known/webfinger

use axum::{
    Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::http::{JRD_JSON, XRD_XML};
use crate::federation::webfinger::{generate_host_meta, generate_webfinger_response, parse_acct};

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/host-meta
/// - GET /.well-known/webfinger
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/host-meta", get(host_meta))
        .route("/.well-known/webfinger", get(webfinger))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: String,
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for the local actor.
///
/// Query: ?resource=acct:user@domain
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Response, AppError> {
    let (username, domain) = parse_acct(&query.resource)
        .ok_or_else(|| AppError::BadRequest("Invalid acct resource".to_string()))?;

    if !domain.eq_ignore_ascii_case(&state.config.server.domain)
        || username != state.local_actor.username
    {
        return Err(AppError::NotFound);
    }

    let jrd = generate_webfinger_response(
        &username,
        &state.config.server.domain,
        &state.config.server.base_url(),
    );

    Ok(([(header::CONTENT_TYPE, JRD_JSON)], Json(jrd)).into_response())
}

/// GET /.well-known/host-meta
///
/// Returns host-meta XML for WebFinger discovery.
async fn host_meta(State(state): State<AppState>) -> impl IntoResponse {
    let xml = generate_host_meta(&state.config.server.base_url());
    ([(header::CONTENT_TYPE, XRD_XML)], xml)
}
