//! HTTP Signatures wire format
//!
//! Parsing and formatting of the `Signature` and `Date` headers and
//! reconstruction of the signing string, shared by the inbound
//! authenticator and the outbound dispatcher so both sides agree byte for
//! byte. See https://docs.joinmastodon.org/spec/security/

use chrono::{DateTime, NaiveDateTime, Utc};
use http::HeaderMap;

use crate::error::AppError;

/// `Date` header format (RFC 2616, always GMT)
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Pseudo-header naming the request method and path
pub const REQUEST_TARGET: &str = "(request-target)";

/// Headers signed on every outbound delivery, in signing order
pub const OUTBOUND_SIGNED_HEADERS: [&str; 4] = [REQUEST_TARGET, "host", "date", "digest"];

const INVALID_FORMAT: &str = "invalid signature format";

/// Parsed `Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaderParams {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Signed header names, lowercased, in signing order
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature_base64: String,
}

/// Split `header` into `name="value"` pairs.
///
/// Returns `None` on anything that is not a comma separated list of quoted
/// pairs.
fn quoted_pairs(header: &str) -> Option<Vec<(&str, &str)>> {
    let mut pairs = Vec::new();
    let mut rest = header.trim();

    while !rest.is_empty() {
        let (name, after_name) = rest.split_once('=')?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let after_quote = after_name.trim_start().strip_prefix('"')?;
        let end = after_quote.find('"')?;
        pairs.push((name, &after_quote[..end]));

        rest = after_quote[end + 1..].trim_start();
        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix(',')?.trim_start();
        if rest.is_empty() {
            return None;
        }
    }

    Some(pairs)
}

/// Parse a `Signature` header value.
///
/// # Format
/// ```text
/// keyId="...",headers="...",signature="..."
/// ```
///
/// The three fields must appear in this order and none may be empty. An
/// `algorithm` field, as sent by Mastodon, is accepted and ignored; any
/// other field fails the parse.
///
/// # Errors
/// `AppError::Unauthorized("invalid signature format")`
pub fn parse_signature_header(header: &str) -> Result<SignatureHeaderParams, AppError> {
    let invalid = || AppError::Unauthorized(INVALID_FORMAT.to_string());

    let pairs = quoted_pairs(header).ok_or_else(invalid)?;
    let fields: Vec<(&str, &str)> = pairs
        .into_iter()
        .filter(|(name, _)| *name != "algorithm")
        .collect();

    let [("keyId", key_id), ("headers", headers), ("signature", signature)] = fields.as_slice()
    else {
        return Err(invalid());
    };

    let headers = split_header_list(headers);
    if key_id.is_empty() || headers.is_empty() || signature.is_empty() {
        return Err(invalid());
    }

    Ok(SignatureHeaderParams {
        key_id: key_id.to_string(),
        headers,
        signature_base64: signature.to_string(),
    })
}

/// Format a `Signature` header value.
pub fn format_signature_header(key_id: &str, headers: &[&str], signature_base64: &str) -> String {
    format!(
        "keyId=\"{}\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers.join(" "),
        signature_base64
    )
}

/// Split a signed-headers list on whitespace and commas.
pub fn split_header_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|name| !name.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Format `time` for a `Date` header.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse a `Date` header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Actor URL owning `key_id`: everything before the first `#`.
pub fn actor_url_from_key_id(key_id: &str) -> &str {
    key_id.split('#').next().unwrap_or(key_id)
}

/// Reconstruct the signing string for `names` over `headers`.
///
/// `(request-target)` becomes `{method} {path}` with the method lowercased.
/// Names missing from `headers` are skipped.
pub fn build_signing_string<S: AsRef<str>>(
    method: &str,
    path: &str,
    names: &[S],
    headers: &HeaderMap,
) -> String {
    let mut lines = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        if name == REQUEST_TARGET {
            lines.push(format!(
                "{}: {} {}",
                REQUEST_TARGET,
                method.to_ascii_lowercase(),
                path
            ));
            continue;
        }

        if let Some(value) = headers.get(name) {
            lines.push(format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())));
        }
    }

    lines.join("\n")
}
