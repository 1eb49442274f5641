//! host-meta and WebFinger
//!
//! Discovery runs in two hops: the host's `/.well-known/host-meta` names a
//! WebFinger URL template, and the WebFinger document for
//! `acct:user@host` links to the actor's ActivityPub profile.

use serde::{Deserialize, Serialize};

use super::http::ACTIVITY_JSON;
use crate::error::AppError;

/// Placeholder substituted in host-meta templates
const URI_PLACEHOLDER: &str = "{uri}";

/// WebFinger JRD response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebFingerResponse {
    pub subject: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl WebFingerResponse {
    /// `href` of the first link typed as an ActivityStreams document.
    ///
    /// Types carrying parameters (`application/activity+json; charset=utf-8`)
    /// match on the media type alone.
    pub fn activity_profile_url(&self) -> Option<&str> {
        self.links
            .iter()
            .filter(|link| {
                link.link_type
                    .as_deref()
                    .and_then(|t| t.split(';').next())
                    .map(|t| t.trim().eq_ignore_ascii_case(ACTIVITY_JSON))
                    .unwrap_or(false)
            })
            .find_map(|link| link.href.as_deref())
    }
}

fn attribute_value<'a>(element: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = element;
    while let Some(index) = rest.find(name) {
        let before = rest[..index].chars().last();
        let after = &rest[index + name.len()..];
        rest = after;

        if !before.map(char::is_whitespace).unwrap_or(false) {
            continue;
        }
        let Some(after_eq) = after.trim_start().strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();
        let quote = after_eq.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &after_eq[1..];
        let end = value.find(quote)?;
        return Some(&value[..end]);
    }
    None
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Extract the WebFinger URL template from a host-meta XRD body.
///
/// The first `<Link>` element whose `template` attribute contains `{uri}`
/// wins.
///
/// # Errors
/// `AppError::DiscoveryFailed` if no such element exists.
pub fn extract_webfinger_template(host_meta: &str) -> Result<String, AppError> {
    for (index, _) in host_meta.match_indices("<Link") {
        let element = &host_meta[index..];
        let Some(end) = element.find('>') else {
            break;
        };
        let element = &element[..end];

        if let Some(template) = attribute_value(element, "template") {
            let template = unescape_xml(template);
            if template.contains(URI_PLACEHOLDER) {
                return Ok(template);
            }
        }
    }

    Err(AppError::DiscoveryFailed(
        "host-meta has no <Link> with a {uri} template".to_string(),
    ))
}

/// Build the WebFinger query URL for `acct:{username}@{host}`.
pub fn build_webfinger_url(template: &str, username: &str, host: &str) -> String {
    let resource = format!("acct:{}@{}", username, host);
    template.replace(URI_PLACEHOLDER, &resource)
}

/// Split a WebFinger `resource` parameter into username and domain.
///
/// Accepts `acct:user@domain` and bare `user@domain`; a leading `@` on the
/// user part is ignored.
pub fn parse_acct(resource: &str) -> Option<(String, String)> {
    let account = resource.strip_prefix("acct:").unwrap_or(resource);
    let account = account.strip_prefix('@').unwrap_or(account);
    let (username, domain) = account.split_once('@')?;
    if username.is_empty() || domain.is_empty() {
        return None;
    }
    Some((username.to_string(), domain.to_ascii_lowercase()))
}

/// Generate host-meta XRD for this instance.
pub fn generate_host_meta(base_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0">
  <Link rel="lrdd" type="application/xrd+xml" template="{}/.well-known/webfinger?resource={{uri}}"/>
</XRD>
"#,
        base_url.trim_end_matches('/')
    )
}

/// Generate WebFinger response for a local account.
///
/// # Arguments
/// * `username` - Local username
/// * `domain` - Instance domain
/// * `base_url` - Instance base URL (includes protocol)
pub fn generate_webfinger_response(
    username: &str,
    domain: &str,
    base_url: &str,
) -> WebFingerResponse {
    let subject = format!("acct:{}@{}", username, domain);
    let actor_url = format!("{}/users/{}", base_url.trim_end_matches('/'), username);

    WebFingerResponse {
        subject,
        aliases: vec![actor_url.clone()],
        links: vec![
            WebFingerLink {
                rel: "self".to_string(),
                link_type: Some(ACTIVITY_JSON.to_string()),
                href: Some(actor_url.clone()),
                template: None,
            },
            WebFingerLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                link_type: Some("text/html".to_string()),
                href: Some(actor_url),
                template: None,
            },
        ],
    }
}
