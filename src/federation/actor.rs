//! Actor profile documents
//!
//! Remote servers publish actors in one of two layouts: the full native
//! schema (the one this crate serves for its own actors) or the looser
//! Mastodon-compatible schema. Which one a document follows is only known by
//! trying to decode it; callers work with the common [`ActorProfile`]
//! projections.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::either::{Context, ContextItem, Either};
use crate::error::AppError;

/// ActivityStreams context IRI
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// Security vocabulary context IRI (publicKey terms)
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v1";

/// Public key advertised by an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    /// Key ID, usually `{actor}#main-key`
    #[serde(rename = "id")]
    pub key_id: String,
    /// Actor that owns the key
    #[serde(rename = "owner")]
    pub owner_uri: String,
    /// PEM-encoded RSA public key
    #[serde(rename = "publicKeyPem")]
    pub public_key_pem: String,
}

/// Native actor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    Person,
    Team,
    Service,
}

/// Image attached to an actor (avatar, header)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(rename = "type")]
    pub media_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub url: String,
}

/// Profile metadata field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub value: String,
}

/// Actor in the native schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeActor {
    #[serde(rename = "@context")]
    pub context: Context,
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: Url,
    pub following: Url,
    pub followers: Url,
    pub liked: Url,
    pub inbox: Url,
    pub outbox: Url,
    pub url: Url,
    pub preferred_username: String,
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Media>,
    #[serde(default)]
    pub group: bool,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    pub public_key: PublicIdentity,
    #[serde(default = "default_true")]
    pub indexable: bool,
    #[serde(default = "default_true")]
    pub discoverable: bool,
    #[serde(default)]
    pub manually_approves_followers: bool,
    #[serde(default)]
    pub memorial: bool,
    #[serde(default)]
    pub endpoints: BTreeMap<String, Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Media>,
    #[serde(default)]
    pub tag: Vec<Url>,
    #[serde(default)]
    pub attachment: Vec<PropertyValue>,
    pub published: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Url>,
}

fn default_true() -> bool {
    true
}

impl NativeActor {
    /// Actor document for a local user served at `{base_url}/users/{username}`.
    pub fn local(
        base_url: &str,
        username: &str,
        display_name: &str,
        summary: &str,
        public_key_pem: &str,
        published: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let actor_url = format!("{}/users/{}", base_url.trim_end_matches('/'), username);
        let parse = |suffix: &str| {
            Url::parse(&format!("{}{}", actor_url, suffix))
                .map_err(|e| AppError::Config(format!("Invalid actor URL {}: {}", actor_url, e)))
        };
        let id = parse("")?;
        let shared_inbox = Url::parse(&format!("{}/inbox", base_url.trim_end_matches('/')))
            .map_err(|e| AppError::Config(format!("Invalid base URL {}: {}", base_url, e)))?;

        let mut endpoints = BTreeMap::new();
        endpoints.insert("sharedInbox".to_string(), shared_inbox);

        Ok(Self {
            context: Either::Right(vec![
                ContextItem::Left(ACTIVITYSTREAMS_CONTEXT.to_string()),
                ContextItem::Left(SECURITY_CONTEXT.to_string()),
            ]),
            actor_type: ActorType::Person,
            following: parse("/following")?,
            followers: parse("/followers")?,
            liked: parse("/liked")?,
            inbox: parse("/inbox")?,
            outbox: parse("/outbox")?,
            url: id.clone(),
            preferred_username: username.to_string(),
            name: display_name.to_string(),
            summary: summary.to_string(),
            icon: None,
            group: false,
            followers_count: 0,
            following_count: 0,
            public_key: PublicIdentity {
                key_id: format!("{}#main-key", actor_url),
                owner_uri: actor_url.clone(),
                public_key_pem: public_key_pem.to_string(),
            },
            indexable: true,
            discoverable: true,
            manually_approves_followers: false,
            memorial: false,
            endpoints,
            image: None,
            tag: Vec::new(),
            attachment: Vec::new(),
            published,
            devices: None,
            id,
        })
    }
}

/// Mastodon `endpoints` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MastodonEndpoints {
    #[serde(default)]
    pub shared_inbox: Option<String>,
}

/// Actor in the Mastodon-compatible schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MastodonActor {
    pub id: String,
    #[serde(rename = "type")]
    pub actor_type: String,
    pub preferred_username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub inbox: String,
    pub outbox: String,
    pub followers: String,
    pub following: String,
    #[serde(default)]
    pub featured: Option<String>,
    #[serde(default)]
    pub featured_tags: Option<String>,
    #[serde(default)]
    pub endpoints: Option<MastodonEndpoints>,
    pub public_key: PublicIdentity,
    #[serde(default)]
    pub manually_approves_followers: Option<bool>,
    #[serde(default)]
    pub discoverable: Option<bool>,
    #[serde(default)]
    pub indexable: Option<bool>,
    #[serde(default)]
    pub memorial: Option<bool>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub icon: Option<Media>,
    #[serde(default)]
    pub image: Option<Media>,
    #[serde(default)]
    pub tag: Vec<serde_json::Value>,
    #[serde(default)]
    pub attachment: Vec<Either<PropertyValue, serde_json::Value>>,
    #[serde(default)]
    pub devices: Option<String>,
}

/// Which schema a profile decoded as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileVariant {
    Native,
    Mastodon,
}

/// Remote actor profile, decoded as whichever schema matched
#[derive(Debug, Clone, PartialEq)]
pub enum ActorProfile {
    Native(Box<NativeActor>),
    Mastodon(Box<MastodonActor>),
}

impl ActorProfile {
    /// Decode a profile document.
    ///
    /// The native schema is tried first; if it does not fit, the Mastodon
    /// schema is tried.
    ///
    /// # Errors
    /// `AppError::ProfileDecodeFailed` carrying the native-schema error when
    /// neither schema matches.
    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        let native_error = match serde_json::from_slice::<NativeActor>(bytes) {
            Ok(actor) => return Ok(ActorProfile::Native(Box::new(actor))),
            Err(e) => e,
        };

        match serde_json::from_slice::<MastodonActor>(bytes) {
            Ok(actor) => {
                tracing::debug!(
                    native_error = %native_error,
                    "Profile decoded with the Mastodon-compatible schema"
                );
                Ok(ActorProfile::Mastodon(Box::new(actor)))
            }
            Err(_) => Err(AppError::ProfileDecodeFailed(native_error.to_string())),
        }
    }

    pub fn variant(&self) -> ProfileVariant {
        match self {
            ActorProfile::Native(_) => ProfileVariant::Native,
            ActorProfile::Mastodon(_) => ProfileVariant::Mastodon,
        }
    }

    /// The actor's advertised public key
    pub fn public_identity(&self) -> &PublicIdentity {
        match self {
            ActorProfile::Native(actor) => &actor.public_key,
            ActorProfile::Mastodon(actor) => &actor.public_key,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ActorProfile::Native(actor) => actor.id.as_str(),
            ActorProfile::Mastodon(actor) => &actor.id,
        }
    }

    pub fn inbox(&self) -> &str {
        match self {
            ActorProfile::Native(actor) => actor.inbox.as_str(),
            ActorProfile::Mastodon(actor) => &actor.inbox,
        }
    }

    /// Shared inbox, when the actor's server offers one
    pub fn shared_inbox(&self) -> Option<&str> {
        match self {
            ActorProfile::Native(actor) => actor.endpoints.get("sharedInbox").map(Url::as_str),
            ActorProfile::Mastodon(actor) => actor
                .endpoints
                .as_ref()
                .and_then(|endpoints| endpoints.shared_inbox.as_deref()),
        }
    }

    pub fn preferred_username(&self) -> &str {
        match self {
            ActorProfile::Native(actor) => &actor.preferred_username,
            ActorProfile::Mastodon(actor) => &actor.preferred_username,
        }
    }

    /// Display name; `None` when the actor left it empty
    pub fn display_name(&self) -> Option<&str> {
        let name = match self {
            ActorProfile::Native(actor) => Some(actor.name.as_str()),
            ActorProfile::Mastodon(actor) => actor.name.as_deref(),
        };
        name.filter(|name| !name.is_empty())
    }
}
