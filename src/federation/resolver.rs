//! Actor resolution
//!
//! Resolves a bare actor URL to its profile document:
//!
//! ```text
//! actor URL ──► /.well-known/host-meta ──► WebFinger template
//!           ──► WebFinger acct:user@host ──► activity+json link
//!           ──► profile document (native or Mastodon schema)
//! ```
//!
//! Every URL after the first comes from a remote document and passes the
//! [`TargetPolicy`] before it is fetched.

use std::sync::Arc;
use std::time::Instant;

use url::Url;

use super::actor::{ActorProfile, PublicIdentity};
use super::cache::ProfileCache;
use super::http::{FederationClient, HttpResponse, JSON_LD_HEADER, XRD_XML, accept_headers};
use super::target::TargetPolicy;
use super::webfinger::{WebFingerResponse, build_webfinger_url, extract_webfinger_template};
use crate::error::AppError;

/// Actor URL broken into the parts discovery needs
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActorLocation {
    scheme: String,
    /// Host plus `:port` when the URL names a non-default port
    authority: String,
    host: String,
    username: String,
}

impl ActorLocation {
    fn parse(actor_url: &str) -> Result<Self, AppError> {
        let parsed = Url::parse(actor_url)
            .map_err(|e| AppError::InvalidActor(format!("{}: {}", actor_url, e)))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(AppError::InvalidActor(format!(
                "Unsupported actor URL scheme: {}",
                scheme
            )));
        }

        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| AppError::InvalidActor(format!("Missing host in {}", actor_url)))?
            .to_ascii_lowercase();

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };

        let username = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(|segment| segment.trim_start_matches('@').to_string())
            .filter(|username| !username.is_empty())
            .ok_or_else(|| {
                AppError::InvalidActor(format!("No username in actor URL {}", actor_url))
            })?;

        Ok(Self {
            scheme: scheme.to_string(),
            authority,
            host,
            username,
        })
    }

    fn host_meta_url(&self) -> String {
        format!("{}://{}/.well-known/host-meta", self.scheme, self.authority)
    }
}

/// Resolves remote actors through host-meta and WebFinger
#[derive(Clone)]
pub struct ActorResolver {
    client: Arc<dyn FederationClient>,
    policy: TargetPolicy,
}

impl ActorResolver {
    /// Create a resolver using `client` for every outbound request.
    pub fn new(client: Arc<dyn FederationClient>, policy: TargetPolicy) -> Self {
        Self { client, policy }
    }

    /// Resolve `actor_url` to its profile.
    ///
    /// Checks `cache` first and fills it on success. Cache errors are
    /// logged and otherwise ignored.
    ///
    /// # Errors
    /// - `InvalidActor` if the URL cannot be used for discovery
    /// - `ForbiddenTarget` if a local or internal host is involved
    /// - `DiscoveryFailed` if host-meta or WebFinger cannot be fetched or parsed
    /// - `ProfileNotFound` if WebFinger has no activity+json link
    /// - `ProfileDecodeFailed` if the profile matches neither schema
    pub async fn resolve(
        &self,
        actor_url: &str,
        cache: Option<&dyn ProfileCache>,
    ) -> Result<ActorProfile, AppError> {
        if let Some(cache) = cache {
            match cache.get(actor_url).await {
                Ok(Some(profile)) => return Ok(profile),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(actor = %actor_url, %error, "Profile cache lookup failed");
                }
            }
        }

        let started = Instant::now();
        let profile = self.discover(actor_url).await;
        crate::metrics::FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["resolve"])
            .observe(started.elapsed().as_secs_f64());
        let profile = profile?;

        if let Some(cache) = cache {
            if let Err(error) = cache.put(actor_url, profile.clone()).await {
                tracing::warn!(actor = %actor_url, %error, "Failed to cache actor profile");
            }
        }

        Ok(profile)
    }

    /// Resolve `actor_url` and return its public key.
    ///
    /// # Errors
    /// `LengthRequired` if the profile advertises an empty key, plus every
    /// error of [`ActorResolver::resolve`].
    pub async fn fetch_public_identity(
        &self,
        actor_url: &str,
        cache: Option<&dyn ProfileCache>,
    ) -> Result<PublicIdentity, AppError> {
        let profile = self.resolve(actor_url, cache).await?;
        let identity = profile.public_identity().clone();

        if identity.public_key_pem.trim().is_empty() {
            return Err(AppError::LengthRequired(format!(
                "Public key was empty for {}",
                actor_url
            )));
        }

        Ok(identity)
    }

    async fn discover(&self, actor_url: &str) -> Result<ActorProfile, AppError> {
        let location = ActorLocation::parse(actor_url)?;
        self.policy.check_actor_host(&location.host)?;

        // 1. host-meta names the WebFinger endpoint
        let host_meta_url = location.host_meta_url();
        let host_meta = self.fetch(&host_meta_url, XRD_XML).await?;
        let host_meta_body = String::from_utf8(host_meta.body).map_err(|_| {
            AppError::DiscoveryFailed(format!("host-meta at {} is not UTF-8", host_meta_url))
        })?;
        let template = extract_webfinger_template(&host_meta_body)?;

        // 2. WebFinger links to the profile
        let webfinger_url =
            build_webfinger_url(&template, &location.username, &location.authority);
        self.check_remote_url(&webfinger_url)?;

        tracing::info!(webfinger = %webfinger_url, "WebFinger lookup");
        let webfinger = self.fetch(&webfinger_url, JSON_LD_HEADER).await?;
        let webfinger: WebFingerResponse = serde_json::from_slice(&webfinger.body)
            .map_err(|e| AppError::DiscoveryFailed(format!("Invalid WebFinger document: {}", e)))?;

        let profile_url = webfinger.activity_profile_url().ok_or_else(|| {
            AppError::ProfileNotFound(format!(
                "No activity profile link for {} in WebFinger response",
                webfinger.subject
            ))
        })?;
        self.check_remote_url(profile_url)?;

        // 3. Profile document
        tracing::info!(profile = %profile_url, "Fetching actor profile");
        let profile = self.fetch(profile_url, JSON_LD_HEADER).await?;
        ActorProfile::decode(&profile.body)
    }

    fn check_remote_url(&self, url: &str) -> Result<(), AppError> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::DiscoveryFailed(format!("Invalid URL {}: {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::DiscoveryFailed(format!(
                "Unsupported URL scheme in {}",
                url
            )));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::DiscoveryFailed(format!("Missing host in {}", url)))?;
        self.policy.check_remote_host(host)
    }

    async fn fetch(&self, url: &str, accept: &'static str) -> Result<HttpResponse, AppError> {
        use crate::metrics::FEDERATION_REQUESTS_TOTAL;

        let response = match self.client.get(url, accept_headers(accept)).await {
            Ok(response) => response,
            Err(error) => {
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["fetch", "error"])
                    .inc();
                return Err(match error {
                    // Redirect refused by the client's target policy
                    AppError::ForbiddenTarget(_) => error,
                    other => {
                        AppError::DiscoveryFailed(format!("GET {} failed: {}", url, other))
                    }
                });
            }
        };

        if !response.is_success() {
            FEDERATION_REQUESTS_TOTAL
                .with_label_values(&["fetch", "failure"])
                .inc();
            return Err(AppError::DiscoveryFailed(format!(
                "GET {} returned HTTP {}",
                url, response.status
            )));
        }

        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&["fetch", "success"])
            .inc();
        Ok(response)
    }
}
