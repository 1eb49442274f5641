//! Fedikit - HTTP Signatures, actor discovery and signed delivery for
//! ActivityPub federation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - host-meta / WebFinger for the local actor                │
//! │  - Actor document, signed inboxes                           │
//! │  - Metrics                                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - SignatureAuthenticator (inbound)                         │
//! │  - ActorResolver (host-meta → WebFinger → profile)          │
//! │  - FederationDispatcher (outbound, signed)                  │
//! │  - Digest / RSA primitives, target policy                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for discovery and ActivityPub
//! - `federation`: signatures, discovery, delivery
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod error;
pub mod federation;
pub mod metrics;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use federation::{
    ActorResolver, DeliveryResult, FederationClient, FederationDispatcher, KeyPair,
    MemoryProfileCache, NativeActor, ProfileCache, ReqwestClient, SignatureAuthenticator,
    TargetPolicy,
};

/// RSA modulus size for generated actor keys
const ACTOR_KEY_BITS: usize = 2048;

/// The actor this instance serves, with its signing keys
#[derive(Debug, Clone)]
pub struct LocalActor {
    pub username: String,
    pub display_name: String,
    pub summary: String,
    pub keys: KeyPair,
    /// Creation time of the key pair
    pub published: DateTime<Utc>,
}

impl LocalActor {
    /// Load the actor's key pair from disk, generating it on first start.
    ///
    /// # Errors
    /// Returns error if the key files cannot be read, written or parsed
    pub fn load_or_generate(config: &config::ActorConfig) -> Result<Self, error::AppError> {
        let private_path = &config.private_key_path;
        let public_path = &config.public_key_path;

        let keys = if private_path.exists() && public_path.exists() {
            let keys = KeyPair {
                private_key_pem: read_pem(private_path)?,
                public_key_pem: read_pem(public_path)?,
            };
            federation::crypto::parse_private_key(&keys.private_key_pem)?;
            federation::crypto::parse_public_key(&keys.public_key_pem)?;
            tracing::info!(path = %private_path.display(), "Loaded actor key pair");
            keys
        } else {
            tracing::info!(
                path = %private_path.display(),
                bits = ACTOR_KEY_BITS,
                "Generating actor key pair"
            );
            let keys = federation::crypto::generate_keypair(ACTOR_KEY_BITS)?;
            write_pem(private_path, &keys.private_key_pem)?;
            write_pem(public_path, &keys.public_key_pem)?;
            keys
        };

        let published = std::fs::metadata(public_path)
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::now()));

        Ok(Self {
            username: config.username.clone(),
            display_name: config.display_name.clone(),
            summary: config.summary.clone(),
            keys,
            published,
        })
    }

    /// Actor URL under `base_url`
    pub fn actor_url(&self, base_url: &str) -> String {
        format!("{}/users/{}", base_url.trim_end_matches('/'), self.username)
    }

    /// Key ID other servers use to fetch this actor's public key
    pub fn key_id(&self, base_url: &str) -> String {
        format!("{}#main-key", self.actor_url(base_url))
    }

    /// Actor document served at [`LocalActor::actor_url`]
    pub fn document(&self, base_url: &str) -> Result<NativeActor, error::AppError> {
        NativeActor::local(
            base_url,
            &self.username,
            &self.display_name,
            &self.summary,
            &self.keys.public_key_pem,
            self.published,
        )
    }
}

fn read_pem(path: &Path) -> Result<String, error::AppError> {
    std::fs::read_to_string(path).map_err(|e| {
        error::AppError::Config(format!("Failed to read key {}: {}", path.display(), e))
    })
}

fn write_pem(path: &Path, pem: &str) -> Result<(), error::AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            error::AppError::Config(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    std::fs::write(path, pem).map_err(|e| {
        error::AppError::Config(format!("Failed to write key {}: {}", path.display(), e))
    })
}

/// Application state shared across all handlers
///
/// This struct is cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Actor served by this instance
    pub local_actor: Arc<LocalActor>,

    /// Remote actor profiles (volatile)
    pub profile_cache: Arc<MemoryProfileCache>,

    /// Remote actor discovery
    pub resolver: ActorResolver,

    /// Inbound HTTP Signature checks
    pub authenticator: SignatureAuthenticator,

    /// Signed outbound delivery
    pub dispatcher: FederationDispatcher,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Load or generate the local actor's keys
    /// 2. Build the outbound HTTP client
    /// 3. Wire resolver, authenticator and dispatcher
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let local_actor = LocalActor::load_or_generate(&config.actor)?;

        let policy = TargetPolicy::from_config(config.federation.allow_local_targets);
        let client = ReqwestClient::new(
            &config.federation.user_agent,
            config.federation.request_timeout(),
            policy,
        )?;

        let state = Self::with_policy(config, local_actor, Arc::new(client), policy);
        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Build state around an existing HTTP client.
    pub fn with_client(
        config: config::AppConfig,
        local_actor: LocalActor,
        client: Arc<dyn FederationClient>,
    ) -> Self {
        let policy = TargetPolicy::from_config(config.federation.allow_local_targets);
        Self::with_policy(config, local_actor, client, policy)
    }

    fn with_policy(
        config: config::AppConfig,
        local_actor: LocalActor,
        client: Arc<dyn FederationClient>,
        policy: TargetPolicy,
    ) -> Self {
        let profile_cache = Arc::new(MemoryProfileCache::new(
            Some(Duration::from_secs(config.cache.profile_ttl)),
            config.cache.max_profiles,
        ));
        let resolver = ActorResolver::new(client.clone(), policy);
        let authenticator = SignatureAuthenticator::new(
            resolver.clone(),
            Some(profile_cache.clone() as Arc<dyn ProfileCache>),
            config.federation.max_date_skew_seconds,
        );
        let dispatcher =
            FederationDispatcher::new(client, config.federation.signing_padding, policy);

        Self {
            config: Arc::new(config),
            local_actor: Arc::new(local_actor),
            profile_cache,
            resolver,
            authenticator,
            dispatcher,
        }
    }

    /// Sweep expired profiles from the cache every `period`.
    ///
    /// The task runs until the returned handle is aborted or the runtime
    /// shuts down. `period` must be non-zero.
    pub fn spawn_cache_pruning(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.profile_cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.prune_expired().await;
            }
        })
    }

    /// Deliver `activity` to `inboxes`, signed as the local actor.
    pub async fn federate<T, S>(&self, activity: &T, inboxes: &[S]) -> Vec<DeliveryResult>
    where
        T: Serialize + Sync + ?Sized,
        S: AsRef<str> + Sync,
    {
        let key_id = self.local_actor.key_id(&self.config.server.base_url());
        self.dispatcher
            .federate(
                activity,
                inboxes,
                &key_id,
                &self.local_actor.keys.private_key_pem,
            )
            .await
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower::ServiceBuilder;
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    /// Largest accepted inbound activity
    const MAX_BODY_BYTES: usize = 1024 * 1024;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
