//! ActivityPub federation module
//!
//! Handles:
//! - Digest and RSA signature primitives
//! - Actor discovery (host-meta, WebFinger, profile documents)
//! - Actor profile caching
//! - Inbound HTTP Signature authentication
//! - Signed activity delivery
//! - Outbound target policy (SSRF guard)

pub mod actor;
mod authenticator;
mod cache;
pub mod crypto;
mod delivery;
mod either;
pub mod http;
mod resolver;
pub mod signature;
mod target;
pub mod webfinger;

pub use actor::{ActorProfile, MastodonActor, NativeActor, ProfileVariant, PublicIdentity};
pub use authenticator::{DEFAULT_MAX_DATE_SKEW_SECONDS, SignatureAuthenticator};
#[cfg(test)]
pub use cache::MockProfileCache;
pub use cache::{CacheStats, MemoryProfileCache, ProfileCache};
pub use crypto::{KeyPair, SignaturePadding};
pub use delivery::{
    DeliveryOutcome, DeliveryResult, FederationDispatcher, PUBLIC_COLLECTION, canonical_json,
};
pub use either::{Context, ContextItem, Either};
pub use http::{FederationClient, HttpResponse, ReqwestClient};
pub use resolver::ActorResolver;
pub use signature::{SignatureHeaderParams, parse_signature_header};
pub use target::{TargetPolicy, is_internal_host, is_local_host};
