//! API layer
//!
//! HTTP handlers for:
//! - Discovery (host-meta, WebFinger)
//! - ActivityPub (actor document, signed inboxes)
//! - Metrics (Prometheus)

mod activitypub;
pub mod metrics;
mod wellknown;

pub use activitypub::{ActivityJson, activitypub_router, require_signature};
pub use metrics::metrics_router;
pub use wellknown::wellknown_router;
