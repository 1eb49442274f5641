//! Outbound target policy (SSRF guard)
//!
//! Remote documents choose which URLs we fetch next (host-meta templates,
//! WebFinger links, inbox addresses). None of them may steer us at
//! loopback or multicast addresses.

use std::net::IpAddr;

use crate::error::AppError;

fn is_loopback_or_multicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_multicast() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_loopback_or_multicast(IpAddr::V4(mapped));
            }
            v6.is_loopback() || v6.is_multicast() || v6.is_unspecified()
        }
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
    }
}

fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn is_localhost_name(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost")
}

/// True if `host` names loopback (including `localhost`) or is a multicast
/// or unspecified IP literal.
pub fn is_internal_host(host: &str) -> bool {
    let normalized = normalize_host(host);
    if is_localhost_name(&normalized) {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_loopback_or_multicast)
        .unwrap_or(false)
}

/// True if `host` is internal or a private/link-local IP literal.
pub fn is_local_host(host: &str) -> bool {
    if is_internal_host(host) {
        return true;
    }

    normalize_host(host)
        .parse::<IpAddr>()
        .map(is_private)
        .unwrap_or(false)
}

/// Which remote targets the federation layer may contact
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetPolicy {
    allow_local: bool,
}

impl TargetPolicy {
    /// Production policy: local and internal targets are always refused.
    pub fn strict() -> Self {
        Self { allow_local: false }
    }

    /// Policy for local development.
    ///
    /// Only debug builds honour `allow_local`; release builds log a warning
    /// and fall back to [`TargetPolicy::strict`].
    pub fn from_config(allow_local: bool) -> Self {
        if allow_local && !cfg!(debug_assertions) {
            tracing::warn!(
                "federation.allow_local_targets is ignored in release builds; using strict target policy"
            );
            return Self::strict();
        }

        if allow_local {
            tracing::warn!("Local federation targets allowed (development only)");
        }

        Self { allow_local }
    }

    /// Reject actor URLs pointing at loopback or private hosts.
    pub fn check_actor_host(&self, host: &str) -> Result<(), AppError> {
        if !self.allow_local && is_local_host(host) {
            return Err(AppError::ForbiddenTarget(format!(
                "Actor host {} is a local address",
                host
            )));
        }
        Ok(())
    }

    /// Reject hosts derived from remote documents that point at loopback or
    /// multicast addresses.
    pub fn check_remote_host(&self, host: &str) -> Result<(), AppError> {
        if !self.allow_local && is_internal_host(host) {
            return Err(AppError::ForbiddenTarget(format!(
                "Remote host {} is a loopback or multicast address",
                host
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_multicast_literals_are_internal() {
        assert!(is_internal_host("127.0.0.1"));
        assert!(is_internal_host("127.10.0.3"));
        assert!(is_internal_host("224.0.0.1"));
        assert!(is_internal_host("[::1]"));
        assert!(is_internal_host("ff02::1"));
        assert!(is_internal_host("::ffff:127.0.0.1"));
        assert!(is_internal_host("0.0.0.0"));
        assert!(is_internal_host("LOCALHOST."));
        assert!(is_internal_host("api.localhost"));
    }

    #[test]
    fn public_hosts_are_not_internal() {
        assert!(!is_internal_host("example.com"));
        assert!(!is_internal_host("93.184.216.34"));
        assert!(!is_internal_host("2606:2800:220:1::"));
    }

    #[test]
    fn private_ranges_are_local_but_not_internal() {
        assert!(is_local_host("192.168.1.10"));
        assert!(is_local_host("10.0.0.1"));
        assert!(is_local_host("fd00::1"));
        assert!(!is_internal_host("192.168.1.10"));
    }

    #[test]
    fn strict_policy_rejects_local_actor_hosts() {
        let policy = TargetPolicy::strict();
        assert!(matches!(
            policy.check_actor_host("localhost"),
            Err(AppError::ForbiddenTarget(_))
        ));
        assert!(matches!(
            policy.check_actor_host("192.168.1.10"),
            Err(AppError::ForbiddenTarget(_))
        ));
        assert!(policy.check_actor_host("mastodon.social").is_ok());
    }

    #[test]
    fn strict_policy_rejects_internal_remote_hosts() {
        let policy = TargetPolicy::strict();
        assert!(matches!(
            policy.check_remote_host("127.0.0.1"),
            Err(AppError::ForbiddenTarget(_))
        ));
        assert!(matches!(
            policy.check_remote_host("239.255.255.250"),
            Err(AppError::ForbiddenTarget(_))
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn relaxed_policy_allows_local_hosts_in_debug_builds() {
        let policy = TargetPolicy::from_config(true);
        assert!(policy.check_actor_host("localhost").is_ok());
        assert!(policy.check_remote_host("127.0.0.1").is_ok());
    }
}
