//! # Leadership Gate
//!
//! Only the sidecar colocated with the cluster's Raft leader may mutate the
//! keyring. Exclusivity comes from a cluster-agreed fact (who leads), not
//! from a lock, because every sidecar is an independent process.

use crate::keyring::LeaderSource;
use crate::observability::metrics;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Decides whether this instance may issue mutating keyring calls
#[derive(Clone)]
pub struct LeadershipGate {
    source: Arc<dyn LeaderSource>,
    identity: IpAddr,
    timeout: Duration,
}

impl std::fmt::Debug for LeadershipGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadershipGate")
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LeadershipGate {
    pub fn new(source: Arc<dyn LeaderSource>, identity: IpAddr, timeout: Duration) -> Self {
        Self {
            source,
            identity,
            timeout,
        }
    }

    pub fn identity(&self) -> IpAddr {
        self.identity
    }

    /// True only when the current leader's host is this pod
    ///
    /// Errors, timeouts, an empty leader and unparsable addresses all deny.
    pub async fn is_authorized(&self) -> bool {
        let leader = match tokio::time::timeout(self.timeout, self.source.leader()).await {
            Ok(Ok(leader)) => leader,
            Ok(Err(e)) => {
                warn!(error = %e, "Unable to determine cluster leader, staying passive");
                metrics::increment_leadership_checks("unknown");
                return false;
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Leader lookup timed out, staying passive");
                metrics::increment_leadership_checks("unknown");
                return false;
            }
        };

        match leader_host(&leader) {
            Some(host) if host == self.identity => {
                debug!(leader = %leader, "This pod is colocated with the cluster leader");
                metrics::increment_leadership_checks("leader");
                true
            }
            Some(_) => {
                debug!(leader = %leader, identity = %self.identity, "Not the leader, staying passive");
                metrics::increment_leadership_checks("follower");
                false
            }
            None => {
                debug!(leader = %leader, "Cluster has no usable leader address, staying passive");
                metrics::increment_leadership_checks("unknown");
                false
            }
        }
    }
}

/// Extract the host of a `host:port` leader address
///
/// Accepts `10.0.0.1:8300`, `[fd00::1]:8300` and bare addresses.
pub fn leader_host(address: &str) -> Option<IpAddr> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return Some(socket.ip());
    }
    if let Ok(ip) = address.trim_start_matches('[').trim_end_matches(']').parse() {
        return Some(ip);
    }
    address
        .rsplit_once(':')
        .and_then(|(host, _)| host.parse().ok())
}
