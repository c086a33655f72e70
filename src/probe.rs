//! Bounded-latency reachability check for the online tier.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Decides whether the online tier is worth attempting.
///
/// A positive answer is only a hint: the synthesis call itself can still fail
/// and the orchestrator handles that separately.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self, candidates: &[(String, u16)], timeout_per_attempt: Duration)
        -> bool;
}

/// Plain TCP connect against each candidate in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_reachable(
        &self,
        candidates: &[(String, u16)],
        timeout_per_attempt: Duration,
    ) -> bool {
        for (host, port) in candidates {
            // Name resolution counts against the same per-attempt budget.
            let attempt = TcpStream::connect((host.as_str(), *port));
            match tokio::time::timeout(timeout_per_attempt, attempt).await {
                Ok(Ok(_)) => {
                    log::debug!("Reached {host}:{port}");
                    return true;
                }
                Ok(Err(e)) => log::debug!("Probe {host}:{port} failed: {e}"),
                Err(_) => log::debug!(
                    "Probe {host}:{port} timed out after {}ms",
                    timeout_per_attempt.as_millis()
                ),
            }
        }
        false
    }
}

/// Fixed answer, for forced-offline operation and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_reachable(&self, _candidates: &[(String, u16)], _timeout: Duration) -> bool {
        self.0
    }
}
