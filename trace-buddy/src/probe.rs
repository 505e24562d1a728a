use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// What a single bounded-TTL probe found out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Some device answered, either a router on the way or the target itself.
    Responder(IpAddr),
    /// Nobody answered in time. Expected for filtered hops, not a failure.
    NoResponse,
    /// The probe could not be carried out at all.
    Error(String),
}

/// Runs one reachability probe with a limited TTL.
///
/// Implementations must bound the probe by `timeout` (reporting [ProbeOutcome::NoResponse] when
/// it expires) and must release every process or socket they opened before returning, including
/// when `stop` is cancelled or the returned future is dropped.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(
        &self,
        target: &str,
        ttl: u8,
        timeout: Duration,
        stop: &CancellationToken,
    ) -> ProbeOutcome;
}
