use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use pulse_models::trace_event::{Hop, TraceEvent};
use pulse_models::trace_request::{RunId, RunState};
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::TraceError;
use crate::gateway::GatewayResolver;
use crate::probe::{ProbeExecutor, ProbeOutcome};

use super::Params;

/// Hop 1 is the gateway, which we know without probing.
pub const FIRST_PROBED_TTL: u8 = 2;

enum Finish {
    Completed,
    Cancelled,
}

/// State of one traceroute invocation. Owned by its task, which is the only writer of
/// `current_ttl` and the published state.
pub(super) struct Run {
    pub id: RunId,
    pub target: String,
    pub params: Params,
    pub executor: Arc<dyn ProbeExecutor>,
    pub gateway: Arc<dyn GatewayResolver>,
    pub sink: UnboundedSender<TraceEvent>,
    pub stop: CancellationToken,
    pub state_tx: watch::Sender<RunState>,
    pub current_ttl: u8,
}

impl Run {
    pub fn mark_running(&self) {
        self.state_tx.send_replace(RunState::Running);
    }

    pub async fn execute(mut self) {
        let (state, terminal) = match self.trace_path().await {
            Ok(Finish::Completed) => (RunState::Completed, TraceEvent::EndOfStream),
            Ok(Finish::Cancelled) => {
                info!("Traceroute {} cancelled at TTL {}", self.id, self.current_ttl);
                (RunState::Cancelled, TraceEvent::Cancelled)
            }
            Err(e) => {
                let code = e.code();
                let message = format!("{:#}", anyhow::Error::from(e));
                warn!("Traceroute {} to {} failed: {}", self.id, self.target, message);
                (RunState::Failed, TraceEvent::Error { code, message })
            }
        };
        self.state_tx.send_replace(state);
        self.emit(terminal);
        debug!("Traceroute {} finished as {}", self.id, state);
    }

    async fn trace_path(&mut self) -> Result<Finish, TraceError> {
        let destinations = self.resolve_destinations().await;

        match self.resolve_gateway().await? {
            None if self.stop.is_cancelled() => return Ok(Finish::Cancelled),
            None => debug!("No default gateway known, starting at TTL {}", FIRST_PROBED_TTL),
            Some(gateway) => {
                self.emit_hop(Hop::gateway(gateway));
                if !self.pause().await {
                    return Ok(Finish::Cancelled);
                }
            }
        }

        for ttl in FIRST_PROBED_TTL..=self.params.max_hops {
            self.current_ttl = ttl;
            if self.stop.is_cancelled() {
                return Ok(Finish::Cancelled);
            }
            trace!("Traceroute {} probing TTL {}", self.id, ttl);

            let outcome = select! {
                biased;
                _ = self.stop.cancelled() => return Ok(Finish::Cancelled),
                outcome = self.executor.probe(
                    &self.target, ttl, self.params.probe_timeout(), &self.stop,
                ) => outcome,
            };
            // Result of a probe that raced with cancellation is dropped
            if self.stop.is_cancelled() {
                return Ok(Finish::Cancelled);
            }

            match outcome {
                ProbeOutcome::Responder(responder) => {
                    let reached = destinations.contains(&responder);
                    self.emit_hop(Hop::probed(ttl, responder, reached));
                    if reached {
                        info!("Traceroute {} reached {} at TTL {}", self.id, responder, ttl);
                        self.emit(TraceEvent::DestinationReached);
                        return Ok(Finish::Completed);
                    }
                    if !self.pause().await {
                        return Ok(Finish::Cancelled);
                    }
                }
                ProbeOutcome::NoResponse => trace!("No response at TTL {}, skipping", ttl),
                ProbeOutcome::Error(reason) => return Err(TraceError::Probe { ttl, reason }),
            }
        }

        info!(
            "Traceroute {} did not reach {} within {} hops",
            self.id, self.target, self.params.max_hops
        );
        Ok(Finish::Completed)
    }

    /// Gateway lookups that take too long are skipped, failing ones fail the run.
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>, TraceError> {
        let lookup = timeout(self.params.lookup_timeout(), self.gateway.resolve_gateway());
        select! {
            biased;
            _ = self.stop.cancelled() => Ok(None),
            res = lookup => match res {
                Ok(gateway_res) => gateway_res.map_err(TraceError::Gateway),
                Err(_) => {
                    warn!("Default gateway lookup timed out, not reporting it");
                    Ok(None)
                }
            }
        }
    }

    /// Resolves the target once up front, so that hostname targets can be recognised
    /// when they answer. If the lookup fails, the destination is never recognised and
    /// the run goes on until `max_hops`.
    async fn resolve_destinations(&self) -> Vec<IpAddr> {
        if let Ok(addr) = self.target.parse::<IpAddr>() {
            return vec![addr];
        }
        let lookup = tokio::net::lookup_host((self.target.as_str(), 0));
        let resolved = select! {
            biased;
            _ = self.stop.cancelled() => return vec![],
            res = timeout(self.params.lookup_timeout(), lookup) => res,
        };
        match resolved {
            Ok(Ok(addrs)) => {
                let addrs: Vec<IpAddr> = addrs.map(|it| it.ip()).collect();
                debug!("{} resolves to {:?}", self.target, addrs);
                addrs
            }
            Ok(Err(e)) => {
                warn!("Unable to resolve {}: {}", self.target, e);
                vec![]
            }
            Err(_) => {
                warn!("Resolving {} timed out", self.target);
                vec![]
            }
        }
    }

    /// Inter-probe delay. Returns false if the run was cancelled meanwhile.
    async fn pause(&self) -> bool {
        select! {
            biased;
            _ = self.stop.cancelled() => false,
            _ = sleep(self.params.probe_delay()) => true,
        }
    }

    fn emit_hop(&self, hop: Hop) {
        debug!("Traceroute {} hop {}: {}", self.id, hop.ttl, hop.responder);
        self.emit(TraceEvent::from(&hop));
    }

    fn emit(&self, event: TraceEvent) {
        if let Err(e) = self.sink.send(event) {
            // Nobody listens anymore, so there is no point in continuing either
            debug!("Result sink of {} closed, dropping {:?}", self.id, e.0);
            self.stop.cancel();
        }
    }
}
