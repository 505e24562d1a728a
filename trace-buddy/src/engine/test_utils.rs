use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pulse_models::trace_event::{HopLabel, TraceEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::gateway::GatewayResolver;
use crate::probe::{ProbeExecutor, ProbeOutcome};

/// Answers probes from a fixed TTL → outcome table, [ProbeOutcome::NoResponse] for the rest.
pub struct ScriptedExecutor {
    script: HashMap<u8, ProbeOutcome>,
    hang_at: Option<u8>,
    hanging: Notify,
    probed: Mutex<Vec<u8>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<(u8, ProbeOutcome)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            hang_at: None,
            hanging: Notify::new(),
            probed: Mutex::new(vec![]),
        }
    }

    /// The probe for `ttl` never completes on its own.
    pub fn hanging_at(mut self, ttl: u8) -> Self {
        self.hang_at = Some(ttl);
        self
    }

    pub async fn wait_until_hanging(&self) {
        self.hanging.notified().await
    }

    pub fn probed_ttls(&self) -> Vec<u8> {
        self.probed.lock().expect("probe log lock").clone()
    }
}

#[async_trait]
impl ProbeExecutor for ScriptedExecutor {
    async fn probe(
        &self,
        _target: &str,
        ttl: u8,
        _timeout: Duration,
        _stop: &CancellationToken,
    ) -> ProbeOutcome {
        self.probed.lock().expect("probe log lock").push(ttl);
        if self.hang_at == Some(ttl) {
            self.hanging.notify_one();
            std::future::pending::<()>().await;
        }
        self.script
            .get(&ttl)
            .cloned()
            .unwrap_or(ProbeOutcome::NoResponse)
    }
}

pub struct FixedGateway(pub Option<IpAddr>);

#[async_trait]
impl GatewayResolver for FixedGateway {
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>> {
        Ok(self.0)
    }
}

pub struct FailingGateway;

#[async_trait]
impl GatewayResolver for FailingGateway {
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>> {
        Err(anyhow!("routing table is on fire"))
    }
}

pub struct HangingGateway;

#[async_trait]
impl GatewayResolver for HangingGateway {
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>> {
        std::future::pending().await
    }
}

pub fn responder(input: &str) -> ProbeOutcome {
    ProbeOutcome::Responder(input.parse().expect(input))
}

pub fn hop(ttl: u8, label: HopLabel, address: &str) -> TraceEvent {
    TraceEvent::Hop {
        ttl,
        label,
        address: address.parse().expect(address),
    }
}

/// Receives until the run drops its sender.
pub async fn collect(mut rx: UnboundedReceiver<TraceEvent>) -> Vec<TraceEvent> {
    let mut events = vec![];
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

pub fn hop_ttls(events: &[TraceEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Hop { ttl, .. } => Some(*ttl),
            _ => None,
        })
        .collect()
}
