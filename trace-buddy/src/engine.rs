use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use log::{debug, info};
use pulse_models::trace_event::TraceEvent;
use pulse_models::trace_request::{RunId, RunState, StartAck};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::StartError;
use crate::gateway::GatewayResolver;
use crate::probe::ProbeExecutor;

use self::run::Run;

mod run;
#[cfg(test)]
pub mod test_utils;

#[derive(Args, Clone, Debug)]
#[group(id = "trace")]
pub struct Params {
    /// Highest TTL to probe before giving up on reaching the target
    #[arg(long, default_value = "30", env = "MAX_HOPS",
        value_parser = clap::value_parser!(u8).range(1..))]
    pub max_hops: u8,

    /// Pause after each discovered hop, so that we don't flood the network
    #[arg(long, default_value = "500", env = "PROBE_DELAY_MS")]
    pub probe_delay_ms: u64,

    /// How long to wait for a reply to a single probe
    #[arg(long, default_value = "2", env = "PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: u64,

    /// How long gateway and target address lookups may take before they are skipped
    #[arg(long, default_value = "1000", env = "GATEWAY_TIMEOUT_MS")]
    pub gateway_timeout_ms: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_hops: 30,
            probe_delay_ms: 500,
            probe_timeout_secs: 2,
            gateway_timeout_ms: 1000,
        }
    }
}

impl Params {
    fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// Starts traceroute runs, each on its own Tokio task. Must be used from within a runtime.
pub struct TraceEngine {
    params: Params,
    executor: Arc<dyn ProbeExecutor>,
    gateway: Arc<dyn GatewayResolver>,
    next_id: AtomicU64,
}

impl TraceEngine {
    pub fn new(
        params: Params,
        executor: Arc<dyn ProbeExecutor>,
        gateway: Arc<dyn GatewayResolver>,
    ) -> Self {
        Self {
            params,
            executor,
            gateway,
            next_id: AtomicU64::new(1),
        }
    }

    /// Validates the target and launches a run that reports to `sink`. Returns right away;
    /// the run's events, ending with exactly one terminal event, arrive on `sink` in order.
    pub fn start(
        &self,
        target: &str,
        sink: UnboundedSender<TraceEvent>,
    ) -> Result<RunHandle, StartError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(StartError::EmptyTarget);
        }
        let id = RunId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let stop = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RunState::Pending);

        let run = Run {
            id,
            target: target.to_string(),
            params: self.params.clone(),
            executor: Arc::clone(&self.executor),
            gateway: Arc::clone(&self.gateway),
            sink,
            stop: stop.clone(),
            state_tx,
            current_ttl: run::FIRST_PROBED_TTL,
        };
        run.mark_running();
        tokio::spawn(run.execute());
        info!("Started traceroute {} to {}", id, target);

        Ok(RunHandle {
            id,
            target: target.to_string(),
            stop,
            state_rx,
        })
    }

    pub fn cancel(&self, handle: &RunHandle) {
        handle.cancel()
    }
}

/// Caller-side view of a run. Cloning is cheap; all clones refer to the same run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: RunId,
    target: String,
    stop: CancellationToken,
    state_rx: watch::Receiver<RunState>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    pub fn ack(&self) -> StartAck {
        StartAck::Accepted { run_id: self.id }
    }

    /// Requests the run to stop. Idempotent, and a no-op for runs that already ended.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            debug!("Not cancelling {}, already {}", self.id, self.state());
            return;
        }
        debug!("Cancelling {}", self.id);
        self.stop.cancel();
    }

    /// Waits for the run to reach a terminal state.
    pub async fn finished(&self) -> RunState {
        let mut state_rx = self.state_rx.clone();
        let result = match state_rx.wait_for(RunState::is_terminal).await {
            Ok(state) => *state,
            // Run task is gone without a verdict, i.e. it panicked
            Err(_) => RunState::Failed,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use assertor::*;
    use pulse_models::trace_event::{HopLabel, TraceEvent};
    use pulse_models::trace_request::RunState;
    use pulse_models::ErrorCode;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::error::StartError;
    use crate::gateway::{GatewayResolver, NoGateway};
    use crate::probe::ProbeOutcome;

    use super::test_utils::*;
    use super::{Params, TraceEngine};

    fn addr(input: &str) -> IpAddr {
        input.parse().expect(input)
    }

    fn engine_with(
        params: Params,
        executor: Arc<ScriptedExecutor>,
        gateway: Arc<dyn GatewayResolver>,
    ) -> TraceEngine {
        TraceEngine::new(params, executor, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn reports_hops_until_destination() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (2, responder("10.0.0.1")),
            (5, responder("10.0.0.9")),
        ]));
        let gateway = Arc::new(FixedGateway(Some(addr("10.0.0.254"))));
        let engine = engine_with(Params::default(), executor.clone(), gateway);
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![
            hop(1, HopLabel::Gateway, "10.0.0.254"),
            hop(2, HopLabel::Hop, "10.0.0.1"),
            hop(5, HopLabel::Hop, "10.0.0.9"),
            TraceEvent::DestinationReached,
            TraceEvent::EndOfStream,
        ]);
        assert_that!(executor.probed_ttls()).is_equal_to(vec![2, 3, 4, 5]);
        assert_that!(handle.finished().await).is_equal_to(RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_path_only_ends_the_stream() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![]));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![TraceEvent::EndOfStream]);
        assert_that!(executor.probed_ttls()).is_equal_to((2..=30).collect::<Vec<u8>>());
        assert_that!(handle.state()).is_equal_to(RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn no_probe_beyond_max_hops() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![(3, responder("10.0.0.3"))]));
        let params = Params {
            max_hops: 5,
            ..Params::default()
        };
        let engine = engine_with(params, executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        engine.start("10.0.0.9", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(executor.probed_ttls()).is_equal_to(vec![2, 3, 4, 5]);
        assert_that!(events).is_equal_to(vec![
            hop(3, HopLabel::Hop, "10.0.0.3"),
            TraceEvent::EndOfStream,
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_ends_with_single_error() {
        // given
        let mut script: Vec<_> = (2..10)
            .map(|ttl| (ttl, responder(&format!("10.0.0.{}", ttl))))
            .collect();
        script.push((10, ProbeOutcome::Error("ping exploded".to_string())));
        script.push((11, responder("10.0.0.11")));
        let executor = Arc::new(ScriptedExecutor::new(script));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("10.0.0.99", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(hop_ttls(&events)).is_equal_to((2..10).collect::<Vec<u8>>());
        assert_that!(events.len()).is_equal_to(9);
        match events.last() {
            Some(TraceEvent::Error { code, message }) => {
                assert_that!(*code).is_equal_to(ErrorCode::TracerouteError);
                assert!(message.contains("TTL 10"), "{}", message);
                assert!(message.contains("ping exploded"), "{}", message);
            }
            other => panic!("expected an error event last, got {:?}", other),
        }
        assert_that!(executor.probed_ttls().last().copied()).has_value(10);
        assert_that!(handle.finished().await).is_equal_to(RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_failure_fails_the_run() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![(2, responder("10.0.0.1"))]));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(FailingGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).has_length(1);
        assert!(matches!(events[0], TraceEvent::Error { .. }));
        assert_that!(executor.probed_ttls()).has_length(0);
        assert_that!(handle.finished().await).is_equal_to(RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_is_skipped() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![(2, responder("10.0.0.9"))]));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(HangingGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        engine.start("10.0.0.9", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![
            hop(2, HopLabel::Hop, "10.0.0.9"),
            TraceEvent::DestinationReached,
            TraceEvent::EndOfStream,
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_each_reported_hop() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (2, responder("10.0.0.1")),
            (5, responder("10.0.0.9")),
        ]));
        let gateway = Arc::new(FixedGateway(Some(addr("10.0.0.254"))));
        let engine = engine_with(Params::default(), executor, gateway);
        let (tx, rx) = mpsc::unbounded_channel();
        let started_at = Instant::now();

        // when
        engine.start("10.0.0.9", tx).expect("start to succeed");
        collect(rx).await;

        // then
        // after the gateway and after hop 2, but not after reaching the destination
        let elapsed = started_at.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn ipv6_destination_is_detected() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (2, responder("2001:db8:1::1")),
            (3, responder("2001:db8::9")),
        ]));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        engine.start(" 2001:0db8::0009 ", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![
            hop(2, HopLabel::Hop, "2001:db8:1::1"),
            hop(3, HopLabel::Hop, "2001:db8::9"),
            TraceEvent::DestinationReached,
            TraceEvent::EndOfStream,
        ]);
    }

    fn quick_params(max_hops: u8) -> Params {
        Params {
            max_hops,
            probe_delay_ms: 0,
            ..Params::default()
        }
    }

    // Name lookups run on the blocking pool, so these use the real clock
    #[tokio::test]
    async fn hostname_destination_is_detected() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (2, responder("10.0.0.1")),
            (3, responder("127.0.0.1")),
        ]));
        let engine = engine_with(quick_params(30), executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("localhost", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![
            hop(2, HopLabel::Hop, "10.0.0.1"),
            hop(3, HopLabel::Hop, "127.0.0.1"),
            TraceEvent::DestinationReached,
            TraceEvent::EndOfStream,
        ]);
        assert_that!(executor.probed_ttls()).is_equal_to(vec![2, 3]);
        assert_that!(handle.finished().await).is_equal_to(RunState::Completed);
    }

    #[tokio::test]
    async fn unresolvable_hostname_is_traced_to_max_hops() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![
            (2, responder("10.0.0.1")),
            (3, responder("127.0.0.1")),
        ]));
        let engine = engine_with(quick_params(4), executor.clone(), Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("no-such-host.invalid", tx).expect("start to succeed");
        let events = collect(rx).await;

        // then
        assert_that!(events).is_equal_to(vec![
            hop(2, HopLabel::Hop, "10.0.0.1"),
            hop(3, HopLabel::Hop, "127.0.0.1"),
            TraceEvent::EndOfStream,
        ]);
        assert_that!(executor.probed_ttls()).is_equal_to(vec![2, 3, 4]);
        assert_that!(handle.finished().await).is_equal_to(RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_right_after_start_is_acknowledged() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(
            (2..=30).map(|ttl| (ttl, responder(&format!("10.0.1.{}", ttl)))).collect(),
        ));
        let gateway = Arc::new(FixedGateway(Some(addr("10.0.0.254"))));
        let engine = engine_with(Params::default(), executor.clone(), gateway);
        let (tx, rx) = mpsc::unbounded_channel();

        // when
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        engine.cancel(&handle);
        let events = collect(rx).await;

        // then
        assert_that!(events.last()).has_value(&TraceEvent::Cancelled);
        assert_that!(hop_ttls(&events).len()).is_at_most(1);
        assert!(!events.contains(&TraceEvent::EndOfStream));
        assert_that!(handle.finished().await).is_equal_to(RunState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_in_flight_probe() {
        // given
        let executor = Arc::new(
            ScriptedExecutor::new(vec![(2, responder("10.0.0.1"))]).hanging_at(4),
        );
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(NoGateway));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        let first = rx.recv().await;
        executor.wait_until_hanging().await;

        // when
        handle.cancel();
        let rest = collect(rx).await;

        // then
        assert_that!(first).has_value(hop(2, HopLabel::Hop, "10.0.0.1"));
        assert_that!(rest).is_equal_to(vec![TraceEvent::Cancelled]);
        assert_that!(executor.probed_ttls()).is_equal_to(vec![2, 3, 4]);
        assert_that!(handle.finished().await).is_equal_to(RunState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_completion_is_a_no_op() {
        // given
        let executor = Arc::new(ScriptedExecutor::new(vec![(2, responder("10.0.0.9"))]));
        let engine = engine_with(Params::default(), executor, Arc::new(NoGateway));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = engine.start("10.0.0.9", tx).expect("start to succeed");
        collect(rx).await;
        assert_that!(handle.finished().await).is_equal_to(RunState::Completed);

        // when
        handle.cancel();
        handle.cancel();

        // then
        assert_that!(handle.state()).is_equal_to(RunState::Completed);
    }

    #[tokio::test]
    async fn empty_target_is_rejected() {
        let executor = Arc::new(ScriptedExecutor::new(vec![]));
        let engine = engine_with(Params::default(), executor.clone(), Arc::new(NoGateway));
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_that!(engine.start("", tx.clone()).err()).has_value(StartError::EmptyTarget);
        assert_that!(engine.start("  \t", tx).err()).has_value(StartError::EmptyTarget);
        assert_that!(executor.probed_ttls()).has_length(0);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_get_distinct_ids() {
        let engine = engine_with(
            Params::default(),
            Arc::new(ScriptedExecutor::new(vec![])),
            Arc::new(NoGateway),
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = engine.start("10.0.0.9", tx.clone()).expect("start to succeed");
        let second = engine.start("10.0.0.9", tx).expect("start to succeed");

        assert_that!(first.id()).is_not_equal_to(second.id());
        assert_that!(first.state()).is_equal_to(RunState::Running);
        first.cancel();
        second.cancel();
    }
}
