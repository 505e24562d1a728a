use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use pulse_models::trace_event::TraceEvent;
use pulse_models::trace_request::StartRequest;
use tokio::sync::mpsc::UnboundedSender;

use crate::engine::{RunHandle, TraceEngine};
use crate::error::StartError;

/// Entry point for callers: at most one traceroute runs per channel at any time.
/// Dropping the channel cancels its active run.
pub struct TraceChannel {
    engine: TraceEngine,
    active: Mutex<Option<RunHandle>>,
}

impl TraceChannel {
    pub fn new(engine: TraceEngine) -> Self {
        Self {
            engine,
            active: Mutex::new(None),
        }
    }

    /// Starts a run for the request, unless the target is empty or another run is
    /// still active. A previous run that already ended is released.
    pub fn start(
        &self,
        request: StartRequest,
        sink: UnboundedSender<TraceEvent>,
    ) -> Result<RunHandle, StartError> {
        let mut active = self.lock_active();
        if let Some(previous) = active.as_ref() {
            if !previous.state().is_terminal() {
                debug!("Rejecting traceroute to {}, {} still active", request.target, previous.id());
                return Err(StartError::AlreadyActive(previous.id()));
            }
        }
        let handle = self.engine.start(&request.target, sink)?;
        if let Some(previous) = active.replace(handle.clone()) {
            debug!("Released finished {}", previous.id());
        }
        Ok(handle)
    }

    /// Cancels the active run, if any. Cancelling twice or after the run ended does nothing.
    pub fn cancel(&self) {
        match self.lock_active().as_ref() {
            Some(handle) => self.engine.cancel(handle),
            None => debug!("Nothing to cancel"),
        }
    }

    pub fn active_run(&self) -> Option<RunHandle> {
        self.lock_active()
            .as_ref()
            .filter(|handle| !handle.state().is_terminal())
            .cloned()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<RunHandle>> {
        // A handle has no invariants a panicking holder could break
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TraceChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_active().take() {
            if !handle.state().is_terminal() {
                info!("Trace channel closed, cancelling {}", handle.id());
                handle.cancel();
            }
        }
    }
}
