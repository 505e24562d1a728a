use std::io::{self, Write};

use anyhow::{Context, Result};
use log::trace;
use pulse_models::trace_event::{HopLabel, TraceEvent};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

/// Prints events as they arrive until the run closes its stream. Returns the terminal event,
/// if the run sent one.
pub async fn print_events(
    mut event_rx: UnboundedReceiver<TraceEvent>,
    json: bool,
) -> Result<Option<TraceEvent>> {
    let mut terminal = None;
    while let Some(event) = event_rx.recv().await {
        trace!("Rendering {:?}", event);
        if json {
            print_json(&event)?;
        } else {
            print_line(&describe(&event))?;
        }
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    Ok(terminal)
}

pub fn describe(event: &TraceEvent) -> String {
    match event {
        TraceEvent::Hop {
            ttl,
            label: HopLabel::Gateway,
            address,
        } => format!("Hop {} (gateway): {}", ttl, address),
        TraceEvent::Hop { ttl, address, .. } => format!("Hop {}: {}", ttl, address),
        TraceEvent::DestinationReached => "Destination reached".to_string(),
        TraceEvent::EndOfStream => "Traceroute finished".to_string(),
        TraceEvent::Error { code, message } => format!("Error ({}): {}", code, message),
        TraceEvent::Cancelled => "Traceroute cancelled".to_string(),
    }
}

pub fn print_json(value: &impl Serialize) -> Result<()> {
    let line = serde_json::to_string(value).context("serialising output")?;
    print_line(&line)
}

/// Flushes per line, so that hops show up while the trace is still running.
pub fn print_line(line: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)
        .and_then(|_| stdout.flush())
        .context("writing to stdout")
}
