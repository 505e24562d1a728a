use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use futures::executor;
use log::{debug, info, warn};
use net_pulse::helpers::{bootstrap, logging, signal_handler};
use net_pulse::network_info::{self, DnsServers, SignalStrength};
use pulse_models::query_reply::QueryReply;
use pulse_models::trace_event::TraceEvent;
use pulse_models::trace_request::{RunState, StartRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::TraceChannel;
use crate::engine::TraceEngine;

/// Accepts traceroute runs, one at a time.
mod channel;
/// Orchestrates probing, one TTL at a time.
mod engine;
mod error;
/// Default-route lookup for hop 1.
mod gateway;
mod hop_parser;
mod ping_call;
mod probe;
/// Turns events and replies into output lines.
mod render;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[clap(flatten)]
    logging: logging::Params,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace the path to a host, printing hops as they are discovered
    Trace(TraceArgs),
    /// List the DNS servers of the active network
    Dns(QueryArgs),
    /// Report the Wi-Fi signal level of the active network, 0 (worst) to 4 (best)
    Signal(QueryArgs),
}

#[derive(Args)]
struct TraceArgs {
    /// Hostname or address to trace
    target: String,

    /// Print one JSON object per event instead of plain text
    #[arg(long)]
    json: bool,

    #[clap(flatten)]
    engine: engine::Params,

    #[clap(flatten)]
    ping: ping_call::Params,

    #[clap(flatten)]
    gateway: gateway::Params,
}

#[derive(Args)]
struct QueryArgs {
    /// Print the reply as JSON
    #[arg(long)]
    json: bool,

    #[clap(flatten)]
    netinfo: network_info::Params,
}

fn main() -> Result<()> {
    bootstrap::run(Cli::parse, |cli: &Cli| &cli.logging, do_run)
}

fn do_run(cli: Cli) -> Result<()> {
    let command_result = match cli.command {
        Commands::Trace(args) => executor::block_on(flatten(tokio::spawn(trace(args)))),
        Commands::Dns(args) => query_dns(args),
        Commands::Signal(args) => query_signal(args),
    };
    debug!("Finished command execution. Result: {:?}", command_result);
    command_result
}

async fn trace(args: TraceArgs) -> Result<()> {
    let engine = TraceEngine::new(
        args.engine,
        args.ping.to_executor(),
        args.gateway.to_resolver(),
    );
    let channel = TraceChannel::new(engine);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TraceEvent>();

    let request = StartRequest {
        target: args.target,
    };
    let handle = match channel.start(request, event_tx) {
        Ok(handle) => handle,
        Err(e) => {
            if args.json {
                render::print_json(&e.to_ack())?;
            }
            return Err(anyhow!(e).context("traceroute was not started"));
        }
    };
    if args.json {
        render::print_json(&handle.ack())?;
    }

    let sig_handler = signal_handler::new();
    let stop_rx = sig_handler.subscribe_stop();
    tokio::spawn(async move {
        if let Err(e) = sig_handler.wait_for_signal().await {
            warn!("Unable to watch for signals, Ctrl+C won't stop the trace: {:#}", e);
        }
    });
    let cancel_handle = handle.clone();
    let cancel_stop = stop_rx.clone();
    tokio::spawn(async move {
        cancel_stop.cancelled().await;
        cancel_handle.cancel();
    });

    let terminal = render::print_events(event_rx, args.json).await?;
    stop_rx.cancel(); // also ends the signal watcher
    debug!("Trace {} ended with {:?}", handle.id(), terminal);

    match handle.finished().await {
        RunState::Failed => bail!("traceroute to {} failed", handle.target()),
        state => {
            info!("Traceroute to {} {}", handle.target(), state);
            Ok(())
        }
    }
}

fn query_dns(args: QueryArgs) -> Result<()> {
    let reply = match args.netinfo.to_dns_servers().dns_servers() {
        Ok(servers) => QueryReply::DnsServers { servers },
        Err(e) => QueryReply::failed(
            e.code(),
            "Failed to get DNS servers",
            format!("{:#}", anyhow!(e)),
        ),
    };
    print_reply(&reply, args.json)
}

fn query_signal(args: QueryArgs) -> Result<()> {
    let reply = match args.netinfo.to_signal_strength().signal_level() {
        Ok(level) => QueryReply::SignalLevel { level },
        Err(e) => QueryReply::failed(
            e.code(),
            "Failed to get signal strength",
            format!("{:#}", anyhow!(e)),
        ),
    };
    print_reply(&reply, args.json)
}

fn print_reply(reply: &QueryReply, json: bool) -> Result<()> {
    if json {
        render::print_json(reply)?;
    }
    match reply {
        QueryReply::Error {
            message, details, ..
        } => bail!("{}: {}", message, details.as_deref().unwrap_or("no details")),
        _ if json => Ok(()),
        QueryReply::DnsServers { servers } => servers
            .iter()
            .try_for_each(|server| render::print_line(&server.to_string())),
        QueryReply::SignalLevel { level } => render::print_line(&level.to_string()),
    }
}

async fn flatten(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(err),
        Err(err) => Err(anyhow!(err)),
    }
}
