use std::borrow::Cow;
use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::Level::Debug;
use log::{debug, log_enabled, trace};
use tokio::process::Command;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::hop_parser;
use crate::probe::{ProbeExecutor, ProbeOutcome};

/// Extra time granted to ping beyond its own reply timeout before it is killed.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// Probes by calling ping once per TTL, one echo request each.
#[derive(Debug, Clone)]
pub struct Caller {
    bin_path: String,
}

impl Caller {
    pub fn new(bin_path: String) -> Self {
        Caller { bin_path }
    }

    fn command(&self, target: &str, ttl: u8, timeout: Duration) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.arg("-n").arg("-c").arg("1");
        push_ttl_and_wait(&mut cmd, ttl, timeout);
        cmd.arg("--").arg(target);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.env_clear();
        // Dropping the call future (timeout, cancellation) must not leave ping running
        cmd.kill_on_drop(true);
        cmd
    }

    /// Returns `None` if ping did not exit within `timeout`; it is killed in that case.
    async fn do_call(&self, mut cmd: Command, timeout: Duration) -> Result<Option<Output>> {
        if log_enabled!(Debug) {
            let args: Vec<Cow<'_, str>> = cmd
                .as_std()
                .get_args()
                .map(|os_str| os_str.to_string_lossy())
                .collect();
            debug!("Calling ping with arguments: {}", args.join(" "));
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn ping process `{}`", self.bin_path))?;

        match tokio::time::timeout(timeout + PROCESS_GRACE, child.wait_with_output()).await {
            Ok(output_res) => output_res
                .with_context(|| "Failed to wait for ping to exit")
                .map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl ProbeExecutor for Caller {
    async fn probe(
        &self,
        target: &str,
        ttl: u8,
        timeout: Duration,
        stop: &CancellationToken,
    ) -> ProbeOutcome {
        if stop.is_cancelled() {
            trace!("Not probing ttl {} of {}, already stopped", ttl, target);
            return ProbeOutcome::NoResponse;
        }
        let cmd = self.command(target, ttl, timeout);

        select! {
            biased;
            _ = stop.cancelled() => {
                debug!("Aborting in-flight ping for ttl {} of {}", ttl, target);
                ProbeOutcome::NoResponse
            }
            call_res = self.do_call(cmd, timeout) => match call_res {
                Ok(Some(output)) => interpret(&output),
                Ok(None) => {
                    debug!("ping for ttl {} of {} timed out", ttl, target);
                    ProbeOutcome::NoResponse
                }
                Err(e) => ProbeOutcome::Error(format!("{:#}", e)),
            }
        }
    }
}

/// Exit code 1 means ping ran but got no echo reply, which is what a TTL exceeded
/// answer looks like. Anything else besides 0 means ping itself failed.
fn interpret(output: &Output) -> ProbeOutcome {
    match output.status.code() {
        Some(0) | Some(1) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            trace!("ping: {}", stdout);
            match hop_parser::parse(stdout.lines()) {
                Some(addr) => ProbeOutcome::Responder(addr),
                None => ProbeOutcome::NoResponse,
            }
        }
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ProbeOutcome::Error(format!(
                "ping call exited with non-successful status {}: {}",
                output.status,
                stderr.trim()
            ))
        }
    }
}

#[cfg(target_os = "macos")]
fn push_ttl_and_wait(cmd: &mut Command, ttl: u8, timeout: Duration) {
    // -t is the overall timeout on BSD ping, -W waits for the reply in ms
    cmd.arg("-m")
        .arg(ttl.to_string())
        .arg("-W")
        .arg(timeout.as_millis().max(1).to_string());
}

#[cfg(not(target_os = "macos"))]
fn push_ttl_and_wait(cmd: &mut Command, ttl: u8, timeout: Duration) {
    cmd.arg("-t")
        .arg(ttl.to_string())
        .arg("-W")
        .arg(timeout.as_secs().max(1).to_string());
}
