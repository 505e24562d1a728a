use std::net::IpAddr;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, trace};
use tokio::process::Command;

use super::GatewayResolver;

/// Reads the default route from the kernel routing table via `ip route`, IPv4 first.
#[derive(Debug, Clone)]
pub struct RouteTable {
    ip_bin_path: String,
}

impl RouteTable {
    pub fn new(ip_bin_path: String) -> Self {
        Self { ip_bin_path }
    }

    async fn default_route(&self, family: &str) -> Result<Option<IpAddr>> {
        let output = Command::new(&self.ip_bin_path)
            .arg(family)
            .args(["route", "show", "default"])
            .stdin(Stdio::null())
            .env_clear()
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to call `{} {} route`", self.ip_bin_path, family))?;

        if !output.status.success() {
            bail!(
                "ip route exited with non-successful status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("ip {} route: {}", family, stdout);
        Ok(parse_default_via(&stdout))
    }
}

#[async_trait]
impl GatewayResolver for RouteTable {
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>> {
        if let Some(gateway) = self.default_route("-4").await? {
            debug!("Default IPv4 gateway is {}", gateway);
            return Ok(Some(gateway));
        }
        let gateway = self.default_route("-6").await?;
        debug!("Default IPv6 gateway is {:?}", gateway);
        Ok(gateway)
    }
}

/// Finds `<addr>` in `default via <addr> dev eth0 proto dhcp metric 100`.
fn parse_default_via(output: &str) -> Option<IpAddr> {
    for line in output.lines().filter(|it| it.starts_with("default")) {
        let mut parts = line.split_whitespace().skip_while(|it| *it != "via");
        let Some(raw) = parts.nth(1) else {
            continue;
        };
        let unscoped = raw.split('%').next().unwrap_or_default();
        if let Ok(addr) = unscoped.parse() {
            return Some(addr);
        }
    }
    None
}
