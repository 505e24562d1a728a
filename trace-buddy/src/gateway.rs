use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;

pub use self::route::RouteTable;

mod route;

#[derive(Args, Clone, Debug)]
#[group(id = "route")]
pub struct Params {
    /// FQ path to the iproute2 `ip` binary, used to look up the default gateway
    #[arg(long, default_value = "/usr/sbin/ip", env = "IP_BIN_PATH")]
    ip_bin_path: String,

    /// Don't report the default gateway as hop 1
    #[arg(long, env = "NO_GATEWAY")]
    no_gateway: bool,
}

impl Params {
    pub fn to_resolver(&self) -> Arc<dyn GatewayResolver> {
        if self.no_gateway {
            Arc::new(NoGateway)
        } else {
            Arc::new(RouteTable::new(self.ip_bin_path.to_string()))
        }
    }
}

/// Supplies the default-route gateway, which is reported as hop 1 without probing.
#[async_trait]
pub trait GatewayResolver: Send + Sync {
    /// `None` if there is no default route.
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>>;
}

#[derive(Debug)]
pub struct NoGateway;

#[async_trait]
impl GatewayResolver for NoGateway {
    async fn resolve_gateway(&self) -> Result<Option<IpAddr>> {
        Ok(None)
    }
}
