use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;
use pulse_models::ErrorCode;
use thiserror::Error;

pub use self::dns::ResolvConf;
pub use self::signal::{signal_level_from_rssi, WirelessStats, SIGNAL_LEVELS};

mod dns;
mod signal;

#[derive(Args, Clone, Debug)]
#[group(id = "netinfo")]
pub struct Params {
    /// Resolver configuration to read DNS servers from
    #[arg(long, default_value = "/etc/resolv.conf", env = "RESOLV_CONF_PATH")]
    pub resolv_conf_path: PathBuf,

    /// Kernel wireless statistics table
    #[arg(long, default_value = "/proc/net/wireless", env = "WIRELESS_STATS_PATH")]
    pub wireless_stats_path: PathBuf,

    /// Wi-Fi interface to report the signal for. Uses the first listed interface if unset.
    #[arg(long, env = "WIFI_INTERFACE")]
    pub wifi_interface: Option<String>,
}

impl Params {
    pub fn to_dns_servers(&self) -> ResolvConf {
        ResolvConf::new(self.resolv_conf_path.clone())
    }

    pub fn to_signal_strength(&self) -> WirelessStats {
        WirelessStats::new(self.wireless_stats_path.clone(), self.wifi_interface.clone())
    }
}

/// Lists the DNS resolvers of the active network.
pub trait DnsServers {
    fn dns_servers(&self) -> Result<Vec<IpAddr>, NetworkInfoError>;
}

/// Reports the Wi-Fi signal quality of the active network as a level in `0..SIGNAL_LEVELS`.
pub trait SignalStrength {
    fn signal_level(&self) -> Result<u8, NetworkInfoError>;
}

#[derive(Error, Debug)]
pub enum NetworkInfoError {
    #[error("failed to read `{path}`")]
    FailedRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no wireless interface {interface:?} listed in `{path}`")]
    NoWirelessInterface {
        path: PathBuf,
        interface: Option<String>,
    },

    #[error("malformed wireless statistics line: `{0}`")]
    MalformedStats(String),
}

impl NetworkInfoError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::QueryError
    }
}
