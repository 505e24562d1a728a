use std::fs;
use std::path::PathBuf;

use log::{debug, trace};

use super::{NetworkInfoError, SignalStrength};

/// Number of buckets signal quality is reported in, i.e. levels are `0..SIGNAL_LEVELS`.
pub const SIGNAL_LEVELS: u8 = 5;

/// Anything at or below this is level 0.
const MIN_RSSI_DBM: i32 = -100;
/// Anything at or above this is the top level.
const MAX_RSSI_DBM: i32 = -55;

/// Reads the link signal level from a Linux `/proc/net/wireless` style table.
#[derive(Debug, Clone)]
pub struct WirelessStats {
    path: PathBuf,
    interface: Option<String>,
}

impl WirelessStats {
    pub fn new(path: PathBuf, interface: Option<String>) -> Self {
        Self { path, interface }
    }

    /// Signal level in dBm of the configured (or first) interface.
    pub fn rssi_dbm(&self) -> Result<i32, NetworkInfoError> {
        let content = fs::read_to_string(&self.path).map_err(|source| {
            NetworkInfoError::FailedRead {
                path: self.path.clone(),
                source,
            }
        })?;
        // Two header lines, then one line per interface
        for line in content.lines().skip(2) {
            let Some((name, stats)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if let Some(wanted) = &self.interface {
                if name != wanted {
                    trace!("Skipping wireless interface {}", name);
                    continue;
                }
            }
            let rssi = parse_level(stats)
                .ok_or_else(|| NetworkInfoError::MalformedStats(line.to_string()))?;
            debug!("Wireless interface {} reports {} dBm", name, rssi);
            return Ok(rssi);
        }
        Err(NetworkInfoError::NoWirelessInterface {
            path: self.path.clone(),
            interface: self.interface.clone(),
        })
    }
}

impl SignalStrength for WirelessStats {
    fn signal_level(&self) -> Result<u8, NetworkInfoError> {
        self.rssi_dbm().map(signal_level_from_rssi)
    }
}

/// Columns after the interface name: status, link quality, level, noise, ...
/// Values carry a trailing `.` if they were updated since the last read.
fn parse_level(stats: &str) -> Option<i32> {
    let level = stats.split_whitespace().nth(2)?;
    let level: f32 = level.trim_end_matches('.').parse().ok()?;
    Some(level as i32)
}

/// Buckets an RSSI reading linearly between -100 dBm and -55 dBm into [SIGNAL_LEVELS] levels.
pub fn signal_level_from_rssi(rssi_dbm: i32) -> u8 {
    let top = SIGNAL_LEVELS - 1;
    if rssi_dbm <= MIN_RSSI_DBM {
        0
    } else if rssi_dbm >= MAX_RSSI_DBM {
        top
    } else {
        let scaled = (rssi_dbm - MIN_RSSI_DBM) * i32::from(top) / (MAX_RSSI_DBM - MIN_RSSI_DBM);
        scaled as u8
    }
}
