use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::PathBuf;

use itertools::Itertools;
use log::{debug, warn};

use super::{DnsServers, NetworkInfoError};

/// Reads `nameserver` entries from a resolv.conf(5) style file.
#[derive(Debug, Clone)]
pub struct ResolvConf {
    path: PathBuf,
}

impl ResolvConf {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DnsServers for ResolvConf {
    fn dns_servers(&self) -> Result<Vec<IpAddr>, NetworkInfoError> {
        use NetworkInfoError as E;

        let file = File::open(&self.path).map_err(|source| E::FailedRead {
            path: self.path.clone(),
            source,
        })?;
        let lines = BufReader::new(file)
            .lines()
            .map_ok(|line| line.trim().to_string())
            .filter_ok(|line| !line.starts_with('#') && !line.starts_with(';'));

        let mut servers = vec![];
        for line_res in lines {
            let line = line_res.map_err(|source| E::FailedRead {
                path: self.path.clone(),
                source,
            })?;
            if let Some(server) = parse_nameserver(&line) {
                if !servers.contains(&server) {
                    servers.push(server);
                }
            }
        }
        debug!("Found {} DNS servers in {:?}", servers.len(), self.path);
        Ok(servers)
    }
}

fn parse_nameserver(line: &str) -> Option<IpAddr> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("nameserver") {
        return None;
    }
    let raw = parts.next()?;
    // Scoped IPv6 resolvers look like fe80::1%eth0
    let unscoped = raw.split('%').next().unwrap_or(raw);
    match unscoped.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Skipping invalid nameserver entry `{}`: {}", raw, e);
            None
        }
    }
}
