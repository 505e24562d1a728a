use std::net::IpAddr;
use std::sync::OnceLock;

use log::trace;
use regex::Regex;

/// Matches `From 10.0.0.1 icmp_seq=1 Time to live exceeded`, `64 bytes from 10.0.0.9: icmp_seq=1`
/// and the resolved form `From router.lan (10.0.0.1) icmp_seq=1`. Group 2 is the address in
/// parentheses if present, group 1 otherwise.
const RESPONDER_PATTERN: &str =
    r"(?:^|\s)[Ff]rom\s+([^\s()]+?)(?:\s+\(([^\s()]+)\))?:?(?:\s|$)";

fn responder_re() -> &'static Regex {
    static RESPONDER_RE: OnceLock<Regex> = OnceLock::new();
    RESPONDER_RE.get_or_init(|| Regex::new(RESPONDER_PATTERN).expect("responder regex to compile"))
}

/// Extracts the first responder address from raw ping output, if any.
pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<IpAddr> {
    let re = responder_re();
    for line in lines {
        for caps in re.captures_iter(line) {
            let Some(raw) = caps.get(2).or_else(|| caps.get(1)) else {
                continue;
            };
            // Link-local responders may carry a zone, e.g. fe80::1%eth0
            let unscoped = raw.as_str().split('%').next().unwrap_or_default();
            match unscoped.parse() {
                Ok(addr) => return Some(addr),
                Err(_) => trace!("Ignoring non-address responder `{}`", raw.as_str()),
            }
        }
    }
    None
}
