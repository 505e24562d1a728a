use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::ErrorCode;

/// Answer to a single-shot network info query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueryReply {
    DnsServers {
        servers: Vec<IpAddr>,
    },
    /// Wi-Fi signal quality, `0` (worst) to `4` (best).
    SignalLevel {
        level: u8,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl QueryReply {
    pub fn failed(code: ErrorCode, message: &str, details: impl ToString) -> Self {
        QueryReply::Error {
            code,
            message: message.to_string(),
            details: Some(details.to_string()),
        }
    }
}
