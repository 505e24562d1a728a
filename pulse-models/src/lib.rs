use serde::{Deserialize, Serialize};
use strum::Display;

pub mod query_reply;
pub mod trace_event;
pub mod trace_request;

/// Machine-readable code attached to every error or rejection that leaves the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A started traceroute run failed midway.
    TracerouteError,
    /// A traceroute run could not be started at all.
    TracerouteInitError,
    /// A single-shot network info query failed.
    #[serde(rename = "ERROR")]
    #[strum(serialize = "ERROR")]
    QueryError,
}
