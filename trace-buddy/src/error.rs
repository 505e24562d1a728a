use pulse_models::trace_request::{RunId, StartAck};
use pulse_models::ErrorCode;
use thiserror::Error;

/// Why a traceroute was refused before any run was created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("a traceroute is already active on this channel ({0})")]
    AlreadyActive(RunId),
}

impl StartError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::TracerouteInitError
    }

    pub fn to_ack(&self) -> StartAck {
        StartAck::Rejected {
            code: self.code(),
            reason: self.to_string(),
        }
    }
}

/// Why a started run ended in [pulse_models::trace_request::RunState::Failed].
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to resolve the default gateway")]
    Gateway(#[source] anyhow::Error),

    #[error("probe with TTL {ttl} failed: {reason}")]
    Probe { ttl: u8, reason: String },
}

impl TraceError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::TracerouteError
    }
}
