//! Failure taxonomy for report jobs.
//!
//! Validation and connection failures are job-level. RPC and parse failures
//! are scoped to a single report type and never abort the job on their own.

use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Request rejected before any device interaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one report type must be specified")]
    EmptyRequest,

    #[error("invalid report types: {}", join_ids(.0))]
    UnknownReportTypes(BTreeSet<String>),

    #[error("invalid host: {0}")]
    InvalidHost(String),
}

fn join_ids(ids: &BTreeSet<String>) -> String {
    ids.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("authentication failed for {host}: {message}")]
    Auth { host: String, message: String },

    #[error("device {host} unreachable: {message}")]
    Unreachable { host: String, message: String },

    #[error("handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc {rpc} timed out after {}s", .timeout.as_secs())]
    Timeout { rpc: String, timeout: Duration },

    #[error("rpc {rpc} returned an error: {message}")]
    Protocol { rpc: String, message: String },

    #[error("transport failure during {rpc}: {message}")]
    Transport { rpc: String, message: String },
}

impl RpcError {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Timeout { .. } => "timeout",
            RpcError::Protocol { .. } => "rpc",
            RpcError::Transport { .. } => "transport",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected response shape: expected <{expected}>, got <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("parser panicked: {0}")]
    Panicked(String),

    #[error("encoding parsed record: {0}")]
    Encode(String),
}

/// Failure of one report type inside a job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ReportError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Rpc(e) => e.kind(),
            ReportError::Parse(_) => "parse",
        }
    }
}

/// Failure that moves a job to `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("session lost: {0}")]
    TransportLost(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to start job worker: {0}")]
    Spawn(#[from] std::io::Error),
}
