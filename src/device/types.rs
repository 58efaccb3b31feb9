//! Line protocol spoken with the device bridge helper.
//!
//! Each request is one JSON object per line tagged with `id` and `cmd`; each
//! response echoes the `id`.

use super::DeviceFacts;
use crate::{
    error::{ConnectionError, RpcError},
    registry::RpcArgs,
    tree::RpcTree,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeCommand<'a> {
    Open {
        host: &'a str,
        port: u16,
        user: &'a str,
        password: &'a str,
        timeout: u64,
    },
    Facts,
    Rpc {
        rpc: &'a str,
        args: &'a RpcArgs,
        timeout: u64,
    },
    Close,
    Doctor,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub command: BridgeCommand<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<BridgeFailure>,
    #[serde(default)]
    pub facts: Option<DeviceFacts>,
    #[serde(default)]
    pub tree: Option<RpcTree>,
    #[serde(default)]
    pub diag: Option<BridgeDiag>,
    /// Whether the device session survived a failed call, when the helper knows.
    #[serde(default)]
    pub alive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeFailure {
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl BridgeFailure {
    pub fn into_connection_error(self, host: &str) -> ConnectionError {
        let host = host.to_string();
        let message = self.message;
        match self.kind.as_str() {
            "auth" => ConnectionError::Auth { host, message },
            "unreachable" | "timeout" => ConnectionError::Unreachable { host, message },
            _ => ConnectionError::Handshake { host, message },
        }
    }

    pub fn into_rpc_error(self, rpc: &str, timeout: Duration) -> RpcError {
        let rpc = rpc.to_string();
        match self.kind.as_str() {
            "timeout" => RpcError::Timeout { rpc, timeout },
            "rpc" => RpcError::Protocol {
                rpc,
                message: self.message,
            },
            _ => RpcError::Transport {
                rpc,
                message: self.message,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeDiag {
    pub python_exe: String,
    pub python_version: String,
    pub pyez_version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
