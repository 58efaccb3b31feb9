//! Device sessions.
//!
//! A [`DeviceTransport`] opens sessions; [`ManagedSession`] wraps one for the
//! duration of a job, caches the device facts resolved at open time and
//! guarantees the underlying session is closed exactly once.

pub mod bridge;
pub mod types;

use crate::{
    error::{ConnectionError, RpcError},
    registry::RpcArgs,
    tree::RpcTree,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 830;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
}

impl DeviceTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    #[serde(default = "unknown")]
    pub model: String,
    #[serde(default = "unknown")]
    pub version: String,
    #[serde(default = "unknown", alias = "serialnumber")]
    pub serial: String,
    #[serde(default = "unknown")]
    pub hostname: String,
}

impl Default for DeviceFacts {
    fn default() -> Self {
        Self {
            model: unknown(),
            version: unknown(),
            serial: unknown(),
            hostname: unknown(),
        }
    }
}

pub trait DeviceTransport: Send + Sync {
    fn open(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, ConnectionError>;
}

pub trait DeviceSession: Send {
    fn facts(&mut self) -> Result<DeviceFacts, ConnectionError>;

    fn call(&mut self, rpc: &str, args: &RpcArgs, timeout: Duration) -> Result<RpcTree, RpcError>;

    /// False once the session can no longer carry calls.
    fn is_alive(&self) -> bool;

    /// Must tolerate repeated calls.
    fn close(&mut self);
}

pub struct ManagedSession {
    inner: Box<dyn DeviceSession>,
    target: DeviceTarget,
    facts: DeviceFacts,
    closed: bool,
}

impl ManagedSession {
    /// Opens a session and resolves the device facts once.
    pub fn open(
        transport: &dyn DeviceTransport,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<Self, ConnectionError> {
        let mut inner = transport.open(target, credentials)?;
        let mut facts = match inner.facts() {
            Ok(facts) => facts,
            Err(err) => {
                inner.close();
                return Err(err);
            }
        };
        if facts.hostname.is_empty() || facts.hostname == "Unknown" {
            facts.hostname = target.host.clone();
        }
        info!(
            "session open target={} model={} version={}",
            target, facts.model, facts.version
        );
        Ok(Self {
            inner,
            target: target.clone(),
            facts,
            closed: false,
        })
    }

    pub fn facts(&self) -> &DeviceFacts {
        &self.facts
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn call(
        &mut self,
        rpc: &str,
        args: &RpcArgs,
        timeout: Duration,
    ) -> Result<RpcTree, RpcError> {
        if self.closed {
            return Err(RpcError::Transport {
                rpc: rpc.to_string(),
                message: "session already closed".to_string(),
            });
        }
        self.inner.call(rpc, args, timeout)
    }

    pub fn is_alive(&self) -> bool {
        !self.closed && self.inner.is_alive()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inner.close();
        info!("session closed target={}", self.target);
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("session to {} released without explicit close", self.target);
            self.close();
        }
    }
}
