use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub bridge: Bridge,
    #[serde(default)]
    pub publisher: Publisher,
    #[serde(default)]
    pub jobs: Jobs,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub port: u16,
    pub connect_timeout_seconds: u64,
    pub close_timeout_seconds: u64,
}
impl Default for Device {
    fn default() -> Self {
        Self {
            port: crate::device::DEFAULT_PORT,
            connect_timeout_seconds: 30,
            close_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bridge {
    /// Interpreter for the helper script; `auto` consults `NETREPORT_PYTHON`.
    pub program: String,
    pub script: String,
    pub doctor_timeout_seconds: u64,
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Bridge {
    fn default() -> Self {
        Self {
            program: "auto".into(),
            script: "scripts/junos_bridge.py".into(),
            doctor_timeout_seconds: 30,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Publisher {
    /// `stdout`, `file` or `memory`.
    pub backend: String,
    pub channel_prefix: String,
    pub file_path: String,
}
impl Default for Publisher {
    fn default() -> Self {
        Self {
            backend: "stdout".into(),
            channel_prefix: "ws_channel:job:".into(),
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Jobs {
    pub max_retained: usize,
    pub retention_seconds: u64,
    /// How long `run` waits for a terminal state; 0 waits indefinitely.
    pub wait_timeout_seconds: u64,
}
impl Default for Jobs {
    fn default() -> Self {
        Self {
            max_retained: 256,
            retention_seconds: 3600,
            wait_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_hosts: bool,
    pub pin_script_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_hosts: true,
            pin_script_dir: false,
        }
    }
}
