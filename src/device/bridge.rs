use super::{
    types::{BridgeCommand, BridgeDiag, BridgeRequest, BridgeResponse},
    Credentials, DeviceFacts, DeviceSession, DeviceTarget, DeviceTransport,
};
use crate::{
    config::Config,
    error::{ConnectionError, RpcError},
    registry::RpcArgs,
    tree::RpcTree,
};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Device transport backed by a helper process speaking the line protocol in
/// [`super::types`]. One helper process per session.
pub struct BridgeTransport {
    program: PathBuf,
    script: PathBuf,
    env: BTreeMap<String, String>,
    connect_timeout: Duration,
    close_timeout: Duration,
    doctor_timeout: Duration,
}

impl BridgeTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        let script = PathBuf::from(&cfg.bridge.script);
        if cfg.security.pin_script_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = script
                .canonicalize()
                .with_context(|| format!("canonicalize bridge script: {}", script.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "bridge script is outside cwd while pin_script_dir=true: {}",
                    canon.display()
                ));
            }
        }
        Ok(Self {
            program: resolve_program(&cfg.bridge.program),
            script,
            env: cfg.bridge.env.clone(),
            connect_timeout: Duration::from_secs(cfg.device.connect_timeout_seconds),
            close_timeout: Duration::from_secs(cfg.device.close_timeout_seconds),
            doctor_timeout: Duration::from_secs(cfg.bridge.doctor_timeout_seconds),
        })
    }

    pub fn doctor(&self) -> Result<BridgeDiag> {
        let mut process = self.spawn()?;
        let result = process.exchange(BridgeCommand::Doctor, self.doctor_timeout);
        process.shutdown(self.close_timeout);
        let resp = result.map_err(|e| anyhow!("bridge doctor: {e}"))?;
        resp.diag
            .ok_or_else(|| anyhow!("bridge doctor response carried no diagnostics"))
    }

    fn spawn(&self) -> Result<BridgeProcess> {
        if !self.script.exists() {
            return Err(anyhow!("missing bridge script: {}", self.script.display()));
        }
        debug!(
            "spawning bridge {} {}",
            self.program.display(),
            self.script.display()
        );
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning bridge: {}", self.program.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr"))?;

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("bridge-stdout".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BridgeResponse>(line) {
                        Ok(resp) => {
                            if tx.send(resp).is_err() {
                                break;
                            }
                        }
                        Err(err) => debug!("bridge emitted non-protocol line ({err}): {line}"),
                    }
                }
            })
            .with_context(|| "spawning bridge stdout reader")?;

        // Drain stderr so a chatty helper can't block on a full pipe.
        std::thread::Builder::new()
            .name("bridge-stderr".into())
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    debug!("bridge stderr: {}", line.trim_end());
                }
            })
            .with_context(|| "spawning bridge stderr reader")?;

        Ok(BridgeProcess {
            child,
            stdin: Some(stdin),
            responses: rx,
            next_id: 1,
        })
    }
}

impl DeviceTransport for BridgeTransport {
    fn open(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> std::result::Result<Box<dyn DeviceSession>, ConnectionError> {
        let host = target.host.as_str();
        let mut process = self.spawn().map_err(|e| ConnectionError::Handshake {
            host: host.to_string(),
            message: format!("{e:#}"),
        })?;

        let open = BridgeCommand::Open {
            host,
            port: target.port,
            user: &credentials.username,
            password: &credentials.password,
            timeout: self.connect_timeout.as_secs(),
        };
        let outcome = match process.exchange(open, self.connect_timeout) {
            Ok(resp) if resp.ok => Ok(()),
            Ok(resp) => Err(resp
                .error
                .map(|f| f.into_connection_error(host))
                .unwrap_or_else(|| ConnectionError::Handshake {
                    host: host.to_string(),
                    message: "open rejected without detail".to_string(),
                })),
            Err(ExchangeError::Timeout) => Err(ConnectionError::Unreachable {
                host: host.to_string(),
                message: format!("no response within {}s", self.connect_timeout.as_secs()),
            }),
            Err(ExchangeError::Closed(message)) => Err(ConnectionError::Handshake {
                host: host.to_string(),
                message,
            }),
        };

        if let Err(err) = outcome {
            process.shutdown(self.close_timeout);
            return Err(err);
        }

        Ok(Box::new(BridgeSession {
            process,
            host: host.to_string(),
            connect_timeout: self.connect_timeout,
            close_timeout: self.close_timeout,
            alive: true,
            closed: false,
        }))
    }
}

fn resolve_program(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("NETREPORT_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[derive(Debug)]
enum ExchangeError {
    Timeout,
    Closed(String),
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Timeout => write!(f, "timed out waiting for bridge"),
            ExchangeError::Closed(msg) => write!(f, "bridge unavailable: {msg}"),
        }
    }
}

struct BridgeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    responses: Receiver<BridgeResponse>,
    next_id: u64,
}

impl BridgeProcess {
    /// Sends one command and waits for the response carrying the same id.
    /// Responses to earlier, timed-out requests are discarded.
    fn exchange(
        &mut self,
        command: BridgeCommand<'_>,
        timeout: Duration,
    ) -> std::result::Result<BridgeResponse, ExchangeError> {
        let id = self.next_id;
        self.next_id += 1;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExchangeError::Closed("stdin already closed".into()))?;
        let mut line = serde_json::to_vec(&BridgeRequest { id, command })
            .map_err(|e| ExchangeError::Closed(format!("encoding request: {e}")))?;
        line.push(b'\n');
        stdin
            .write_all(&line)
            .and_then(|_| stdin.flush())
            .map_err(|e| ExchangeError::Closed(format!("writing request: {e}")))?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ExchangeError::Timeout);
            }
            match self.responses.recv_timeout(remaining) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(stale) => debug!("discarding stale bridge response id={}", stale.id),
                Err(RecvTimeoutError::Timeout) => return Err(ExchangeError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ExchangeError::Closed("bridge exited".into()));
                }
            }
        }
    }

    fn shutdown(&mut self, timeout: Duration) {
        if self.stdin.is_some() {
            if let Err(err) = self.exchange(BridgeCommand::Close, timeout) {
                debug!("bridge close: {err}");
            }
        }
        // EOF on stdin tells the helper to exit.
        self.stdin = None;
        match wait_with_timeout(&mut self.child, timeout) {
            Ok(Some(status)) => debug!("bridge exited: {status}"),
            Ok(None) => {
                warn!("bridge did not exit within {:?}; killing", timeout);
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
            Err(err) => warn!("waiting for bridge: {err:#}"),
        }
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            return Ok(Some(status));
        }
        if start.elapsed() > timeout {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

struct BridgeSession {
    process: BridgeProcess,
    host: String,
    connect_timeout: Duration,
    close_timeout: Duration,
    alive: bool,
    closed: bool,
}

impl DeviceSession for BridgeSession {
    fn facts(&mut self) -> std::result::Result<DeviceFacts, ConnectionError> {
        let handshake = |message: String| ConnectionError::Handshake {
            host: self.host.clone(),
            message,
        };
        match self.process.exchange(BridgeCommand::Facts, self.connect_timeout) {
            Ok(resp) if resp.ok => Ok(resp.facts.unwrap_or_default()),
            Ok(resp) => Err(resp
                .error
                .map(|f| f.into_connection_error(&self.host))
                .unwrap_or_else(|| handshake("facts rejected without detail".into()))),
            Err(err) => Err(handshake(err.to_string())),
        }
    }

    fn call(
        &mut self,
        rpc: &str,
        args: &RpcArgs,
        timeout: Duration,
    ) -> std::result::Result<RpcTree, RpcError> {
        if !self.alive {
            return Err(RpcError::Transport {
                rpc: rpc.to_string(),
                message: "bridge is not running".into(),
            });
        }
        let command = BridgeCommand::Rpc {
            rpc,
            args,
            timeout: timeout.as_secs(),
        };
        match self.process.exchange(command, timeout) {
            Ok(resp) if resp.ok => resp.tree.ok_or_else(|| RpcError::Protocol {
                rpc: rpc.to_string(),
                message: "response carried no tree".into(),
            }),
            Ok(resp) => {
                let err = resp
                    .error
                    .map(|f| f.into_rpc_error(rpc, timeout))
                    .unwrap_or_else(|| RpcError::Protocol {
                        rpc: rpc.to_string(),
                        message: "rpc rejected without detail".into(),
                    });
                // Without an explicit liveness flag, a transport failure means the
                // device session is gone.
                self.alive = resp
                    .alive
                    .unwrap_or(!matches!(err, RpcError::Transport { .. }));
                Err(err)
            }
            Err(ExchangeError::Timeout) => Err(RpcError::Timeout {
                rpc: rpc.to_string(),
                timeout,
            }),
            Err(ExchangeError::Closed(message)) => {
                self.alive = false;
                Err(RpcError::Transport {
                    rpc: rpc.to_string(),
                    message,
                })
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.alive = false;
        self.process.shutdown(self.close_timeout);
    }
}

