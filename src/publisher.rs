//! Best-effort delivery of progress events to a pub/sub transport.

use crate::{config::Config, events::ProgressEvent, util::ensure_dir};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

pub trait PubSub: Send + Sync {
    /// Returns false when the message could not be handed to the transport.
    fn publish(&self, channel: &str, message: &Value) -> bool;
}

/// In-process fan-out. Messages published to a channel with no subscribers
/// are dropped.
#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<HashMap<String, Vec<Sender<Value>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str) -> Receiver<Value> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

impl PubSub for MemoryBus {
    fn publish(&self, channel: &str, message: &Value) -> bool {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(senders) = subs.get_mut(channel) {
            senders.retain(|tx| tx.send(message.clone()).is_ok());
            if senders.is_empty() {
                subs.remove(channel);
            }
        }
        true
    }
}

/// Writes one `{"channel": .., "message": ..}` object per line.
pub struct JsonLinesPublisher {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesPublisher {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event file: {}", path.display()))?;
        Ok(Self::new(Box::new(file)))
    }
}

impl PubSub for JsonLinesPublisher {
    fn publish(&self, channel: &str, message: &Value) -> bool {
        let line = serde_json::json!({ "channel": channel, "message": message });
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}").and_then(|_| out.flush()).is_ok()
    }
}

pub fn transport_from_config(cfg: &Config) -> Result<Arc<dyn PubSub>> {
    match cfg.publisher.backend.as_str() {
        "stdout" => Ok(Arc::new(JsonLinesPublisher::stdout())),
        "file" => {
            if cfg.publisher.file_path.is_empty() {
                bail!("publisher.backend=file requires publisher.file_path");
            }
            Ok(Arc::new(JsonLinesPublisher::file(Path::new(
                &cfg.publisher.file_path,
            ))?))
        }
        "memory" => Ok(Arc::new(MemoryBus::new())),
        other => bail!("unknown publisher.backend: {other}"),
    }
}

/// Routes a job's events to its channel. Failures are logged and swallowed.
pub struct ProgressPublisher {
    transport: Arc<dyn PubSub>,
    prefix: String,
}

impl ProgressPublisher {
    pub fn new(transport: Arc<dyn PubSub>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
        }
    }

    pub fn channel_for(&self, job_id: &str) -> String {
        format!("{}{}", self.prefix, job_id)
    }

    pub fn publish(&self, event: &ProgressEvent) {
        let channel = self.channel_for(&event.job_id);
        let message = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(err) => {
                warn!("failed to encode event for {channel}: {err}");
                return;
            }
        };
        if self.transport.publish(&channel, &message) {
            debug!("published {:?} to {channel}", event.event_type);
        } else {
            warn!("failed to publish {:?} to {channel}", event.event_type);
        }
    }
}
