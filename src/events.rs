//! Progress events streamed to a job's channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONNECTING: u8 = 5;
pub const CONNECTED: u8 = 10;
/// Share of the bar spread linearly across the requested report types.
pub const GENERATING_SPAN: u8 = 70;
pub const FINALIZING: u8 = 90;
pub const COMPLETE: u8 = 100;

/// Progress once `done` of `total` report types have been processed.
pub fn report_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return CONNECTED + GENERATING_SPAN;
    }
    let done = done.min(total);
    CONNECTED + (done * GENERATING_SPAN as usize / total) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    ReportComplete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub step: String,
    pub message: String,
    pub progress: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_type: EventKind,
    pub job_id: String,
    /// Set to `finished` on the terminal event of a completed job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub data: EventData,
}

impl ProgressEvent {
    pub fn new(
        event_type: EventKind,
        job_id: &str,
        step: &str,
        message: impl Into<String>,
        progress: u8,
    ) -> Self {
        Self {
            event_type,
            job_id: job_id.to_string(),
            status: None,
            data: EventData {
                step: step.to_string(),
                message: message.into(),
                progress: progress.min(COMPLETE),
                extra: Map::new(),
            },
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.extra.insert(key.to_string(), value.into());
        self
    }

    /// Merges the fields of a JSON object into the event payload. Reserved
    /// keys (`step`, `message`, `progress`) are left untouched.
    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        for (k, v) in fields {
            if !matches!(k.as_str(), "step" | "message" | "progress") {
                self.data.extra.insert(k, v);
            }
        }
        self
    }

    pub fn finished(mut self) -> Self {
        self.status = Some("finished".to_string());
        self
    }
}
