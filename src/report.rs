use crate::{
    device::DeviceFacts,
    error::ReportError,
    job_store::{JobPhase, JobState},
    registry::ReportTypeDescriptor,
    util::{ensure_dir, file_stamp, now_rfc3339, round_secs},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub status: ReportStatus,
    pub name: String,
    pub description: String,
    pub rpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `timeout`, `rpc`, `transport` or `parse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub timestamp: String,
}

impl ReportResult {
    pub fn success(descriptor: &ReportTypeDescriptor, data: serde_json::Value) -> Self {
        Self {
            status: ReportStatus::Success,
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            rpc: descriptor.rpc.clone(),
            data: Some(data),
            error: None,
            error_kind: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn failure(descriptor: &ReportTypeDescriptor, err: &ReportError) -> Self {
        Self {
            status: ReportStatus::Error,
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            rpc: descriptor.rpc.clone(),
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            timestamp: now_rfc3339(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub hostname: String,
    pub device_info: DeviceFacts,
    pub reports: BTreeMap<String, ReportResult>,
    pub summary: SummaryCounts,
    pub timestamp: String,
}

impl JobSummary {
    pub fn new(
        job_id: &str,
        hostname: &str,
        device_info: DeviceFacts,
        reports: BTreeMap<String, ReportResult>,
        elapsed: Duration,
    ) -> Self {
        let successful = reports.values().filter(|r| r.is_success()).count();
        Self {
            job_id: job_id.to_string(),
            hostname: hostname.to_string(),
            device_info,
            summary: SummaryCounts {
                total: reports.len(),
                successful,
                failed: reports.len() - successful,
                duration: round_secs(elapsed),
            },
            reports,
            timestamp: now_rfc3339(),
        }
    }
}

/// Outcome of one device within a multi-device run.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRun {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceFacts>,
    pub reports: BTreeMap<String, ReportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceRun {
    pub fn from_state(state: &JobState) -> Self {
        let (status, error) = match &state.phase {
            JobPhase::Completed => (ReportStatus::Success, None),
            JobPhase::Failed => (
                ReportStatus::Error,
                Some(state.error.clone().unwrap_or_else(|| "unknown error".into())),
            ),
            phase => (
                ReportStatus::Error,
                Some(format!("did not finish in time (last phase {phase:?})")),
            ),
        };
        Self {
            status,
            job_id: Some(state.job_id.clone()),
            device_info: state.device_info.clone(),
            reports: match &state.summary {
                Some(summary) => summary.reports.clone(),
                None => state.results.clone(),
            },
            summary: state.summary.as_ref().map(|s| s.summary.clone()),
            error,
        }
    }

    /// A device whose job was never accepted or whose state is gone.
    pub fn rejected(job_id: Option<String>, err: impl fmt::Display) -> Self {
        Self {
            status: ReportStatus::Error,
            job_id,
            device_info: None,
            reports: BTreeMap::new(),
            summary: None,
            error: Some(err.to_string()),
        }
    }

    fn successful(&self) -> usize {
        self.reports.values().filter(|r| r.is_success()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetCounts {
    /// Devices times requested report types.
    pub total_reports: usize,
    pub successful: usize,
    /// Every requested report without a successful result, including those
    /// on devices that never connected.
    pub failed: usize,
    pub failed_devices: usize,
}

/// Combined outcome of running the same report types against several devices.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub devices: BTreeMap<String, DeviceRun>,
    pub total_devices: usize,
    pub report_types: Vec<String>,
    pub summary: FleetCounts,
    pub timestamp: String,
}

impl FleetReport {
    pub fn new(report_types: Vec<String>, devices: BTreeMap<String, DeviceRun>) -> Self {
        let total_reports = devices.len() * report_types.len();
        let successful = devices.values().map(DeviceRun::successful).sum();
        Self {
            summary: FleetCounts {
                total_reports,
                successful,
                failed: total_reports.saturating_sub(successful),
                failed_devices: devices
                    .values()
                    .filter(|d| d.status == ReportStatus::Error)
                    .count(),
            },
            total_devices: devices.len(),
            report_types,
            devices,
            timestamp: now_rfc3339(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.summary.failed_devices == 0
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.devices
            .iter()
            .filter(|(_, d)| d.status == ReportStatus::Error)
            .map(|(host, _)| host.as_str())
            .collect()
    }

    /// Writes the report as pretty JSON. An existing directory gets a
    /// `device_reports_<stamp>.json` file inside it. Returns the path written.
    pub fn write(&self, out: &Path) -> Result<PathBuf> {
        let path = if out.is_dir() {
            out.join(format!("device_reports_{}.json", file_stamp()))
        } else {
            out.to_path_buf()
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let body = serde_json::to_string_pretty(self).with_context(|| "encoding device reports")?;
        std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
