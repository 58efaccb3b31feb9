//! Last known state per job, kept so late subscribers and polling callers can
//! still read a job's outcome after its events were published.
//!
//! Retention is bounded by capacity and by a TTL on terminal jobs. Jobs that
//! are still running are never evicted.

use crate::{
    config::Jobs,
    device::DeviceFacts,
    report::{JobSummary, ReportResult},
    util::now_rfc3339,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Connecting,
    Connected,
    Generating { index: usize, report_type: String },
    Finalizing,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub job_id: String,
    pub host: String,
    pub report_types: Vec<String>,
    pub phase: JobPhase,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceFacts>,
    pub results: BTreeMap<String, ReportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl JobState {
    pub fn queued(job_id: &str, host: &str, report_types: Vec<String>) -> Self {
        let now = now_rfc3339();
        Self {
            job_id: job_id.to_string(),
            host: host.to_string(),
            report_types,
            phase: JobPhase::Queued,
            progress: 0,
            message: "queued".to_string(),
            device_info: None,
            results: BTreeMap::new(),
            summary: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobState>,
    order: VecDeque<String>,
}

pub struct JobStore {
    inner: Mutex<Inner>,
    changed: Condvar,
    capacity: usize,
    ttl: Duration,
}

impl JobStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(cfg: &Jobs) -> Self {
        Self::new(cfg.max_retained, Duration::from_secs(cfg.retention_seconds))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, state: JobState) {
        let mut inner = self.lock();
        self.prune(&mut inner);
        let id = state.job_id.clone();
        if inner.jobs.insert(id.clone(), state).is_none() {
            inner.order.push_back(id);
        }
        self.changed.notify_all();
    }

    /// Applies `f` to the job's state. Unknown (or evicted) ids are ignored.
    pub fn update(&self, job_id: &str, f: impl FnOnce(&mut JobState)) {
        let mut inner = self.lock();
        if let Some(state) = inner.jobs.get_mut(job_id) {
            f(state);
            state.updated_at = now_rfc3339();
            if state.is_terminal() && state.finished_at.is_none() {
                state.finished_at = Some(Instant::now());
            }
        }
        self.changed.notify_all();
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.lock().jobs.get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until the job is terminal or `timeout` elapses; returns the
    /// last known state either way. `None` means the id is unknown.
    pub fn wait(&self, job_id: &str, timeout: Option<Duration>) -> Option<JobState> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.lock();
        loop {
            let state = inner.jobs.get(job_id)?;
            if state.is_terminal() {
                return Some(state.clone());
            }
            inner = match deadline {
                None => self
                    .changed
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Some(state.clone());
                    }
                    self.changed
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn prune(&self, inner: &mut Inner) {
        let ttl = self.ttl;
        let expired: Vec<String> = inner
            .jobs
            .values()
            .filter(|s| s.finished_at.is_some_and(|at| at.elapsed() > ttl))
            .map(|s| s.job_id.clone())
            .collect();
        for id in expired {
            debug!("expiring job state {id}");
            inner.jobs.remove(&id);
            inner.order.retain(|o| o != &id);
        }

        while inner.jobs.len() >= self.capacity {
            let oldest_terminal = inner
                .order
                .iter()
                .position(|id| inner.jobs.get(id).is_some_and(JobState::is_terminal));
            let Some(pos) = oldest_terminal else {
                warn!(
                    "job store over capacity ({}) with no finished jobs to evict",
                    self.capacity
                );
                break;
            };
            if let Some(id) = inner.order.remove(pos) {
                debug!("evicting job state {id}");
                inner.jobs.remove(&id);
            }
        }
    }
}
