//! Job orchestration.
//!
//! `submit` validates a request against the registry, records it as `Queued`
//! and hands it to a dedicated worker thread, so device I/O for one job never
//! blocks the caller or other jobs. The worker drives the job through
//! `Connecting → Connected → Generating(i)… → Finalizing → Completed`, or to
//! `Failed` on a connection error or a lost session. Report types run
//! sequentially in request order; a failing report type only produces an
//! error result for itself.

use crate::{
    device::{Credentials, DeviceTarget, DeviceTransport, ManagedSession},
    error::{JobError, ReportError, RpcError, SubmitError, ValidationError},
    events::{self, EventKind, ProgressEvent},
    job_store::{JobPhase, JobState, JobStore},
    publisher::ProgressPublisher,
    registry::{ReportRegistry, ReportTypeDescriptor},
    report::{DeviceRun, FleetReport, JobSummary, ReportResult},
    request::{validate_host, JobRequest},
    rpc,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub struct Orchestrator<T: DeviceTransport> {
    registry: Arc<ReportRegistry>,
    transport: Arc<T>,
    publisher: Arc<ProgressPublisher>,
    store: Arc<JobStore>,
    reject_url_hosts: bool,
}

impl<T: DeviceTransport + 'static> Orchestrator<T> {
    pub fn new(
        registry: Arc<ReportRegistry>,
        transport: Arc<T>,
        publisher: ProgressPublisher,
        store: JobStore,
    ) -> Self {
        Self {
            registry,
            transport,
            publisher: Arc::new(publisher),
            store: Arc::new(store),
            reject_url_hosts: true,
        }
    }

    pub fn reject_url_hosts(mut self, reject: bool) -> Self {
        self.reject_url_hosts = reject;
        self
    }

    pub fn registry(&self) -> &ReportRegistry {
        &self.registry
    }

    pub fn channel_for(&self, job_id: &str) -> String {
        self.publisher.channel_for(job_id)
    }

    /// Accepts a job and starts it in the background.
    ///
    /// Rejects synchronously, before anything is recorded, when the host or
    /// any requested report type is invalid. Everything after acceptance is
    /// reported through the job's event channel and [`Self::job_state`].
    pub fn submit(&self, request: JobRequest) -> Result<String, SubmitError> {
        validate_host(&request.target.host, self.reject_url_hosts)?;
        let reports = self.registry.resolve(&request.report_types)?;

        let job_id = request.job_id.clone();
        let ids: Vec<String> = reports.iter().map(|d| d.id.clone()).collect();
        info!(
            "accepted job {job_id} target={} report_types={:?}",
            request.target, ids
        );
        self.store
            .insert(JobState::queued(&job_id, &request.target.host, ids));

        let worker = JobWorker {
            request,
            reports,
            transport: Arc::clone(&self.transport),
            publisher: Arc::clone(&self.publisher),
            store: Arc::clone(&self.store),
            progress: 0,
        };
        let spawned = std::thread::Builder::new()
            .name(format!("report-job-{}", short_id(&job_id)))
            .spawn(move || worker.run());

        if let Err(err) = spawned {
            error!("could not start worker for job {job_id}: {err}");
            self.store.update(&job_id, |s| {
                s.phase = JobPhase::Failed;
                s.error = Some(format!("failed to start job worker: {err}"));
            });
            return Err(SubmitError::Spawn(err));
        }
        Ok(job_id)
    }

    /// Runs the same report types against several hosts, one job per host,
    /// and combines the outcomes.
    ///
    /// `all` expands to the full catalog. Unknown report types reject the
    /// whole run up front. A host that fails validation is recorded as an
    /// error entry and the other hosts still run. Repeated hosts run once.
    /// `timeout` bounds the whole run, not each job.
    pub fn run_many<H: AsRef<str>, R: AsRef<str>>(
        &self,
        hosts: &[H],
        port: u16,
        credentials: &Credentials,
        report_types: &[R],
        timeout: Option<Duration>,
    ) -> Result<FleetReport, ValidationError> {
        let requested = self.registry.expand_all(report_types);
        let ids: Vec<String> = self
            .registry
            .resolve(&requested)?
            .into_iter()
            .map(|d| d.id)
            .collect();

        let mut hosts: Vec<&str> = hosts.iter().map(|h| h.as_ref().trim()).collect();
        let mut seen = HashSet::new();
        hosts.retain(|h| !h.is_empty() && seen.insert(*h));
        if hosts.is_empty() {
            return Err(ValidationError::InvalidHost("no hosts given".into()));
        }

        let mut devices = BTreeMap::new();
        let mut submitted = Vec::new();
        for host in hosts {
            let request = JobRequest::new(
                DeviceTarget::new(host, port),
                credentials.clone(),
                ids.clone(),
            );
            match self.submit(request) {
                Ok(job_id) => submitted.push((host.to_string(), job_id)),
                Err(err) => {
                    warn!("host {host} rejected: {err}");
                    devices.insert(host.to_string(), DeviceRun::rejected(None, err));
                }
            }
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        for (host, job_id) in submitted {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let run = match self.wait(&job_id, remaining) {
                Some(state) => DeviceRun::from_state(&state),
                None => DeviceRun::rejected(Some(job_id), "job state was evicted"),
            };
            devices.insert(host, run);
        }
        Ok(FleetReport::new(ids, devices))
    }

    pub fn job_state(&self, job_id: &str) -> Option<JobState> {
        self.store.get(job_id)
    }

    /// Blocks until the job reaches `Completed` or `Failed` (or `timeout`).
    pub fn wait(&self, job_id: &str, timeout: Option<Duration>) -> Option<JobState> {
        self.store.wait(job_id, timeout)
    }
}

fn short_id(job_id: &str) -> &str {
    job_id.get(..8).unwrap_or(job_id)
}

struct JobWorker<T: DeviceTransport> {
    request: JobRequest,
    reports: Vec<ReportTypeDescriptor>,
    transport: Arc<T>,
    publisher: Arc<ProgressPublisher>,
    store: Arc<JobStore>,
    /// Highest progress published so far; events never go below it.
    progress: u8,
}

impl<T: DeviceTransport> JobWorker<T> {
    fn run(mut self) {
        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.execute(started)))
            .unwrap_or_else(|_| Err(JobError::Internal("job worker panicked".into())));

        match outcome {
            Ok(summary) => self.complete(summary),
            Err(err) => self.fail(&err),
        }
    }

    fn job_id(&self) -> &str {
        &self.request.job_id
    }

    fn execute(&mut self, started: Instant) -> Result<JobSummary, JobError> {
        let host = self.request.target.host.clone();
        self.emit(
            ProgressEvent::new(
                EventKind::Status,
                self.job_id(),
                "connecting",
                format!("Connecting to device {host}..."),
                events::CONNECTING,
            ),
            Some(JobPhase::Connecting),
        );

        let mut session = ManagedSession::open(
            self.transport.as_ref(),
            &self.request.target,
            &self.request.credentials,
        )?;
        let facts = session.facts().clone();
        let device_info = serde_json::to_value(&facts).unwrap_or(Value::Null);
        {
            let facts = facts.clone();
            self.store
                .update(self.job_id(), move |s| s.device_info = Some(facts));
        }
        self.emit(
            ProgressEvent::new(
                EventKind::Status,
                self.job_id(),
                "connected",
                format!(
                    "Successfully connected to {host} ({} - {})",
                    facts.model, facts.version
                ),
                events::CONNECTED,
            )
            .with("device_info", device_info),
            Some(JobPhase::Connected),
        );

        let generated = self.generate_all(&mut session);
        session.close();
        let results = generated?;

        Ok(JobSummary::new(
            self.job_id(),
            &host,
            facts,
            results,
            started.elapsed(),
        ))
    }

    fn generate_all(
        &mut self,
        session: &mut ManagedSession,
    ) -> Result<BTreeMap<String, ReportResult>, JobError> {
        let total = self.reports.len();
        let reports = std::mem::take(&mut self.reports);
        let mut results = BTreeMap::new();

        for (index, descriptor) in reports.iter().enumerate() {
            self.emit(
                ProgressEvent::new(
                    EventKind::Status,
                    self.job_id(),
                    "generating_report",
                    format!("Generating {} report...", descriptor.name),
                    events::report_progress(index, total),
                )
                .with("report_type", descriptor.id.as_str()),
                Some(JobPhase::Generating {
                    index,
                    report_type: descriptor.id.clone(),
                }),
            );

            let outcome = rpc::generate(session, descriptor);
            let result = match &outcome {
                Ok(data) => {
                    info!("job {} generated {}", self.job_id(), descriptor.id);
                    ReportResult::success(descriptor, data.clone())
                }
                Err(err) => {
                    warn!("job {} report {} failed: {err}", self.job_id(), descriptor.id);
                    ReportResult::failure(descriptor, err)
                }
            };

            self.record(index, total, descriptor, result.clone());
            results.insert(descriptor.id.clone(), result);

            if let Err(ReportError::Rpc(RpcError::Transport { message, .. })) = &outcome {
                if !session.is_alive() {
                    // Every requested id still gets a result before the job fails.
                    for (skipped, rest) in reports.iter().enumerate().skip(index + 1) {
                        let err = ReportError::Rpc(RpcError::Transport {
                            rpc: rest.rpc.clone(),
                            message: format!("not run: session lost ({message})"),
                        });
                        self.record(skipped, total, rest, ReportResult::failure(rest, &err));
                    }
                    return Err(JobError::TransportLost(message.clone()));
                }
            }
        }

        self.emit(
            ProgressEvent::new(
                EventKind::Status,
                self.job_id(),
                "finalizing",
                "Finalizing report generation...",
                events::FINALIZING,
            ),
            Some(JobPhase::Finalizing),
        );
        Ok(results)
    }

    /// Publishes a report's outcome and stores it in the job state.
    fn record(
        &mut self,
        index: usize,
        total: usize,
        descriptor: &ReportTypeDescriptor,
        result: ReportResult,
    ) {
        let mut event = ProgressEvent::new(
            EventKind::ReportComplete,
            self.job_id(),
            "report_complete",
            format!("{} report {}", descriptor.name, status_word(&result)),
            events::report_progress(index + 1, total),
        )
        .with("report_type", descriptor.id.as_str())
        .with("report_name", descriptor.name.as_str())
        .with("status", status_word(&result));
        if let Some(err) = &result.error {
            event = event.with("error", err.as_str());
        }
        self.emit(event, None);

        let id = descriptor.id.clone();
        self.store.update(self.job_id(), move |s| {
            s.results.insert(id, result);
        });
    }

    fn complete(&mut self, summary: JobSummary) {
        let message = format!(
            "Report generation complete. Generated {} of {} reports.",
            summary.summary.successful, summary.summary.total
        );
        let fields = match serde_json::to_value(&summary) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => {
                warn!("job {} summary could not be encoded: {err}", self.job_id());
                Map::new()
            }
        };
        self.emit(
            ProgressEvent::new(
                EventKind::ReportComplete,
                self.job_id(),
                "summary",
                message.clone(),
                events::FINALIZING,
            )
            .with_fields(fields),
            None,
        );
        self.emit(
            ProgressEvent::new(
                EventKind::Status,
                self.job_id(),
                "complete",
                message,
                events::COMPLETE,
            )
            .finished(),
            None,
        );

        info!(
            "job {} completed: {}/{} successful in {}s",
            self.job_id(),
            summary.summary.successful,
            summary.summary.total,
            summary.summary.duration
        );
        self.store.update(self.job_id(), move |s| {
            s.phase = JobPhase::Completed;
            s.summary = Some(summary);
        });
    }

    fn fail(&mut self, err: &JobError) {
        error!("job {} failed: {err}", self.job_id());
        let message = format!("Report generation failed: {err}");
        let progress = self.progress;
        self.emit(
            ProgressEvent::new(
                EventKind::Error,
                self.job_id(),
                "error",
                message,
                progress,
            )
            .with("error", err.to_string()),
            None,
        );
        let err = err.to_string();
        self.store.update(self.job_id(), move |s| {
            s.phase = JobPhase::Failed;
            s.error = Some(err);
        });
    }

    /// Publishes an event with progress clamped to never move backwards, and
    /// mirrors it into the job store.
    fn emit(&mut self, mut event: ProgressEvent, phase: Option<JobPhase>) {
        self.progress = self.progress.max(event.data.progress);
        event.data.progress = self.progress;
        self.publisher.publish(&event);

        let progress = self.progress;
        let message = event.data.message;
        self.store.update(&self.request.job_id, move |s| {
            s.progress = progress;
            s.message = message;
            if let Some(phase) = phase {
                s.phase = phase;
            }
        });
    }
}

fn status_word(result: &ReportResult) -> &'static str {
    if result.is_success() { "success" } else { "error" }
}
