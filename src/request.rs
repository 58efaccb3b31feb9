use crate::{
    device::{Credentials, DeviceTarget},
    error::ValidationError,
};
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

/// A request to generate a set of report types against one device.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: String,
    pub target: DeviceTarget,
    pub credentials: Credentials,
    pub report_types: Vec<String>,
}

impl JobRequest {
    /// Builds a request with a freshly generated job id. The host is stored
    /// trimmed, matching what [`validate_host`] checks.
    pub fn new(
        mut target: DeviceTarget,
        credentials: Credentials,
        report_types: Vec<String>,
    ) -> Self {
        target.host = target.host.trim().to_string();
        Self {
            job_id: Uuid::new_v4().to_string(),
            target,
            credentials,
            report_types,
        }
    }
}

static HOST_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9:\[][A-Za-z0-9._:%\-\[\]]*$"));

pub fn validate_host(host: &str, reject_urls: bool) -> Result<(), ValidationError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ValidationError::InvalidHost("empty host".into()));
    }
    if reject_urls && looks_like_url(host) {
        return Err(ValidationError::InvalidHost(format!(
            "URL hosts are disabled: {host}"
        )));
    }
    let re = HOST_RE
        .as_ref()
        .map_err(|e| ValidationError::InvalidHost(format!("host pattern: {e}")))?;
    if !re.is_match(host) {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }
    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.contains("://")
        || s.starts_with("http:")
        || s.starts_with("https:")
        || s.starts_with("file:")
}
