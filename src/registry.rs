//! Catalog of report types.
//!
//! Built once and never mutated afterwards; jobs only read from it.

use crate::{error::ValidationError, parsers::ParserKind};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub type RpcArgs = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    System,
    Interfaces,
    Protocols,
    #[serde(rename = "MPLS")]
    Mpls,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTypeDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub rpc: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rpc_args: RpcArgs,
    #[serde(rename = "timeout")]
    pub timeout_seconds: u64,
    /// Equivalent operator CLI command, for display.
    pub command: String,
    pub parser: ParserKind,
}

impl ReportTypeDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

pub struct ReportRegistry {
    descriptors: Vec<ReportTypeDescriptor>,
    index: HashMap<String, usize>,
}

impl ReportRegistry {
    pub fn new(descriptors: Vec<ReportTypeDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.id.as_str()) {
                bail!("duplicate report type id: {}", d.id);
            }
        }
        Ok(Self::indexed(descriptors))
    }

    fn indexed(descriptors: Vec<ReportTypeDescriptor>) -> Self {
        let index = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        Self { descriptors, index }
    }

    /// The process-wide catalog of supported report types.
    pub fn builtin() -> Arc<ReportRegistry> {
        static BUILTIN: OnceLock<Arc<ReportRegistry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(Self::indexed(builtin_descriptors())))
            .clone()
    }

    pub fn lookup(&self, id: &str) -> Option<&ReportTypeDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn list_all(&self) -> &[ReportTypeDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Replaces every `all` entry (any case) with the full catalog, in
    /// catalog order. Other ids pass through untouched.
    pub fn expand_all<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        ids.iter()
            .map(|id| id.as_ref().trim())
            .flat_map(|id| {
                if id.eq_ignore_ascii_case("all") {
                    self.descriptors.iter().map(|d| d.id.clone()).collect()
                } else {
                    vec![id.to_string()]
                }
            })
            .collect()
    }

    /// Returns `(valid, invalid)` where `invalid` is exactly the requested ids
    /// missing from the catalog.
    pub fn validate<S: AsRef<str>>(&self, ids: &[S]) -> (bool, BTreeSet<String>) {
        let invalid: BTreeSet<String> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| !self.index.contains_key(*id))
            .map(str::to_string)
            .collect();
        (invalid.is_empty(), invalid)
    }

    /// Validates a request's ids as a whole and returns their descriptors in
    /// request order, with repeated ids collapsed to the first occurrence.
    pub fn resolve<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> std::result::Result<Vec<ReportTypeDescriptor>, ValidationError> {
        if ids.is_empty() {
            return Err(ValidationError::EmptyRequest);
        }
        let (valid, invalid) = self.validate(ids);
        if !valid {
            return Err(ValidationError::UnknownReportTypes(invalid));
        }
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.lookup(id).cloned())
            .collect())
    }
}

#[allow(clippy::too_many_arguments)]
fn descriptor(
    id: &str,
    name: &str,
    description: &str,
    category: Category,
    rpc: &str,
    timeout_seconds: u64,
    command: &str,
    parser: ParserKind,
) -> ReportTypeDescriptor {
    ReportTypeDescriptor {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        category,
        rpc: rpc.into(),
        rpc_args: RpcArgs::new(),
        timeout_seconds,
        command: command.into(),
        parser,
    }
}

fn builtin_descriptors() -> Vec<ReportTypeDescriptor> {
    let mut interfaces_stats = descriptor(
        "interfaces_stats",
        "Interface Statistics",
        "Detailed interface statistics and error counters",
        Category::Interfaces,
        "get-interface-information",
        60,
        "show interfaces extensive",
        ParserKind::InterfaceStatistics,
    );
    interfaces_stats
        .rpc_args
        .insert("extensive".into(), serde_json::Value::Bool(true));

    vec![
        descriptor(
            "device_os",
            "Device OS",
            "Operating system version and hardware information",
            Category::System,
            "get-software-information",
            30,
            "show version",
            ParserKind::DeviceOs,
        ),
        descriptor(
            "interfaces",
            "Interfaces",
            "Interface status and configuration summary",
            Category::Interfaces,
            "get-interface-information",
            45,
            "show interfaces",
            ParserKind::Interfaces,
        ),
        interfaces_stats,
        descriptor(
            "ospf",
            "OSPF",
            "OSPF protocol status and neighbor information",
            Category::Protocols,
            "get-ospf-neighbor-information",
            30,
            "show ospf neighbor",
            ParserKind::Ospf,
        ),
        descriptor(
            "bgp",
            "BGP",
            "BGP protocol status and peer information",
            Category::Protocols,
            "get-bgp-summary-information",
            30,
            "show bgp summary",
            ParserKind::Bgp,
        ),
        descriptor(
            "routes",
            "Routes",
            "Routing table information",
            Category::Protocols,
            "get-route-information",
            45,
            "show route",
            ParserKind::Routes,
        ),
        descriptor(
            "ldp",
            "LDP",
            "LDP label distribution sessions",
            Category::Mpls,
            "get-ldp-session-information",
            30,
            "show ldp session",
            ParserKind::Ldp,
        ),
        descriptor(
            "mpls",
            "MPLS LSPs",
            "MPLS label-switched path status",
            Category::Mpls,
            "get-mpls-lsp-information",
            30,
            "show mpls lsp",
            ParserKind::Mpls,
        ),
        descriptor(
            "rsvp",
            "RSVP",
            "RSVP signaling sessions",
            Category::Mpls,
            "get-rsvp-session-information",
            30,
            "show rsvp session",
            ParserKind::Rsvp,
        ),
    ]
}
