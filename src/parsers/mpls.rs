use super::{capped, summed_count, text_or, to_record, ReportParser, STRUCTURED, UNKNOWN};
use crate::{error::ParseError, tree::RpcTree};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LdpSession {
    pub ldp_id: String,
    pub state: String,
    pub uptime: String,
    pub interface: String,
    pub connection_state: String,
}

#[derive(Debug, Serialize)]
pub struct LdpReport {
    pub ldp_sessions: Vec<LdpSession>,
    pub total_count: usize,
    pub truncated: bool,
    pub format: &'static str,
}

/// `get-ldp-session-information`
pub struct LdpParser;

impl ReportParser for LdpParser {
    fn root(&self) -> &'static str {
        "ldp-session-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(root.descendants("ldp-session"), |s| LdpSession {
            ldp_id: text_or(s, &["ldp-neighbor-id", "ldp-neighbor-address"], UNKNOWN),
            state: text_or(s, &["ldp-session-state"], UNKNOWN),
            uptime: text_or(s, &["uptime", "ldp-session-uptime"], UNKNOWN),
            interface: text_or(s, &["interface-name"], UNKNOWN),
            connection_state: text_or(s, &["connection-state", "ldp-connection-state"], UNKNOWN),
        });
        to_record(&LdpReport {
            truncated: entries.truncated(),
            total_count: entries.seen,
            ldp_sessions: entries.items,
            format: STRUCTURED,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MplsLsp {
    pub name: String,
    pub state: String,
    pub path_type: String,
    pub uptime: String,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct MplsReport {
    pub mpls_lsps: Vec<MplsLsp>,
    pub total_count: u64,
    pub truncated: bool,
    pub format: &'static str,
}

/// `get-mpls-lsp-information`
pub struct MplsLspParser;

impl ReportParser for MplsLspParser {
    fn root(&self) -> &'static str {
        "mpls-lsp-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(root.descendants("mpls-lsp"), |l| MplsLsp {
            name: text_or(l, &["lsp-name", "name"], UNKNOWN),
            state: text_or(l, &["lsp-state"], UNKNOWN),
            path_type: text_or(l, &["lsp-path-type"], UNKNOWN),
            uptime: text_or(l, &["uptime"], UNKNOWN),
            destination: text_or(l, &["lsp-dst", "destination-address"], UNKNOWN),
        });
        to_record(&MplsReport {
            // Transit and egress sections count sessions this report does not list.
            total_count: summed_count(
                root.descendants("rsvp-session-data")
                    .filter(|section| section.contains("mpls-lsp")),
                "display-count",
            )
            .unwrap_or(entries.seen as u64),
            truncated: entries.truncated(),
            mpls_lsps: entries.items,
            format: STRUCTURED,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RsvpSession {
    pub destination: String,
    pub state: String,
    pub uptime: String,
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: String,
}

#[derive(Debug, Serialize)]
pub struct RsvpReport {
    pub rsvp_sessions: Vec<RsvpSession>,
    pub total_count: u64,
    pub truncated: bool,
    pub format: &'static str,
}

/// `get-rsvp-session-information`
pub struct RsvpParser;

impl ReportParser for RsvpParser {
    fn root(&self) -> &'static str {
        "rsvp-session-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(root.descendants("rsvp-session"), |s| RsvpSession {
            destination: text_or(s, &["session-dst-addr", "destination-address"], UNKNOWN),
            state: text_or(s, &["session-state", "lsp-state"], UNKNOWN),
            uptime: text_or(s, &["uptime"], UNKNOWN),
            name: text_or(s, &["session-name", "name"], ""),
            session_type: text_or(s, &["session-type"], UNKNOWN),
        });
        to_record(&RsvpReport {
            total_count: summed_count(root.descendants("rsvp-session-data"), "display-count")
                .unwrap_or(entries.seen as u64),
            truncated: entries.truncated(),
            rsvp_sessions: entries.items,
            format: STRUCTURED,
        })
    }
}
