use super::{capped, number, text_or, to_record, ReportParser, STRUCTURED, UNKNOWN};
use crate::{error::ParseError, tree::RpcTree};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LogicalInterface {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct Interface {
    pub name: String,
    pub admin_status: String,
    pub oper_status: String,
    pub description: String,
    pub mtu: String,
    pub speed: String,
    pub mac_address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logical_interfaces: Vec<LogicalInterface>,
}

#[derive(Debug, Default, Serialize)]
pub struct TrafficStatistics {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub input_packets: u64,
    pub output_packets: u64,
    pub input_errors: u64,
    pub output_errors: u64,
    pub input_drops: u64,
    pub output_drops: u64,
    pub carrier_transitions: u64,
}

#[derive(Debug, Serialize)]
pub struct InterfaceWithStatistics {
    #[serde(flatten)]
    pub interface: Interface,
    pub statistics: TrafficStatistics,
}

#[derive(Debug, Serialize)]
pub struct InterfacesReport<T> {
    pub interfaces: Vec<T>,
    pub total_count: usize,
    pub truncated: bool,
    pub format: &'static str,
}

fn named_physical(root: &RpcTree) -> impl Iterator<Item = &RpcTree> {
    root.descendants("physical-interface")
        .filter(|p| p.findtext("name").is_some())
}

fn interface(node: &RpcTree) -> Interface {
    Interface {
        name: text_or(node, &["name"], ""),
        admin_status: text_or(node, &["admin-status"], UNKNOWN),
        oper_status: text_or(node, &["oper-status"], UNKNOWN),
        description: text_or(node, &["description"], ""),
        mtu: text_or(node, &["mtu"], UNKNOWN),
        speed: text_or(node, &["speed"], UNKNOWN),
        mac_address: text_or(node, &["mac-address", "current-physical-address"], UNKNOWN),
        logical_interfaces: node
            .descendants("logical-interface")
            .filter(|l| l.child("name").is_some())
            .map(|l| LogicalInterface {
                name: text_or(l, &["name"], ""),
                description: text_or(l, &["description"], ""),
            })
            .collect(),
    }
}

fn statistics(node: &RpcTree) -> TrafficStatistics {
    let n = |path: &str| number(node, path).unwrap_or(0);
    TrafficStatistics {
        input_bytes: n("traffic-statistics/input-bytes"),
        output_bytes: n("traffic-statistics/output-bytes"),
        input_packets: n("traffic-statistics/input-packets"),
        output_packets: n("traffic-statistics/output-packets"),
        input_errors: n("input-error-list/input-errors"),
        output_errors: n("output-error-list/output-errors"),
        input_drops: n("input-error-list/input-drops"),
        output_drops: n("output-error-list/output-drops"),
        carrier_transitions: n("output-error-list/carrier-transitions"),
    }
}

/// `get-interface-information`
pub struct InterfacesParser;

impl ReportParser for InterfacesParser {
    fn root(&self) -> &'static str {
        "interface-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(named_physical(root), interface);
        to_record(&InterfacesReport {
            truncated: entries.truncated(),
            total_count: entries.seen,
            interfaces: entries.items,
            format: STRUCTURED,
        })
    }
}

/// `get-interface-information` with `extensive`.
pub struct InterfaceStatisticsParser;

impl ReportParser for InterfaceStatisticsParser {
    fn root(&self) -> &'static str {
        "interface-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(named_physical(root), |node| InterfaceWithStatistics {
            interface: interface(node),
            statistics: statistics(node),
        });
        to_record(&InterfacesReport {
            truncated: entries.truncated(),
            total_count: entries.seen,
            interfaces: entries.items,
            format: STRUCTURED,
        })
    }
}
