use super::{capped, number, text_or, to_record, ReportParser, MAX_ENTRIES, STRUCTURED, UNKNOWN};
use crate::{error::ParseError, tree::RpcTree};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OspfNeighbor {
    pub neighbor_id: String,
    pub interface: String,
    pub state: String,
    pub priority: String,
    pub dead_time: String,
    pub adjacency_state: String,
}

#[derive(Debug, Serialize)]
pub struct OspfReport {
    pub ospf_neighbors: Vec<OspfNeighbor>,
    pub total_count: usize,
    pub truncated: bool,
    pub format: &'static str,
}

/// `get-ospf-neighbor-information`
pub struct OspfParser;

impl ReportParser for OspfParser {
    fn root(&self) -> &'static str {
        "ospf-neighbor-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(root.descendants("ospf-neighbor"), |n| OspfNeighbor {
            neighbor_id: text_or(n, &["neighbor-id"], UNKNOWN),
            interface: text_or(n, &["interface-name"], UNKNOWN),
            state: text_or(n, &["ospf-neighbor-state"], UNKNOWN),
            priority: text_or(n, &["neighbor-priority"], UNKNOWN),
            dead_time: text_or(n, &["neighbor-dead-time", "activity-timer"], UNKNOWN),
            adjacency_state: text_or(n, &["adjacency-state"], UNKNOWN),
        });
        to_record(&OspfReport {
            truncated: entries.truncated(),
            total_count: entries.seen,
            ospf_neighbors: entries.items,
            format: STRUCTURED,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BgpPeer {
    pub peer_address: String,
    pub peer_as: String,
    pub state: String,
    pub flaps: String,
    pub uptime: String,
    pub input_messages: String,
    pub output_messages: String,
}

#[derive(Debug, Serialize)]
pub struct BgpReport {
    pub bgp_peers: Vec<BgpPeer>,
    pub total_count: u64,
    pub down_peers: u64,
    pub truncated: bool,
    pub format: &'static str,
}

/// `get-bgp-summary-information`
pub struct BgpParser;

impl ReportParser for BgpParser {
    fn root(&self) -> &'static str {
        "bgp-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let entries = capped(root.descendants("bgp-peer"), |p| BgpPeer {
            peer_address: text_or(p, &["peer-address"], UNKNOWN),
            peer_as: text_or(p, &["peer-as"], UNKNOWN),
            state: text_or(p, &["peer-state"], UNKNOWN),
            flaps: text_or(p, &["flap-count"], "0"),
            uptime: text_or(p, &["elapsed-time"], UNKNOWN),
            input_messages: text_or(p, &["input-messages"], "0"),
            output_messages: text_or(p, &["output-messages"], "0"),
        });
        to_record(&BgpReport {
            total_count: number(root, "peer-count").unwrap_or(entries.seen as u64),
            down_peers: number(root, "down-peer-count").unwrap_or(0),
            truncated: entries.truncated(),
            bgp_peers: entries.items,
            format: STRUCTURED,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RouteTable {
    pub table_name: String,
    pub destinations: u64,
    pub total_routes: u64,
    pub active_routes: u64,
}

#[derive(Debug, Serialize)]
pub struct Route {
    pub destination: String,
    pub protocol: String,
    pub age: String,
    pub next_hop: String,
    pub preference: String,
}

#[derive(Debug, Serialize)]
pub struct RoutesReport {
    pub route_tables: Vec<RouteTable>,
    pub routes: Vec<Route>,
    pub total_count: u64,
    pub truncated: bool,
    pub format: &'static str,
}

/// One row per `rt-entry`; the destination lives on the enclosing `rt`.
fn route_rows(root: &RpcTree) -> impl Iterator<Item = (&RpcTree, &RpcTree)> {
    root.descendants("rt").flat_map(|rt| {
        let entries: Vec<&RpcTree> = rt.children.iter().filter(|c| c.tag == "rt-entry").collect();
        if entries.is_empty() {
            vec![(rt, rt)]
        } else {
            entries.into_iter().map(|e| (rt, e)).collect()
        }
    })
}

/// `get-route-information`
pub struct RoutesParser;

impl ReportParser for RoutesParser {
    fn root(&self) -> &'static str {
        "route-information"
    }

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let route_tables: Vec<RouteTable> = root
            .descendants("route-table")
            .map(|t| RouteTable {
                table_name: text_or(t, &["table-name"], UNKNOWN),
                destinations: number(t, "destination-count").unwrap_or(0),
                total_routes: number(t, "total-route-count")
                    .or_else(|| number(t, "route-count"))
                    .unwrap_or(0),
                active_routes: number(t, "active-route-count").unwrap_or(0),
            })
            .collect();

        let mut rows = Vec::new();
        let mut seen = 0usize;
        for (rt, entry) in route_rows(root) {
            if rows.len() < MAX_ENTRIES {
                rows.push(Route {
                    destination: text_or(rt, &["rt-destination"], UNKNOWN),
                    protocol: text_or(entry, &["protocol-name"], UNKNOWN),
                    age: text_or(entry, &["age"], UNKNOWN),
                    next_hop: text_or(entry, &["nh/to", "nh/via", "next-hop"], UNKNOWN),
                    preference: text_or(entry, &["preference"], UNKNOWN),
                });
            }
            seen += 1;
        }

        // Table counters cover every route, including rows past the cap.
        let reported = root.descendants("route-table").any(|t| {
            t.child("total-route-count").is_some() || t.child("route-count").is_some()
        });
        let total_count = if reported {
            route_tables.iter().map(|t| t.total_routes).sum()
        } else {
            seen as u64
        };

        to_record(&RoutesReport {
            route_tables,
            truncated: seen > rows.len(),
            routes: rows,
            total_count,
            format: STRUCTURED,
        })
    }
}
