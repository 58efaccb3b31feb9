use netreport::{
    error::ParseError,
    parsers::{ParserKind, MAX_ENTRIES},
    tree::RpcTree,
};

fn leaf(tag: &str, text: &str) -> RpcTree {
    RpcTree::leaf(tag, text)
}

fn route_table(name: &str, routes: usize, count: Option<usize>) -> RpcTree {
    let mut table = RpcTree::new("route-table").with_child(leaf("table-name", name));
    if let Some(count) = count {
        table = table
            .with_child(leaf("destination-count", &count.to_string()))
            .with_child(leaf("total-route-count", &count.to_string()))
            .with_child(leaf("active-route-count", &count.to_string()));
    }
    table.with_children((0..routes).map(|i| {
        RpcTree::new("rt")
            .with_child(leaf("rt-destination", &format!("10.{}.{}.0/24", i / 256, i % 256)))
            .with_child(
                RpcTree::new("rt-entry")
                    .with_child(leaf("protocol-name", "Static"))
                    .with_child(leaf("preference", "5"))
                    .with_child(RpcTree::new("nh").with_child(leaf("to", "192.0.2.1"))),
            )
    }))
}

#[test]
fn device_os_reads_software_information() {
    let tree = RpcTree::new("software-information")
        .with_child(leaf("host-name", "edge-1"))
        .with_child(leaf("product-model", "mx204"))
        .with_child(leaf("junos-version", " 21.4R3 "));
    let out = ParserKind::DeviceOs.parse(&tree).unwrap();
    let info = &out["software_information"];
    assert_eq!(info["hostname"], "edge-1");
    assert_eq!(info["model"], "mx204");
    assert_eq!(info["version"], "21.4R3");
    assert_eq!(info["serial_number"], "Unknown");
    assert_eq!(out["format"], "structured");
}

#[test]
fn device_os_accepts_wrapped_multi_engine_reply() {
    let tree = RpcTree::new("multi-routing-engine-results").with_child(
        RpcTree::new("multi-routing-engine-item").with_child(
            RpcTree::new("software-information")
                .with_child(leaf("product-model", "mx480"))
                .with_child(
                    RpcTree::new("package-information").with_child(leaf("comment", "JUNOS 20.4")),
                ),
        ),
    );
    let out = ParserKind::DeviceOs.parse(&tree).unwrap();
    assert_eq!(out["software_information"]["model"], "mx480");
    assert_eq!(out["software_information"]["version"], "JUNOS 20.4");
}

#[test]
fn routes_cap_rows_but_keep_summary_total() {
    let tree = RpcTree::new("route-information").with_child(route_table("inet.0", 350, Some(350)));
    let out = ParserKind::Routes.parse(&tree).unwrap();
    assert_eq!(out["routes"].as_array().unwrap().len(), MAX_ENTRIES);
    assert_eq!(out["total_count"], 350);
    assert_eq!(out["truncated"], true);
    assert_eq!(out["route_tables"][0]["table_name"], "inet.0");
    assert_eq!(out["route_tables"][0]["total_routes"], 350);
    assert_eq!(out["routes"][0]["destination"], "10.0.0.0/24");
    assert_eq!(out["routes"][0]["next_hop"], "192.0.2.1");
}

#[test]
fn routes_total_sums_tables() {
    let tree = RpcTree::new("route-information")
        .with_child(route_table("inet.0", 3, Some(120)))
        .with_child(route_table("inet6.0", 2, Some(30)));
    let out = ParserKind::Routes.parse(&tree).unwrap();
    assert_eq!(out["total_count"], 150);
    assert_eq!(out["routes"].as_array().unwrap().len(), 5);
    assert_eq!(out["truncated"], false);
}

#[test]
fn routes_without_summary_count_rows() {
    let tree = RpcTree::new("route-information").with_child(route_table("inet.0", 7, None));
    let out = ParserKind::Routes.parse(&tree).unwrap();
    assert_eq!(out["total_count"], 7);
    assert_eq!(out["route_tables"][0]["total_routes"], 0);
}

#[test]
fn bgp_uses_peer_count_summary() {
    let peer = |addr: &str, state: &str| {
        RpcTree::new("bgp-peer")
            .with_child(leaf("peer-address", addr))
            .with_child(leaf("peer-as", "65001"))
            .with_child(leaf("peer-state", state))
    };
    let tree = RpcTree::new("bgp-information")
        .with_child(leaf("peer-count", "2"))
        .with_child(leaf("down-peer-count", "1"))
        .with_child(peer("10.0.0.1", "Established"))
        .with_child(peer("10.0.0.2", "Active"));
    let out = ParserKind::Bgp.parse(&tree).unwrap();
    assert_eq!(out["total_count"], 2);
    assert_eq!(out["down_peers"], 1);
    assert_eq!(out["bgp_peers"][1]["state"], "Active");
    assert_eq!(out["bgp_peers"][0]["flaps"], "0");
    assert_eq!(out["bgp_peers"][0]["uptime"], "Unknown");
}

#[test]
fn bgp_non_numeric_summary_falls_back_to_enumeration() {
    let tree = RpcTree::new("bgp-information")
        .with_child(leaf("peer-count", "n/a"))
        .with_child(RpcTree::new("bgp-peer").with_child(leaf("peer-address", "10.0.0.9")));
    let out = ParserKind::Bgp.parse(&tree).unwrap();
    assert_eq!(out["total_count"], 1);
    assert_eq!(out["down_peers"], 0);
}

#[test]
fn interfaces_default_missing_fields() {
    let tree = RpcTree::new("interface-information")
        .with_child(
            RpcTree::new("physical-interface")
                .with_child(leaf("name", "xe-0/0/0"))
                .with_child(leaf("oper-status", "down"))
                .with_child(
                    RpcTree::new("logical-interface")
                        .with_child(leaf("name", "xe-0/0/0.0"))
                        .with_child(leaf("description", "uplink")),
                ),
        )
        .with_child(RpcTree::new("physical-interface"));
    let out = ParserKind::Interfaces.parse(&tree).unwrap();
    let ifd = &out["interfaces"][0];
    assert_eq!(out["total_count"], 1);
    assert_eq!(ifd["admin_status"], "Unknown");
    assert_eq!(ifd["oper_status"], "down");
    assert_eq!(ifd["description"], "");
    assert_eq!(ifd["logical_interfaces"][0]["description"], "uplink");
}

#[test]
fn interface_statistics_read_counters() {
    let tree = RpcTree::new("interface-information").with_child(
        RpcTree::new("physical-interface")
            .with_child(leaf("name", "ge-0/0/1"))
            .with_child(
                RpcTree::new("traffic-statistics")
                    .with_child(leaf("input-bytes", "1024"))
                    .with_child(leaf("output-packets", "7")),
            )
            .with_child(RpcTree::new("input-error-list").with_child(leaf("input-errors", "3"))),
    );
    let out = ParserKind::InterfaceStatistics.parse(&tree).unwrap();
    let stats = &out["interfaces"][0]["statistics"];
    assert_eq!(out["interfaces"][0]["name"], "ge-0/0/1");
    assert_eq!(stats["input_bytes"], 1024);
    assert_eq!(stats["output_packets"], 7);
    assert_eq!(stats["input_errors"], 3);
    assert_eq!(stats["output_errors"], 0);
}

#[test]
fn ospf_neighbors_are_capped() {
    let tree = RpcTree::new("ospf-neighbor-information").with_children((0..150).map(|i| {
        RpcTree::new("ospf-neighbor")
            .with_child(leaf("neighbor-id", &format!("192.0.2.{i}")))
            .with_child(leaf("ospf-neighbor-state", "Full"))
    }));
    let out = ParserKind::Ospf.parse(&tree).unwrap();
    assert_eq!(out["ospf_neighbors"].as_array().unwrap().len(), MAX_ENTRIES);
    assert_eq!(out["total_count"], 150);
    assert_eq!(out["truncated"], true);
}

#[test]
fn mpls_and_rsvp_use_display_count() {
    let summary = RpcTree::new("rsvp-session-data").with_child(leaf("display-count", "12"));
    let lsps = RpcTree::new("mpls-lsp-information").with_child(
        summary.clone().with_child(
            RpcTree::new("mpls-lsp")
                .with_child(leaf("lsp-name", "to-pe2"))
                .with_child(leaf("lsp-state", "Up")),
        ),
    );
    let out = ParserKind::Mpls.parse(&lsps).unwrap();
    assert_eq!(out["total_count"], 12);
    assert_eq!(out["mpls_lsps"][0]["name"], "to-pe2");
    assert_eq!(out["mpls_lsps"][0]["destination"], "Unknown");

    let rsvp = RpcTree::new("rsvp-session-information").with_child(
        summary.with_child(
            RpcTree::new("rsvp-session")
                .with_child(leaf("session-dst-addr", "198.51.100.2"))
                .with_child(leaf("session-type", "Ingress")),
        ),
    );
    let out = ParserKind::Rsvp.parse(&rsvp).unwrap();
    assert_eq!(out["total_count"], 12);
    assert_eq!(out["rsvp_sessions"][0]["destination"], "198.51.100.2");
    assert!(out["rsvp_sessions"][0].get("type").is_some());

    // A router that is ingress for one LSP and transit for three others.
    let mixed = RpcTree::new("mpls-lsp-information")
        .with_child(
            RpcTree::new("rsvp-session-data")
                .with_child(leaf("session-type", "Ingress"))
                .with_child(leaf("display-count", "1"))
                .with_child(RpcTree::new("mpls-lsp").with_child(leaf("lsp-name", "to-pe3"))),
        )
        .with_child(
            RpcTree::new("rsvp-session-data")
                .with_child(leaf("session-type", "Transit"))
                .with_child(leaf("display-count", "3"))
                .with_children((0..3).map(|i| {
                    RpcTree::new("rsvp-session").with_child(leaf("name", &format!("transit-{i}")))
                })),
        )
        .with_child(
            RpcTree::new("rsvp-session-data")
                .with_child(leaf("session-type", "Egress"))
                .with_child(leaf("display-count", "0")),
        );
    let out = ParserKind::Mpls.parse(&mixed).unwrap();
    assert_eq!(out["total_count"], 1);
    assert_eq!(out["mpls_lsps"].as_array().unwrap().len(), 1);
    assert_eq!(out["truncated"], false);
}

#[test]
fn ldp_sessions_parse_with_fallback_tags() {
    let tree = RpcTree::new("ldp-session-information").with_child(
        RpcTree::new("ldp-session")
            .with_child(leaf("ldp-neighbor-address", "10.255.0.2"))
            .with_child(leaf("ldp-session-state", "Operational")),
    );
    let out = ParserKind::Ldp.parse(&tree).unwrap();
    assert_eq!(out["ldp_sessions"][0]["ldp_id"], "10.255.0.2");
    assert_eq!(out["ldp_sessions"][0]["state"], "Operational");
    assert_eq!(out["total_count"], 1);
}

#[test]
fn unexpected_root_is_a_parse_error() {
    let tree = RpcTree::new("rpc-reply").with_child(leaf("output", "error: syntax error"));
    match ParserKind::Bgp.parse(&tree) {
        Err(ParseError::UnexpectedRoot { expected, found }) => {
            assert_eq!(expected, "bgp-information");
            assert_eq!(found, "rpc-reply");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parsing_is_deterministic() {
    let tree = RpcTree::new("route-information").with_child(route_table("inet.0", 20, Some(20)));
    assert_eq!(
        ParserKind::Routes.parse(&tree).unwrap(),
        ParserKind::Routes.parse(&tree).unwrap()
    );
}
