//! Response parsers, one per report category.
//!
//! A parser turns a canonical [`RpcTree`] into a structured JSON record. It is
//! pure: no I/O, same output for the same tree, and missing fields fall back
//! to defaults instead of failing. Only a reply that does not carry the
//! expected root element (or a parser panic) yields a [`ParseError`].

pub mod interfaces;
pub mod mpls;
pub mod routing;
pub mod system;

use crate::{error::ParseError, tree::RpcTree};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Upper bound on entries returned by a single list-producing parser.
pub const MAX_ENTRIES: usize = 100;

pub(crate) const UNKNOWN: &str = "Unknown";
pub(crate) const STRUCTURED: &str = "structured";

pub trait ReportParser: Sync {
    /// Element that carries the reply payload.
    fn root(&self) -> &'static str;

    fn parse(&self, root: &RpcTree) -> Result<serde_json::Value, ParseError>;
}

/// Registration table from report category to its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    DeviceOs,
    Interfaces,
    InterfaceStatistics,
    Ospf,
    Bgp,
    Routes,
    Ldp,
    Mpls,
    Rsvp,
}

impl ParserKind {
    pub fn parser(self) -> &'static dyn ReportParser {
        match self {
            ParserKind::DeviceOs => &system::DeviceOsParser,
            ParserKind::Interfaces => &interfaces::InterfacesParser,
            ParserKind::InterfaceStatistics => &interfaces::InterfaceStatisticsParser,
            ParserKind::Ospf => &routing::OspfParser,
            ParserKind::Bgp => &routing::BgpParser,
            ParserKind::Routes => &routing::RoutesParser,
            ParserKind::Ldp => &mpls::LdpParser,
            ParserKind::Mpls => &mpls::MplsLspParser,
            ParserKind::Rsvp => &mpls::RsvpParser,
        }
    }

    /// Locates the payload root in `tree` and runs the parser on it.
    ///
    /// The reply may be the payload element itself or wrap it (for example a
    /// multi routing-engine reply); the first match in document order is used.
    pub fn parse(self, tree: &RpcTree) -> Result<serde_json::Value, ParseError> {
        let parser = self.parser();
        let expected = parser.root();
        let root = if tree.tag == expected {
            tree
        } else {
            tree.descendants(expected)
                .next()
                .ok_or_else(|| ParseError::UnexpectedRoot {
                    expected: expected.to_string(),
                    found: tree.tag.clone(),
                })?
        };

        catch_unwind(AssertUnwindSafe(|| parser.parse(root)))
            .unwrap_or_else(|payload| Err(ParseError::Panicked(panic_message(&*payload))))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn to_record<T: Serialize>(record: &T) -> Result<serde_json::Value, ParseError> {
    serde_json::to_value(record).map_err(|e| ParseError::Encode(e.to_string()))
}

/// First non-blank text among `paths`, else `default`.
pub(crate) fn text_or(node: &RpcTree, paths: &[&str], default: &str) -> String {
    paths
        .iter()
        .find_map(|p| node.findtext(p))
        .unwrap_or(default)
        .to_string()
}

/// Numeric field; `None` when absent or not an unsigned integer.
pub(crate) fn number(node: &RpcTree, path: &str) -> Option<u64> {
    node.findtext(path).and_then(|t| t.parse().ok())
}

/// Sum of `field` over `sections`, or `None` when no section reports it.
pub(crate) fn summed_count<'a>(
    sections: impl Iterator<Item = &'a RpcTree>,
    field: &str,
) -> Option<u64> {
    sections
        .filter_map(|s| number(s, field))
        .fold(None, |acc, n| Some(acc.unwrap_or(0) + n))
}

/// Entries kept after applying [`MAX_ENTRIES`], plus the number seen.
pub(crate) struct Capped<T> {
    pub items: Vec<T>,
    pub seen: usize,
}

impl<T> Capped<T> {
    pub fn truncated(&self) -> bool {
        self.seen > self.items.len()
    }
}

pub(crate) fn capped<'a, T>(
    nodes: impl Iterator<Item = &'a RpcTree>,
    mut f: impl FnMut(&'a RpcTree) -> T,
) -> Capped<T> {
    let mut items = Vec::new();
    let mut seen = 0usize;
    for node in nodes {
        if items.len() < MAX_ENTRIES {
            items.push(f(node));
        }
        seen += 1;
    }
    Capped { items, seen }
}
