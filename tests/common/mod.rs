#![allow(dead_code)]

use netreport::{
    device::{Credentials, DeviceFacts, DeviceSession, DeviceTarget, DeviceTransport},
    error::{ConnectionError, RpcError},
    registry::RpcArgs,
    tree::RpcTree,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Canned outcome for one RPC name.
#[derive(Clone)]
pub enum Reply {
    Tree(RpcTree),
    Fail(RpcError),
    /// Fails with a transport error and leaves the session dead.
    Drop,
    /// Panics inside the session call.
    Panic,
}

#[derive(Default)]
struct Script {
    facts: DeviceFacts,
    replies: HashMap<String, Reply>,
    open_error: Option<ConnectionError>,
    facts_error: Option<ConnectionError>,
}

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

/// In-memory device with per-RPC scripted replies.
#[derive(Clone, Default)]
pub struct FakeTransport {
    script: Arc<Mutex<Script>>,
    pub counters: Arc<Counters>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_facts(self, model: &str, version: &str) -> Self {
        {
            let mut s = self.script.lock().unwrap();
            s.facts.model = model.to_string();
            s.facts.version = version.to_string();
        }
        self
    }

    pub fn reply(self, rpc: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(rpc.to_string(), reply);
        self
    }

    pub fn tree(self, rpc: &str, tree: RpcTree) -> Self {
        self.reply(rpc, Reply::Tree(tree))
    }

    pub fn refuse_open(self, err: ConnectionError) -> Self {
        self.script.lock().unwrap().open_error = Some(err);
        self
    }

    pub fn refuse_facts(self, err: ConnectionError) -> Self {
        self.script.lock().unwrap().facts_error = Some(err);
        self
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.counters.calls.lock().unwrap().clone()
    }
}

impl DeviceTransport for FakeTransport {
    fn open(
        &self,
        _target: &DeviceTarget,
        _credentials: &Credentials,
    ) -> Result<Box<dyn DeviceSession>, ConnectionError> {
        if let Some(err) = self.script.lock().unwrap().open_error.clone() {
            return Err(err);
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
            alive: true,
            closed: false,
        }))
    }
}

struct FakeSession {
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
    alive: bool,
    closed: bool,
}

impl DeviceSession for FakeSession {
    fn facts(&mut self) -> Result<DeviceFacts, ConnectionError> {
        let s = self.script.lock().unwrap();
        match &s.facts_error {
            Some(err) => Err(err.clone()),
            None => Ok(s.facts.clone()),
        }
    }

    fn call(&mut self, rpc: &str, _args: &RpcArgs, _timeout: Duration) -> Result<RpcTree, RpcError> {
        self.counters.calls.lock().unwrap().push(rpc.to_string());
        if !self.alive {
            return Err(RpcError::Transport {
                rpc: rpc.to_string(),
                message: "session is down".into(),
            });
        }
        let reply = self.script.lock().unwrap().replies.get(rpc).cloned();
        match reply {
            Some(Reply::Tree(tree)) => Ok(tree),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Panic) => panic!("fake session blew up on {rpc}"),
            Some(Reply::Drop) => {
                self.alive = false;
                Err(RpcError::Transport {
                    rpc: rpc.to_string(),
                    message: "connection reset by peer".into(),
                })
            }
            None => Err(RpcError::Protocol {
                rpc: rpc.to_string(),
                message: "syntax error".into(),
            }),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive && !self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn software_tree(model: &str, version: &str) -> RpcTree {
    RpcTree::new("software-information")
        .with_child(RpcTree::leaf("host-name", "r1"))
        .with_child(RpcTree::leaf("product-model", model))
        .with_child(RpcTree::leaf("junos-version", version))
}

pub fn bgp_tree(peers: usize) -> RpcTree {
    let mut root = RpcTree::new("bgp-information")
        .with_child(RpcTree::leaf("peer-count", peers.to_string()))
        .with_child(RpcTree::leaf("down-peer-count", "0"));
    for i in 0..peers {
        root = root.with_child(
            RpcTree::new("bgp-peer")
                .with_child(RpcTree::leaf("peer-address", format!("10.0.0.{}", i + 1)))
                .with_child(RpcTree::leaf("peer-as", format!("6500{i}")))
                .with_child(RpcTree::leaf("peer-state", "Established"))
                .with_child(RpcTree::leaf("flap-count", "0"))
                .with_child(RpcTree::leaf("elapsed-time", "1w2d")),
        );
    }
    root
}

pub fn interfaces_tree(names: &[&str]) -> RpcTree {
    RpcTree::new("interface-information").with_children(names.iter().map(|name| {
        RpcTree::new("physical-interface")
            .with_child(RpcTree::leaf("name", *name))
            .with_child(RpcTree::leaf("admin-status", "up"))
            .with_child(RpcTree::leaf("oper-status", "up"))
            .with_child(RpcTree::leaf("mtu", "1514"))
    }))
}

/// A device answering `device_os`, `interfaces` and `bgp`.
pub fn healthy_device() -> FakeTransport {
    FakeTransport::new()
        .with_facts("X", "Y")
        .tree("get-software-information", software_tree("X", "Y"))
        .tree(
            "get-interface-information",
            interfaces_tree(&["ge-0/0/0", "ge-0/0/1"]),
        )
        .tree("get-bgp-summary-information", bgp_tree(2))
}
