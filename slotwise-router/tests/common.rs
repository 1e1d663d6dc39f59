//! Common test utilities
//!
//! [`FakeCluster`] is an in-memory cluster whose nodes behave like real
//! ones: they serve keys in the slots they own, answer `MOVED` for slots
//! owned elsewhere, answer `ASK` for slots marked as migrating, and honour
//! a preceding `ASKING`. Tests reshard it behind the client's back.

#![allow(dead_code)] // Not every test binary uses every helper

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use slotwise_router::{
    ClusterClient, ClusterConfig, CommandOptions, ConnectionFactory, NodeAddress, NodeConnection,
    Result, RouterError, Script, SharedConnection, hash_slot,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Route router logs to the test harness; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// One slot range: start, end, master url, replica urls
#[derive(Debug, Clone)]
pub struct Range {
    pub start: u16,
    pub end: u16,
    pub master: String,
    pub replicas: Vec<String>,
}

pub fn range(start: u16, end: u16, master: &str, replicas: &[&str]) -> Range {
    Range {
        start,
        end,
        master: master.to_string(),
        replicas: replicas.iter().map(|r| r.to_string()).collect(),
    }
}

#[derive(Default)]
struct State {
    layout: Vec<Range>,
    store: HashMap<String, Value>,
    migrating: HashMap<u16, String>,
    scripted: HashMap<String, VecDeque<Result<Value>>>,
    calls: Vec<(String, Vec<String>)>,
    connects: HashMap<String, usize>,
    refused: HashSet<String>,
    closed: HashSet<String>,
}

/// In-memory cluster and connection factory
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    discoveries: AtomicUsize,
    discovery_delay: Mutex<Option<Duration>>,
    close_delay: Mutex<Option<Duration>>,
}

impl FakeCluster {
    pub fn new(layout: Vec<Range>) -> Arc<Self> {
        let cluster = Arc::new(Self::default());
        cluster.reshard(layout);
        cluster
    }

    /// Replace slot ownership; connected clients are not told
    pub fn reshard(&self, layout: Vec<Range>) {
        self.state.lock().layout = layout;
    }

    /// Mark `slot` as migrating to `target`; its owner answers `ASK`
    pub fn migrate(&self, slot: u16, target: &str) {
        self.state.lock().migrating.insert(slot, target.to_string());
    }

    /// Queue a reply that `url` returns instead of its natural answer
    pub fn script_reply(&self, url: &str, reply: Result<Value>) {
        self.state
            .lock()
            .scripted
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn script_error(&self, url: &str, message: &str) {
        self.script_reply(url, Err(RouterError::Server(message.to_string())));
    }

    pub fn refuse(&self, url: &str) {
        self.state.lock().refused.insert(url.to_string());
    }

    /// Hold every discovery reply back for `delay`
    pub fn slow_discovery(&self, delay: Duration) {
        *self.discovery_delay.lock() = Some(delay);
    }

    /// Hold every close back for `delay`
    pub fn slow_close(&self, delay: Duration) {
        *self.close_delay.lock() = Some(delay);
    }

    pub fn set(&self, key: &str, value: Value) {
        self.state.lock().store.insert(key.to_string(), value);
    }

    /// Number of `CLUSTER SLOTS` queries answered
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    /// Commands received by `url`, in order
    pub fn calls_to(&self, url: &str) -> Vec<Vec<String>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(node, _)| node == url)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn connects_to(&self, url: &str) -> usize {
        self.state.lock().connects.get(url).copied().unwrap_or(0)
    }

    pub fn is_closed(&self, url: &str) -> bool {
        self.state.lock().closed.contains(url)
    }

    fn layout_reply(&self) -> Value {
        let state = self.state.lock();
        let entries: Vec<Value> = state
            .layout
            .iter()
            .map(|r| {
                let mut entry = vec![json!(r.start), json!(r.end), node_json(&r.master)];
                entry.extend(r.replicas.iter().map(|url| node_json(url)));
                Value::Array(entry)
            })
            .collect();
        Value::Array(entries)
    }

    /// Natural answer of node `url` for a command touching `key`
    fn serve(&self, url: &str, asking: bool, args: &[String], key: Option<&str>) -> Result<Value> {
        let mut state = self.state.lock();
        state.calls.push((url.to_string(), args.to_vec()));

        if let Some(reply) = state.scripted.get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }

        let Some(key) = key else {
            return Ok(json!("OK"));
        };

        let slot = hash_slot(key);
        let Some(owner) = state.layout.iter().find(|r| slot >= r.start && slot <= r.end) else {
            return Err(RouterError::Server(format!("CLUSTERDOWN Hash slot {} not served", slot)));
        };

        // Replicas answer reads only
        let is_read = args[0] == "GET";
        let serves =
            owner.master == url || (is_read && owner.replicas.iter().any(|r| r == url));
        let importing = state.migrating.get(&slot).is_some_and(|target| target == url);

        if !serves && !(asking && importing) {
            return Err(RouterError::Server(format!("MOVED {} {}", slot, owner.master)));
        }
        if serves {
            if let Some(target) = state.migrating.get(&slot) {
                return Err(RouterError::Server(format!("ASK {} {}", slot, target)));
            }
        }

        match args[0].as_str() {
            "SET" => {
                state.store.insert(key.to_string(), json!(args[2]));
                Ok(json!("OK"))
            }
            "GET" => Ok(state.store.get(key).cloned().unwrap_or(Value::Null)),
            _ => Ok(json!("OK")),
        }
    }

    /// Connection factory opening [`FakeNode`]s of this cluster
    pub fn factory(self: &Arc<Self>) -> Arc<dyn ConnectionFactory> {
        Arc::new(FakeFactory {
            cluster: Arc::clone(self),
        })
    }

    /// Client with the built-in commands, already connected
    pub async fn client(self: &Arc<Self>, config: ClusterConfig) -> ClusterClient {
        let client = ClusterClient::new(config, self.factory()).expect("valid config");
        client.connect().await.expect("connect");
        client
    }
}

fn node_json(url: &str) -> Value {
    let address: NodeAddress = url.parse().expect("valid node url");
    json!([address.host, address.port, format!("id-{}", url)])
}

/// Connection to one node of a [`FakeCluster`]
pub struct FakeNode {
    url: String,
    cluster: Arc<FakeCluster>,
    asking: AtomicBool,
}

#[async_trait]
impl NodeConnection for FakeNode {
    async fn send_command(&self, args: &[String], _options: &CommandOptions) -> Result<Value> {
        if self.cluster.is_closed(&self.url) {
            return Err(RouterError::Connection(format!("{} is closed", self.url)));
        }

        if args.first().map(String::as_str) == Some("ASKING") {
            self.asking.store(true, Ordering::SeqCst);
            return self.cluster.serve(&self.url, false, args, None);
        }

        let asking = self.asking.swap(false, Ordering::SeqCst);
        let key = match args.first().map(String::as_str) {
            Some("GET") | Some("SET") => args.get(1).map(String::as_str),
            _ => None,
        };
        self.cluster.serve(&self.url, asking, args, key)
    }

    async fn execute_script(
        &self,
        script: &Script,
        args: &[String],
        _options: &CommandOptions,
    ) -> Result<Value> {
        let asking = self.asking.swap(false, Ordering::SeqCst);
        let mut call = vec!["EVALSHA".to_string(), script.sha1().to_string()];
        call.extend(args.iter().cloned());

        // Wire layout: numkeys, keys..., argv...
        let key = match args.first().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => args.get(1).map(String::as_str),
            _ => None,
        };
        self.cluster.serve(&self.url, asking, &call, key)
    }

    async fn cluster_slots(&self) -> Result<Value> {
        let delay = *self.cluster.discovery_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.cluster.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(self.cluster.layout_reply())
    }

    async fn close(&self) -> Result<()> {
        let delay = *self.cluster.close_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.cluster.state.lock().closed.insert(self.url.clone());
        Ok(())
    }
}

pub struct FakeFactory {
    cluster: Arc<FakeCluster>,
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn connect(&self, address: &NodeAddress) -> Result<SharedConnection> {
        let url = address.key();
        {
            let mut state = self.cluster.state.lock();
            if state.refused.contains(&url) {
                return Err(RouterError::Connection(format!("connection refused: {}", url)));
            }
            *state.connects.entry(url.clone()).or_insert(0) += 1;
            state.closed.remove(&url);
        }

        Ok(Arc::new(FakeNode {
            url,
            cluster: Arc::clone(&self.cluster),
            asking: AtomicBool::new(false),
        }))
    }
}
