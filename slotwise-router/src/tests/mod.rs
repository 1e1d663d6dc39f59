//! In-memory node connections for unit tests

use crate::address::NodeAddress;
use crate::command::{CommandOptions, Script};
use crate::connection::{ConnectionFactory, NodeConnection, SharedConnection};
use crate::error::{Result, RouterError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Single master owning every slot on 127.0.0.1:7000
pub fn full_layout() -> Value {
    json!([[0, 16383, ["127.0.0.1", 7000, "node-7000"]]])
}

/// Scripted connection to one fake node
///
/// Replies are served from a queue; once it is empty every command gets
/// `"OK"`. Every call is recorded, `ASKING` included.
pub struct MockConnection {
    address: NodeAddress,
    layout: Arc<Mutex<Value>>,
    slots_calls: Arc<AtomicUsize>,
    replies: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<Vec<String>>>,
    closed: AtomicBool,
}

impl MockConnection {
    fn with_layout(
        address: &NodeAddress,
        layout: Arc<Mutex<Value>>,
        slots_calls: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            address: address.clone(),
            layout,
            slots_calls,
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Standalone connection with an empty discovery layout
    pub fn shared(address: &NodeAddress) -> SharedConnection {
        Arc::new(Self::with_layout(
            address,
            Arc::new(Mutex::new(Value::Null)),
            Arc::new(AtomicUsize::new(0)),
        ))
    }

    pub fn push_reply(&self, reply: Value) {
        self.replies.lock().push_back(Ok(reply));
    }

    /// Queue a server error reply
    pub fn push_error(&self, message: &str) {
        self.replies
            .lock()
            .push_back(Err(RouterError::Server(message.to_string())));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_reply(&self, args: Vec<String>) -> Result<Value> {
        self.calls.lock().push(args);
        self.replies.lock().pop_front().unwrap_or_else(|| Ok(json!("OK")))
    }
}

#[async_trait]
impl NodeConnection for MockConnection {
    async fn send_command(&self, args: &[String], _options: &CommandOptions) -> Result<Value> {
        if self.is_closed() {
            return Err(RouterError::Connection(format!("{} is closed", self.address)));
        }
        self.next_reply(args.to_vec())
    }

    async fn execute_script(
        &self,
        script: &Script,
        args: &[String],
        _options: &CommandOptions,
    ) -> Result<Value> {
        let mut call = vec!["EVALSHA".to_string(), script.sha1().to_string()];
        call.extend(args.iter().cloned());
        self.next_reply(call)
    }

    async fn cluster_slots(&self) -> Result<Value> {
        self.slots_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.layout.lock().clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out one [`MockConnection`] per address
///
/// All connections answer discovery with the same layout, which tests can
/// replace at any time to simulate resharding.
pub struct MockFactory {
    layout: Arc<Mutex<Value>>,
    slots_calls: Arc<AtomicUsize>,
    nodes: Mutex<HashMap<String, Arc<MockConnection>>>,
    connects: Mutex<HashMap<String, usize>>,
    refused: Mutex<HashSet<String>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            layout: Arc::new(Mutex::new(Value::Null)),
            slots_calls: Arc::new(AtomicUsize::new(0)),
            nodes: Mutex::new(HashMap::new()),
            connects: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashSet::new()),
        })
    }

    pub fn set_layout(&self, layout: Value) {
        *self.layout.lock() = layout;
    }

    /// Make connection attempts to `url` fail
    pub fn refuse(&self, url: &str) {
        self.refused.lock().insert(url.to_string());
    }

    /// Mock for `url`, created on first use so replies can be queued early
    pub fn node(&self, url: &str) -> Arc<MockConnection> {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get(url) {
            return Arc::clone(node);
        }
        let address: NodeAddress = url.parse().unwrap();
        let node = Arc::new(MockConnection::with_layout(
            &address,
            Arc::clone(&self.layout),
            Arc::clone(&self.slots_calls),
        ));
        nodes.insert(url.to_string(), Arc::clone(&node));
        node
    }

    /// Mock for `url` if a connection to it was ever opened
    pub fn connection(&self, url: &str) -> Option<Arc<MockConnection>> {
        self.connects
            .lock()
            .contains_key(url)
            .then(|| self.node(url))
    }

    pub fn connect_count(&self, url: &str) -> usize {
        self.connects.lock().get(url).copied().unwrap_or(0)
    }

    pub fn cluster_slots_calls(&self) -> usize {
        self.slots_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, address: &NodeAddress) -> Result<SharedConnection> {
        let url = address.key();
        if self.refused.lock().contains(&url) {
            return Err(RouterError::Connection(format!("connection refused: {}", url)));
        }

        *self.connects.lock().entry(url.clone()).or_insert(0) += 1;
        let node = self.node(&url);
        node.closed.store(false, Ordering::SeqCst);
        Ok(node)
    }
}
