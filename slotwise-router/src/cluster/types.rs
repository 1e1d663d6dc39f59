use crate::address::NodeAddress;
use crate::connection::SharedConnection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Total number of hash slots
pub const TOTAL_SLOTS: u16 = 16384;

/// Highest valid slot number
pub const MAX_SLOT: u16 = TOTAL_SLOTS - 1;

/// Role a node plays in the current topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Replica,
}

/// One server process and the connection owned for it
pub struct ClusterNode {
    address: NodeAddress,
    role: NodeRole,
    connection: SharedConnection,
}

impl ClusterNode {
    pub fn new(address: NodeAddress, role: NodeRole, connection: SharedConnection) -> Self {
        Self {
            address,
            role,
            connection,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// `host:port` string identifying the node
    pub fn url(&self) -> String {
        self.address.key()
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn connection(&self) -> &SharedConnection {
        &self.connection
    }
}

impl fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterNode")
            .field("address", &self.address)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Slot range as reported by discovery (inclusive bounds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: NodeAddress,
    #[serde(default)]
    pub replicas: Vec<NodeAddress>,
}

impl SlotRange {
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

/// Slot range entry of a topology snapshot
///
/// Replicas are handed out round-robin through a per-entry cursor.
pub struct SlotEntry {
    start: u16,
    end: u16,
    master: Arc<ClusterNode>,
    replicas: Vec<Arc<ClusterNode>>,
    cursor: AtomicUsize,
}

impl SlotEntry {
    pub fn new(
        start: u16,
        end: u16,
        master: Arc<ClusterNode>,
        replicas: Vec<Arc<ClusterNode>>,
    ) -> Self {
        Self {
            start,
            end,
            master,
            replicas,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn master(&self) -> &Arc<ClusterNode> {
        &self.master
    }

    pub fn replicas(&self) -> &[Arc<ClusterNode>] {
        &self.replicas
    }

    /// Next replica in round-robin order, if any
    pub fn next_replica(&self) -> Option<&Arc<ClusterNode>> {
        if self.replicas.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        self.replicas.get(idx)
    }
}

impl fmt::Debug for SlotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotEntry")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("master", &self.master.url())
            .field(
                "replicas",
                &self.replicas.iter().map(|r| r.url()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
