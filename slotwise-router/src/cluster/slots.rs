//! Topology map
//!
//! Owns every node connection and the current [`TopologySnapshot`].
//! Readers clone the snapshot `Arc` under a short read lock, so a routing
//! decision always sees one consistent layout. Discovery builds a whole new
//! snapshot off to the side and publishes it with a single pointer swap.
//!
//! Discovery is single-flight: rounds are serialised behind an async
//! mutex, and a caller that observed round `n` before waiting simply takes
//! the outcome of any round completed after `n` instead of querying the
//! cluster again.

use super::discovery::{parse_cluster_slots, validate_layout};
use super::hash_slot::hash_slot;
use super::topology::TopologySnapshot;
use super::types::{ClusterNode, MAX_SLOT, SlotRange};
use crate::address::NodeAddress;
use crate::config::ClusterConfig;
use crate::connection::{ConnectionFactory, SharedConnection};
use crate::error::{Result, RouterError};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::iter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Bookkeeping for single-flight discovery
#[derive(Debug, Default)]
struct DiscoveryRound {
    /// Rounds finished so far (successful or not)
    completed: u64,
    /// Error of the most recent round, shared with coalesced waiters
    last_error: Option<String>,
}

/// Slot-to-node mapping and node registry of a cluster
pub struct ClusterSlots {
    config: Arc<ClusterConfig>,
    factory: Arc<dyn ConnectionFactory>,
    snapshot: RwLock<Option<Arc<TopologySnapshot>>>,
    discovery: Mutex<DiscoveryRound>,
    rounds: AtomicU64,
}

impl ClusterSlots {
    pub fn new(config: Arc<ClusterConfig>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            config,
            factory,
            snapshot: RwLock::new(None),
            discovery: Mutex::new(DiscoveryRound::default()),
            rounds: AtomicU64::new(0),
        }
    }

    /// Initial discovery against the root nodes, in order
    ///
    /// Returns immediately when a topology is already in place.
    pub async fn connect(&self) -> Result<()> {
        let mut round = self.discovery.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let mut failures = Vec::new();
        for root in &self.config.root_nodes {
            let address: NodeAddress = match root.parse() {
                Ok(address) => address,
                Err(e) => {
                    warn!("Skipping root node {}: {}", root, e);
                    failures.push(format!("{}: {}", root, e));
                    continue;
                }
            };

            let connection = match self.factory.connect(&address).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Root node {} unreachable: {}", address, e);
                    failures.push(format!("{}: {}", address, e));
                    continue;
                }
            };

            match self.rediscover(&mut round, &address, &connection).await {
                Ok(adopted) => {
                    if !adopted {
                        close_all(&[connection]).await;
                    }
                    info!("Connected to cluster via root node {}", address);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Discovery through root node {} failed: {}", address, e);
                    close_all(&[connection]).await;
                    failures.push(format!("{}: {}", address, e));
                }
            }
        }

        Err(RouterError::NoReachableRootNode(failures))
    }

    /// Number of discovery rounds completed so far
    ///
    /// Capture it before an attempt and hand it to [`discover_since`] so a
    /// round that finished in the meantime is reused.
    ///
    /// [`discover_since`]: Self::discover_since
    pub fn discovery_round(&self) -> u64 {
        self.rounds.load(Ordering::Acquire)
    }

    /// Refresh the topology by querying `seed`
    pub async fn discover(&self, seed: &ClusterNode) -> Result<()> {
        self.discover_since(self.discovery_round(), seed).await
    }

    /// Refresh the topology unless a round completed after `observed_round`
    pub async fn discover_since(&self, observed_round: u64, seed: &ClusterNode) -> Result<()> {
        let mut round = self.discovery.lock().await;

        if round.completed > observed_round {
            debug!(
                "Reusing discovery round {} (observed {})",
                round.completed, observed_round
            );
            return match &round.last_error {
                None => Ok(()),
                Some(msg) => Err(RouterError::Discovery(msg.clone())),
            };
        }

        if !self.is_connected() {
            return Err(RouterError::NotDiscovered);
        }

        debug!("Rediscovering cluster topology via {}", seed.address());
        let outcome = self
            .rediscover(&mut round, seed.address(), seed.connection())
            .await
            .map(|_| ());

        if let Err(e) = &outcome {
            self.finish_round(&mut round, Some(e.to_string()));
        }
        outcome
    }

    fn finish_round(&self, round: &mut DiscoveryRound, error: Option<String>) {
        round.completed += 1;
        round.last_error = error;
        self.rounds.store(round.completed, Ordering::Release);
    }

    /// Query `seed`, build a new snapshot and swap it in
    ///
    /// Returns whether `seed` was adopted as the connection of a node in
    /// the new topology. Must be called with the discovery lock held; on
    /// success the round is finished as soon as the snapshot is swapped.
    async fn rediscover(
        &self,
        round: &mut DiscoveryRound,
        seed_address: &NodeAddress,
        seed: &SharedConnection,
    ) -> Result<bool> {
        let reply = seed.cluster_slots().await?;
        let ranges = parse_cluster_slots(&reply, &seed_address.host)?;
        let ranges = validate_layout(ranges, self.config.require_full_coverage)?;

        let current = self.snapshot.read().clone();
        let seed_key = seed_address.key();

        let mut connections: HashMap<String, SharedConnection> = HashMap::new();
        let mut opened: Vec<SharedConnection> = Vec::new();
        let mut adopted = false;

        for address in ranges.iter().flat_map(range_addresses) {
            let key = address.key();
            if connections.contains_key(&key) {
                continue;
            }

            let existing = current
                .as_ref()
                .and_then(|snapshot| snapshot.node(&key))
                .map(|node| Arc::clone(node.connection()));

            let connection = match existing {
                Some(connection) => connection,
                None if key == seed_key => {
                    adopted = true;
                    Arc::clone(seed)
                }
                None => match self.factory.connect(address).await {
                    Ok(connection) => {
                        debug!("Opened connection to new node {}", key);
                        opened.push(Arc::clone(&connection));
                        connection
                    }
                    Err(e) => {
                        close_all(&opened).await;
                        return Err(e);
                    }
                },
            };
            connections.insert(key, connection);
        }

        let snapshot = match TopologySnapshot::build(&ranges, &connections) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                close_all(&opened).await;
                return Err(e);
            }
        };

        // Publish the round with the snapshot, before departed nodes are closed
        let previous = {
            let mut slot = self.snapshot.write();
            let previous = slot.replace(Arc::clone(&snapshot));
            self.finish_round(round, None);
            previous
        };

        if let Some(previous) = previous {
            let departed: Vec<SharedConnection> = previous
                .nodes()
                .filter(|node| snapshot.node(&node.url()).is_none())
                .map(|node| Arc::clone(node.connection()))
                .collect();
            if !departed.is_empty() {
                info!("Closing {} connection(s) to departed nodes", departed.len());
                close_all(&departed).await;
            }
        }

        info!(
            "Discovered cluster topology: {} slot ranges, {} nodes, {} masters",
            snapshot.entries().len(),
            snapshot.node_count(),
            snapshot.masters().len()
        );
        Ok(adopted)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Result<Arc<TopologySnapshot>> {
        self.snapshot.read().clone().ok_or(RouterError::NotDiscovered)
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.read().is_some()
    }

    /// Node to run an operation on
    ///
    /// Without a key, the first master. With a key, the master of the
    /// key's slot, or for read-only operations with replicas enabled, the
    /// next replica of that slot in round-robin order.
    pub fn get_client(&self, key: Option<&str>, read_only: bool) -> Result<Arc<ClusterNode>> {
        let snapshot = self.snapshot()?;

        let Some(key) = key else {
            return snapshot
                .masters()
                .first()
                .cloned()
                .ok_or(RouterError::NotDiscovered);
        };

        let slot = hash_slot(key);
        let entry = snapshot
            .entry_for_slot(slot)
            .ok_or(RouterError::SlotNotCovered(slot))?;

        if read_only && self.config.use_replicas {
            if let Some(replica) = entry.next_replica() {
                debug!("Routing read of slot {} to replica {}", slot, replica.address());
                return Ok(Arc::clone(replica));
            }
        }

        Ok(Arc::clone(entry.master()))
    }

    /// Node registered under `url` in the current snapshot
    pub fn get_node_by_url(&self, url: &str) -> Option<Arc<ClusterNode>> {
        let snapshot = self.snapshot.read().clone()?;
        let key = url
            .parse::<NodeAddress>()
            .map(|address| address.key())
            .unwrap_or_else(|_| url.to_string());
        snapshot.node(&key).cloned()
    }

    /// All distinct masters, in slot order
    pub fn get_masters(&self) -> Vec<Arc<ClusterNode>> {
        self.snapshot
            .read()
            .as_ref()
            .map(|snapshot| snapshot.masters().to_vec())
            .unwrap_or_default()
    }

    /// Master owning `slot`
    pub fn get_slot_master(&self, slot: u16) -> Result<Arc<ClusterNode>> {
        if slot > MAX_SLOT {
            return Err(RouterError::InvalidSlot(slot));
        }

        let snapshot = self.snapshot()?;
        snapshot
            .entry_for_slot(slot)
            .map(|entry| Arc::clone(entry.master()))
            .ok_or(RouterError::SlotNotCovered(slot))
    }

    /// Close every owned connection and forget the topology
    pub async fn disconnect(&self) -> Result<()> {
        let _round = self.discovery.lock().await;

        let taken = self.snapshot.write().take();
        let Some(snapshot) = taken else {
            return Ok(());
        };

        let connections: Vec<SharedConnection> = snapshot
            .nodes()
            .map(|node| Arc::clone(node.connection()))
            .collect();
        close_all(&connections).await;

        info!("Disconnected from {} cluster nodes", connections.len());
        Ok(())
    }
}

fn range_addresses(range: &SlotRange) -> impl Iterator<Item = &NodeAddress> {
    iter::once(&range.master).chain(range.replicas.iter())
}

async fn close_all(connections: &[SharedConnection]) {
    let results = join_all(connections.iter().map(|connection| connection.close())).await;
    for result in results {
        if let Err(e) = result {
            warn!("Failed to close node connection: {}", e);
        }
    }
}
