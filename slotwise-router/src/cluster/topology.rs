//! Immutable topology snapshot
//!
//! A snapshot is built once per discovery round and never edited; the
//! topology map publishes a fresh one by swapping a single `Arc`.

use super::types::{ClusterNode, NodeRole, SlotEntry, SlotRange, TOTAL_SLOTS};
use crate::address::NodeAddress;
use crate::connection::SharedConnection;
use crate::error::{Result, RouterError};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Slot range entries plus the node registry of one discovery round
#[derive(Debug)]
pub struct TopologySnapshot {
    entries: Vec<SlotEntry>,
    nodes: HashMap<String, Arc<ClusterNode>>,
    masters: Vec<Arc<ClusterNode>>,
}

impl TopologySnapshot {
    /// Build a snapshot from validated, sorted ranges
    ///
    /// `connections` must hold one connection per address in `ranges`,
    /// keyed by `host:port`. A node that masters any range is a master.
    pub fn build(
        ranges: &[SlotRange],
        connections: &HashMap<String, SharedConnection>,
    ) -> Result<Self> {
        let master_keys: HashSet<String> = ranges.iter().map(|r| r.master.key()).collect();

        let mut nodes: HashMap<String, Arc<ClusterNode>> = HashMap::new();
        let mut masters: Vec<Arc<ClusterNode>> = Vec::new();

        let mut node_for = |address: &NodeAddress| -> Result<Arc<ClusterNode>> {
            let key = address.key();
            if let Some(node) = nodes.get(&key) {
                return Ok(Arc::clone(node));
            }

            let connection = connections.get(&key).cloned().ok_or_else(|| {
                RouterError::InvalidTopology(format!("no connection for node {}", key))
            })?;
            let role = if master_keys.contains(&key) {
                NodeRole::Master
            } else {
                NodeRole::Replica
            };

            let node = Arc::new(ClusterNode::new(address.clone(), role, connection));
            if role == NodeRole::Master {
                masters.push(Arc::clone(&node));
            }
            nodes.insert(key, Arc::clone(&node));
            Ok(node)
        };

        let mut entries = Vec::with_capacity(ranges.len());
        for range in ranges {
            let master = node_for(&range.master)?;
            let replicas = range
                .replicas
                .iter()
                .map(&mut node_for)
                .collect::<Result<Vec<_>>>()?;
            entries.push(SlotEntry::new(range.start, range.end, master, replicas));
        }

        Ok(Self {
            entries,
            nodes,
            masters,
        })
    }

    /// Entry covering `slot`, if any
    pub fn entry_for_slot(&self, slot: u16) -> Option<&SlotEntry> {
        if slot >= TOTAL_SLOTS {
            return None;
        }
        self.entries
            .binary_search_by(|e| {
                if slot < e.start() {
                    Ordering::Greater
                } else if slot > e.end() {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn node(&self, url: &str) -> Option<&Arc<ClusterNode>> {
        self.nodes.get(url)
    }

    /// Distinct masters in slot order
    pub fn masters(&self) -> &[Arc<ClusterNode>] {
        &self.masters
    }

    pub fn entries(&self) -> &[SlotEntry] {
        &self.entries
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ClusterNode>> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn covered_slots(&self) -> usize {
        self.entries
            .iter()
            .map(|e| (e.end() - e.start()) as usize + 1)
            .sum()
    }
}
