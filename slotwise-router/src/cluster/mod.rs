//! Cluster topology - hash slots and node ownership
//!
//! Implements the client side of Redis-style cluster mode:
//! - Hash slot algorithm (CRC16 mod 16384, with hash tags)
//! - Discovery reply parsing and layout validation
//! - Immutable topology snapshots swapped atomically
//! - Single-flight rediscovery shared by concurrent callers

pub mod discovery;
pub mod hash_slot;
pub mod slots;
pub mod topology;
pub mod types;

pub use discovery::{parse_cluster_slots, validate_layout};
pub use hash_slot::{crc16, hash_slot};
pub use slots::ClusterSlots;
pub use topology::TopologySnapshot;
pub use types::{ClusterNode, MAX_SLOT, NodeRole, SlotEntry, SlotRange, TOTAL_SLOTS};
