//! Discovery reply parsing
//!
//! Turns a `CLUSTER SLOTS` reply into validated [`SlotRange`]s:
//!
//! ```text
//! [
//!   [0, 5460, ["127.0.0.1", 7000, "09a..."], ["127.0.0.1", 7003, "87b..."]],
//!   [5461, 10922, ["127.0.0.1", 7001, "3c2..."]],
//!   ...
//! ]
//! ```
//!
//! Each entry holds start, end, master, then zero or more replicas. Node
//! arrays carry host, port and optionally the node ID and more metadata.

use super::types::{MAX_SLOT, SlotRange};
use crate::address::NodeAddress;
use crate::error::{Result, RouterError};
use serde_json::Value;

fn invalid(msg: impl Into<String>) -> RouterError {
    RouterError::InvalidTopology(msg.into())
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_slot(value: &Value, what: &str) -> Result<u16> {
    let slot = as_u64(value).ok_or_else(|| invalid(format!("invalid {} slot: {}", what, value)))?;
    if slot > u64::from(MAX_SLOT) {
        return Err(invalid(format!("{} slot {} out of range", what, slot)));
    }
    Ok(slot as u16)
}

/// Parse one `[host, port, ...]` node array
///
/// An empty host means "the node that answered", so `seed_host` is used.
fn parse_node(value: &Value, seed_host: &str) -> Result<NodeAddress> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("expected node array, got {}", value)))?;

    if items.len() < 2 {
        return Err(invalid("node array too short"));
    }

    let host = items[0]
        .as_str()
        .ok_or_else(|| invalid(format!("invalid host: {}", items[0])))?;
    let host = if host.is_empty() { seed_host } else { host };

    let port = as_u64(&items[1])
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| invalid(format!("invalid port: {}", items[1])))?;

    Ok(NodeAddress::new(host, port))
}

/// Parse a `CLUSTER SLOTS` reply into slot ranges (unvalidated order)
pub fn parse_cluster_slots(reply: &Value, seed_host: &str) -> Result<Vec<SlotRange>> {
    let entries = reply
        .as_array()
        .ok_or_else(|| invalid(format!("expected array reply, got {}", reply)))?;

    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let items = entry
            .as_array()
            .ok_or_else(|| invalid(format!("expected slot entry array, got {}", entry)))?;

        if items.len() < 3 {
            return Err(invalid(format!(
                "slot entry needs start, end and master, got {} items",
                items.len()
            )));
        }

        let start = parse_slot(&items[0], "start")?;
        let end = parse_slot(&items[1], "end")?;
        if start > end {
            return Err(invalid(format!("slot range {}-{} is reversed", start, end)));
        }

        let master = parse_node(&items[2], seed_host)?;
        let replicas = items[3..]
            .iter()
            .map(|node| parse_node(node, seed_host))
            .collect::<Result<Vec<_>>>()?;

        ranges.push(SlotRange {
            start,
            end,
            master,
            replicas,
        });
    }

    Ok(ranges)
}

/// Sort ranges by start slot and check the layout
///
/// Overlaps are always rejected. Holes are rejected when
/// `require_full_coverage` is set; otherwise routing to an uncovered slot
/// fails later with [`RouterError::SlotNotCovered`].
pub fn validate_layout(
    mut ranges: Vec<SlotRange>,
    require_full_coverage: bool,
) -> Result<Vec<SlotRange>> {
    if ranges.is_empty() {
        return Err(invalid("discovery returned no slot ranges"));
    }

    ranges.sort_by_key(|r| r.start);

    for pair in ranges.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start <= prev.end {
            return Err(invalid(format!(
                "slot ranges {}-{} and {}-{} overlap",
                prev.start, prev.end, next.start, next.end
            )));
        }
        if require_full_coverage && next.start != prev.end + 1 {
            return Err(invalid(format!(
                "slots {}-{} are not covered",
                prev.end + 1,
                next.start - 1
            )));
        }
    }

    if require_full_coverage {
        let first = &ranges[0];
        let last = &ranges[ranges.len() - 1];
        if first.start != 0 {
            return Err(invalid(format!("slots 0-{} are not covered", first.start - 1)));
        }
        if last.end != MAX_SLOT {
            return Err(invalid(format!(
                "slots {}-{} are not covered",
                last.end + 1,
                MAX_SLOT
            )));
        }
    }

    Ok(ranges)
}
