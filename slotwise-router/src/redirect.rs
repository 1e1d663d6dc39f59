//! Redirect classification
//!
//! Cluster nodes answer a request for a slot they do not serve with one of
//! two error replies, each ending in the target address:
//!
//! - `MOVED <slot> <host:port>`: the slot has a new owner; the local
//!   topology is stale and must be rediscovered.
//! - `ASK <slot> <host:port>`: the slot is migrating and this key already
//!   lives on the target; send `ASKING` there and retry once, leaving the
//!   topology untouched.

use crate::cluster::MAX_SLOT;
use crate::error::RouterError;

/// Kind of redirect received from a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Ask,
    Moved,
}

/// A parsed redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub slot: u16,
    /// Target address exactly as the server reported it
    pub address: String,
}

/// Parse a server error message
///
/// Returns `None` for anything that is not a well-formed redirect. A
/// leading `-` and trailing CRLF, as seen on the raw wire, are tolerated.
/// Matching is case-sensitive, like the server.
///
/// # Example
///
/// ```
/// use slotwise_router::redirect::{parse_redirect, RedirectKind};
///
/// let redirect = parse_redirect("MOVED 3999 127.0.0.1:6381").unwrap();
/// assert_eq!(redirect.kind, RedirectKind::Moved);
/// assert_eq!(redirect.slot, 3999);
/// assert_eq!(redirect.address, "127.0.0.1:6381");
/// ```
pub fn parse_redirect(message: &str) -> Option<Redirect> {
    let message = message.trim_start_matches('-').trim_end();

    let (kind, rest) = if let Some(rest) = message.strip_prefix("MOVED ") {
        (RedirectKind::Moved, rest)
    } else if let Some(rest) = message.strip_prefix("ASK ") {
        (RedirectKind::Ask, rest)
    } else {
        return None;
    };

    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }

    let slot: u16 = parts[0].parse().ok()?;
    if slot > MAX_SLOT {
        return None;
    }
    let address = parts[parts.len() - 1].to_string();

    Some(Redirect {
        kind,
        slot,
        address,
    })
}

/// Classify a router error; only server error replies can be redirects.
pub fn classify(error: &RouterError) -> Option<Redirect> {
    error.server_message().and_then(parse_redirect)
}
