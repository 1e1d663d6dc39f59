//! Node addresses
//!
//! A node is identified by its `host:port` string. IPv6 hosts are written
//! in brackets (`[::1]:7000`) so the port is always the last `:` segment.

use crate::error::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network address of one cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);
        Self { host, port }
    }

    /// Canonical lookup key used by the node registry
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RouterError::InvalidAddress(s.to_string()))?;

        let port: u16 = port
            .parse()
            .map_err(|_| RouterError::InvalidAddress(s.to_string()))?;

        let address = Self::new(host, port);
        if address.host.is_empty() {
            return Err(RouterError::InvalidAddress(s.to_string()));
        }
        Ok(address)
    }
}
