//! Error types for the cluster router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Router error types
#[derive(Error, Debug)]
pub enum RouterError {
    /// Error reply returned by a cluster node (redirects included)
    #[error("{0}")]
    Server(String),

    /// Transport failure reported by a node connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// No slot range entry covers the slot
    #[error("Slot {0} is not covered by the cluster topology")]
    SlotNotCovered(u16),

    /// Slot number outside 0..=16383
    #[error("Invalid slot: {0}")]
    InvalidSlot(u16),

    /// Routing attempted before the first successful discovery
    #[error("Cluster topology has not been discovered")]
    NotDiscovered,

    /// ASK target unknown even after refreshing the topology
    #[error("Cannot find node {0}")]
    UnknownNode(String),

    /// Discovery reply could not be turned into a consistent topology
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// A coalesced discovery round this caller waited on failed
    #[error("Topology discovery failed: {0}")]
    Discovery(String),

    /// Every configured root node failed during bootstrap
    #[error("No root node reachable: {}", .0.join("; "))]
    NoReachableRootNode(Vec<String>),

    /// Unparseable `host:port`
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Command or script argument encoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Command or script reply decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// No descriptor registered under this name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RouterError {
    /// Local routing invariant violations; never retried by the dispatcher.
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            Self::SlotNotCovered(_) | Self::InvalidSlot(_) | Self::NotDiscovered | Self::UnknownNode(_)
        )
    }

    /// The error reply text, if this error came from a server.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server(msg) => Some(msg),
            _ => None,
        }
    }
}
