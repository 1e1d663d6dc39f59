use crate::address::NodeAddress;
use crate::error::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default ceiling on redirection hops per logical operation
pub const DEFAULT_MAX_COMMAND_REDIRECTIONS: u32 = 16;

/// Cluster client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Bootstrap addresses, tried in order until one answers discovery
    pub root_nodes: Vec<String>,

    /// Route read-only operations to replicas of the owning master
    #[serde(default)]
    pub use_replicas: bool,

    /// Redirection hops allowed per logical operation
    #[serde(default = "default_max_command_redirections")]
    pub max_command_redirections: u32,

    /// Reject discovery results that leave slots uncovered
    #[serde(default = "default_require_full_coverage")]
    pub require_full_coverage: bool,
}

fn default_max_command_redirections() -> u32 {
    DEFAULT_MAX_COMMAND_REDIRECTIONS
}

fn default_require_full_coverage() -> bool {
    true
}

impl ClusterConfig {
    /// Create a configuration bootstrapping from the given root nodes
    pub fn new<I, S>(root_nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root_nodes: root_nodes.into_iter().map(Into::into).collect(),
            use_replicas: false,
            max_command_redirections: DEFAULT_MAX_COMMAND_REDIRECTIONS,
            require_full_coverage: true,
        }
    }

    /// Allow read-only operations on replicas
    pub fn with_replicas(mut self, use_replicas: bool) -> Self {
        self.use_replicas = use_replicas;
        self
    }

    /// Set the redirection ceiling
    pub fn with_max_command_redirections(mut self, max: u32) -> Self {
        self.max_command_redirections = max;
        self
    }

    /// Accept topologies with uncovered slots
    pub fn with_require_full_coverage(mut self, require: bool) -> Self {
        self.require_full_coverage = require;
        self
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ClusterConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the root node list is usable
    pub fn validate(&self) -> Result<()> {
        if self.root_nodes.is_empty() {
            return Err(RouterError::Config(
                "at least one root node is required".to_string(),
            ));
        }

        for root in &self.root_nodes {
            root.parse::<NodeAddress>()
                .map_err(|_| RouterError::Config(format!("invalid root node address: {}", root)))?;
        }

        Ok(())
    }
}
