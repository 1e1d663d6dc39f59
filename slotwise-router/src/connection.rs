//! Node connection capability
//!
//! The router never speaks the wire protocol itself. It drives nodes
//! through [`NodeConnection`] and opens them through a
//! [`ConnectionFactory`], so any transport (pooled TCP, TLS, in-memory
//! test doubles) can sit underneath.

use crate::address::NodeAddress;
use crate::command::{CommandOptions, Script};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One logical connection (or pool) to a single cluster node
///
/// Server error replies must surface as [`RouterError::Server`] carrying
/// the error text, so redirects can be recognised. Transport failures
/// should use [`RouterError::Connection`].
///
/// [`RouterError::Server`]: crate::error::RouterError::Server
/// [`RouterError::Connection`]: crate::error::RouterError::Connection
#[async_trait]
pub trait NodeConnection: Send + Sync {
    /// Send encoded command arguments and wait for the reply
    async fn send_command(&self, args: &[String], options: &CommandOptions) -> Result<Value>;

    /// Run a script with already encoded arguments
    async fn execute_script(
        &self,
        script: &Script,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<Value>;

    /// One-shot primer allowing the next command to hit an importing slot
    async fn asking(&self) -> Result<()> {
        self.send_command(&["ASKING".to_string()], &CommandOptions::default())
            .await
            .map(|_| ())
    }

    /// Raw `CLUSTER SLOTS` reply used for discovery
    async fn cluster_slots(&self) -> Result<Value> {
        self.send_command(
            &["CLUSTER".to_string(), "SLOTS".to_string()],
            &CommandOptions::default(),
        )
        .await
    }

    /// Close the connection; calling it again must be harmless
    async fn close(&self) -> Result<()>;
}

/// Shared handle to a node connection
pub type SharedConnection = Arc<dyn NodeConnection>;

/// Opens connections to cluster nodes
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, address: &NodeAddress) -> Result<SharedConnection>;
}
