//! # Slotwise Router
//!
//! Client-side request routing for Redis-style sharded clusters.
//!
//! ## Features
//!
//! - **Slot routing**: CRC16 hash slots with `{hash tag}` support, matched bit for bit with the server
//! - **Redirects**: `MOVED` refreshes the topology, `ASK` hops once without touching it
//! - **Bounded retries**: a per-operation redirection ceiling surfaces the last server error
//! - **Single-flight discovery**: concurrent `MOVED`s share one topology refresh
//! - **Replica reads**: read-only commands can be spread round-robin over replicas
//! - **Pluggable transport**: nodes are driven through the [`NodeConnection`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use slotwise_router::{ClusterClient, ClusterConfig, ConnectionFactory};
//! use std::sync::Arc;
//!
//! async fn run(factory: Arc<dyn ConnectionFactory>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClusterConfig::new(["10.0.0.1:7000", "10.0.0.2:7000"]).with_replicas(true);
//!     let client = ClusterClient::new(config, factory)?;
//!     client.connect().await?;
//!
//!     client.run("SET", &[json!("user:1"), json!("John Doe")]).await?;
//!     let value = client.run("GET", &[json!("user:1")]).await?;
//!     println!("Value: {}", value);
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod client;
pub mod cluster;
pub mod command;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod redirect;

pub use address::NodeAddress;
pub use client::ClusterClient;
pub use cluster::{ClusterNode, ClusterSlots, NodeRole, hash_slot};
pub use command::{Command, CommandOptions, CommandRegistry, FirstKey, Script};
pub use config::ClusterConfig;
pub use connection::{ConnectionFactory, NodeConnection, SharedConnection};
pub use error::{Result, RouterError};
pub use keys::extract_first_key;
pub use redirect::{Redirect, RedirectKind, classify, parse_redirect};

#[cfg(test)]
mod tests;
