//! Cluster client implementation
//!
//! Runs one logical operation at a time through a bounded loop:
//! locate the key, pick a node from the topology map, execute, and on a
//! redirect either hop once to the ASK target or refresh the topology
//! (MOVED) and go around again.

use crate::cluster::{ClusterNode, ClusterSlots};
use crate::command::{Command, CommandOptions, CommandRegistry, Script};
use crate::config::ClusterConfig;
use crate::connection::{ConnectionFactory, SharedConnection};
use crate::error::{Result, RouterError};
use crate::keys::extract_first_key;
use crate::redirect::{RedirectKind, classify};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a dispatch runs on the selected node
#[derive(Clone, Copy)]
enum Target<'a> {
    Command(&'a Command),
    Script(&'a Script),
}

impl Target<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Command(command) => command.name(),
            Self::Script(script) => script.name(),
        }
    }

    fn is_read_only(&self) -> bool {
        match self {
            Self::Command(command) => command.is_read_only(),
            Self::Script(script) => script.is_read_only(),
        }
    }

    fn encode(&self, args: &[Value]) -> Result<Vec<String>> {
        match self {
            Self::Command(command) => command.encode(args),
            Self::Script(script) => script.encode(args),
        }
    }

    fn first_key(&self, original_args: &[Value], encoded_args: &[String]) -> Option<String> {
        match self {
            Self::Command(command) => extract_first_key(*command, original_args, encoded_args),
            Self::Script(script) => extract_first_key(*script, original_args, encoded_args),
        }
    }

    fn decode(&self, reply: Value) -> Result<Value> {
        match self {
            Self::Command(command) => command.decode(reply),
            Self::Script(script) => script.decode(reply),
        }
    }

    async fn execute(
        &self,
        connection: &SharedConnection,
        args: &[String],
        options: &CommandOptions,
    ) -> Result<Value> {
        match self {
            Self::Command(_) => connection.send_command(args, options).await,
            Self::Script(script) => connection.execute_script(script, args, options).await,
        }
    }
}

/// Main cluster client
#[derive(Clone)]
pub struct ClusterClient {
    config: Arc<ClusterConfig>,
    slots: Arc<ClusterSlots>,
    registry: Arc<CommandRegistry>,
}

impl ClusterClient {
    /// Create a new cluster client
    ///
    /// Nothing is contacted until [`connect`](Self::connect) is called.
    /// The client starts out with the built-in command descriptors.
    pub fn new(config: ClusterConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            slots: Arc::new(ClusterSlots::new(Arc::clone(&config), factory)),
            config,
            registry: Arc::new(CommandRegistry::with_builtin_commands()),
        })
    }

    /// Replace the command and script registry
    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Topology map backing this client
    pub fn slots(&self) -> &ClusterSlots {
        &self.slots
    }

    /// Discover the cluster through the configured root nodes
    pub async fn connect(&self) -> Result<()> {
        self.slots.connect().await
    }

    /// Close every node connection; safe to call more than once
    pub async fn disconnect(&self) -> Result<()> {
        self.slots.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.slots.is_connected()
    }

    /// Number of nodes in the current topology
    pub fn node_count(&self) -> usize {
        self.slots
            .snapshot()
            .map(|snapshot| snapshot.node_count())
            .unwrap_or(0)
    }

    pub fn get_masters(&self) -> Vec<Arc<ClusterNode>> {
        self.slots.get_masters()
    }

    pub fn get_slot_master(&self, slot: u16) -> Result<Arc<ClusterNode>> {
        self.slots.get_slot_master(slot)
    }

    /// Run a command, following redirects
    pub async fn send_command(
        &self,
        command: &Command,
        args: &[Value],
        options: &CommandOptions,
    ) -> Result<Value> {
        self.dispatch(Target::Command(command), args, options).await
    }

    /// Run a script, following redirects
    pub async fn execute_script(
        &self,
        script: &Script,
        args: &[Value],
        options: &CommandOptions,
    ) -> Result<Value> {
        self.dispatch(Target::Script(script), args, options).await
    }

    /// Run a registered command by name with default options
    pub async fn run(&self, name: &str, args: &[Value]) -> Result<Value> {
        let command = self.registry.command(name)?;
        self.send_command(command, args, &CommandOptions::default())
            .await
    }

    /// Run a registered script by name with default options
    pub async fn run_script(&self, name: &str, args: &[Value]) -> Result<Value> {
        let script = self.registry.script(name)?;
        self.execute_script(script, args, &CommandOptions::default())
            .await
    }

    async fn dispatch(
        &self,
        target: Target<'_>,
        args: &[Value],
        options: &CommandOptions,
    ) -> Result<Value> {
        let encoded = target.encode(args)?;
        let key = target.first_key(args, &encoded);
        let max_redirections = self.config.max_command_redirections;
        let mut redirections: u32 = 0;

        loop {
            let observed_round = self.slots.discovery_round();
            let node = self.slots.get_client(key.as_deref(), target.is_read_only())?;

            debug!(
                "Dispatching {} (key: {:?}) to {}",
                target.name(),
                key,
                node.address()
            );

            let err = match target.execute(node.connection(), &encoded, options).await {
                Ok(reply) => return target.decode(reply),
                Err(e) => e,
            };

            let Some(redirect) = classify(&err) else {
                return Err(err);
            };

            if redirections >= max_redirections {
                warn!(
                    "{} gave up after {} redirections: {}",
                    target.name(),
                    redirections,
                    err
                );
                return Err(err);
            }

            match redirect.kind {
                RedirectKind::Ask => {
                    let ask_node = self
                        .resolve_ask_target(&redirect.address, observed_round, &node)
                        .await?;

                    debug!(
                        "ASK redirect for slot {}: retrying {} on {}",
                        redirect.slot,
                        target.name(),
                        ask_node.address()
                    );

                    ask_node.connection().asking().await?;
                    let reply = target
                        .execute(ask_node.connection(), &encoded, options)
                        .await?;
                    return target.decode(reply);
                }
                RedirectKind::Moved => {
                    debug!(
                        "MOVED redirect for slot {} to {}: refreshing topology",
                        redirect.slot, redirect.address
                    );

                    self.slots.discover_since(observed_round, &node).await?;
                    redirections += 1;
                }
            }
        }
    }

    /// Node named by an ASK redirect, refreshing the topology once if needed
    async fn resolve_ask_target(
        &self,
        address: &str,
        observed_round: u64,
        failing: &ClusterNode,
    ) -> Result<Arc<ClusterNode>> {
        if let Some(node) = self.slots.get_node_by_url(address) {
            return Ok(node);
        }

        debug!("ASK target {} unknown, refreshing topology", address);
        self.slots.discover_since(observed_round, failing).await?;

        self.slots
            .get_node_by_url(address)
            .ok_or_else(|| RouterError::UnknownNode(address.to_string()))
    }
}
