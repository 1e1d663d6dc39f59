//! Command and script descriptors
//!
//! A descriptor describes one operation family: its name, where its
//! routing key lives, whether it only reads, and how its call-site
//! arguments map to wire arguments and back. Descriptors are built once
//! and shared; the router never mutates them.

use crate::error::{Result, RouterError};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps original call-site arguments to wire arguments
pub type EncodeFn = Arc<dyn Fn(&[Value]) -> Result<Vec<String>> + Send + Sync>;

/// Maps a raw reply to the caller-facing value
pub type DecodeFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Computes the routing key from original call-site arguments
pub type KeyFn = Arc<dyn Fn(&[Value]) -> Option<String> + Send + Sync>;

/// Where to find an operation's routing key
#[derive(Clone)]
pub enum FirstKey {
    /// Index into the *encoded* wire arguments
    Index(usize),
    /// Function over the *original* call-site arguments
    Computed(KeyFn),
}

impl fmt::Debug for FirstKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => f.debug_tuple("Index").field(index).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Per-call options passed through to the node connection untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Run on a dedicated connection instead of the shared one
    pub isolated: bool,
}

impl CommandOptions {
    pub fn isolated() -> Self {
        Self { isolated: true }
    }
}

/// Descriptor for one command family
#[derive(Clone)]
pub struct Command {
    name: String,
    first_key: Option<FirstKey>,
    read_only: bool,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Command {
    /// Create a write command with no key affinity and a pass-through decoder
    pub fn new<F>(name: impl Into<String>, encode: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            first_key: None,
            read_only: false,
            encode: Arc::new(encode),
            decode: Arc::new(pass_through),
        }
    }

    /// Route by the encoded argument at `index`
    pub fn with_first_key_index(mut self, index: usize) -> Self {
        self.first_key = Some(FirstKey::Index(index));
        self
    }

    /// Route by a key computed from the original arguments
    pub fn with_first_key_fn<F>(mut self, locate: F) -> Self
    where
        F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
    {
        self.first_key = Some(FirstKey::Computed(Arc::new(locate)));
        self
    }

    /// Mark the command as read-only (eligible for replica routing)
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set the reply decoder
    pub fn with_decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.decode = Arc::new(decode);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_key(&self) -> Option<&FirstKey> {
        self.first_key.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn encode(&self, args: &[Value]) -> Result<Vec<String>> {
        (self.encode)(args)
    }

    pub fn decode(&self, reply: Value) -> Result<Value> {
        (self.decode)(reply)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("first_key", &self.first_key)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// Descriptor for one server-side script
#[derive(Clone)]
pub struct Script {
    name: String,
    source: Arc<str>,
    sha1: String,
    first_key: Option<FirstKey>,
    read_only: bool,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl Script {
    /// Create a script descriptor; the SHA1 digest is computed from `source`
    pub fn new<F>(name: impl Into<String>, source: impl Into<String>, encode: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<String>> + Send + Sync + 'static,
    {
        let source: String = source.into();
        let sha1 = compute_sha1(&source);

        Self {
            name: name.into(),
            source: source.into(),
            sha1,
            first_key: None,
            read_only: false,
            encode: Arc::new(encode),
            decode: Arc::new(pass_through),
        }
    }

    pub fn with_first_key_index(mut self, index: usize) -> Self {
        self.first_key = Some(FirstKey::Index(index));
        self
    }

    pub fn with_first_key_fn<F>(mut self, locate: F) -> Self
    where
        F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
    {
        self.first_key = Some(FirstKey::Computed(Arc::new(locate)));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_decode<F>(mut self, decode: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.decode = Arc::new(decode);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Hex SHA1 of the source, as used by EVALSHA
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub fn first_key(&self) -> Option<&FirstKey> {
        self.first_key.as_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn encode(&self, args: &[Value]) -> Result<Vec<String>> {
        (self.encode)(args)
    }

    pub fn decode(&self, reply: Value) -> Result<Value> {
        (self.decode)(reply)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("sha1", &self.sha1)
            .field("first_key", &self.first_key)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

fn pass_through(reply: Value) -> Result<Value> {
    Ok(reply)
}

fn compute_sha1(source: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// Convert one call-site argument to its wire form
pub fn to_arg(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        other => Err(RouterError::Encode(format!(
            "cannot encode {} as a command argument",
            other
        ))),
    }
}

/// Command and script descriptors available to a cluster client
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    scripts: HashMap<String, Script>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in descriptors
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        for command in crate::commands::builtin() {
            registry.register_command(command);
        }
        registry
    }

    /// Register a command; names are case-insensitive
    pub fn register_command(&mut self, command: Command) -> &mut Self {
        self.commands
            .insert(command.name().to_ascii_uppercase(), command);
        self
    }

    pub fn register_script(&mut self, script: Script) -> &mut Self {
        self.scripts.insert(script.name().to_string(), script);
        self
    }

    pub fn command(&self, name: &str) -> Result<&Command> {
        self.commands
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| RouterError::UnknownCommand(name.to_string()))
    }

    pub fn script(&self, name: &str) -> Result<&Script> {
        self.scripts
            .get(name)
            .ok_or_else(|| RouterError::UnknownCommand(name.to_string()))
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }
}
