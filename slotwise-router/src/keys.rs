//! First-key extraction
//!
//! A fixed index is read from the encoded wire arguments, because
//! encoding may insert or reorder tokens. A computed locator runs over
//! the original call arguments, because for some commands the key
//! position depends on runtime options.

use crate::command::{Command, FirstKey, Script};
use serde_json::Value;

/// Anything that carries a first-key locator
pub trait KeyLocated {
    fn key_locator(&self) -> Option<&FirstKey>;
}

impl KeyLocated for Command {
    fn key_locator(&self) -> Option<&FirstKey> {
        self.first_key()
    }
}

impl KeyLocated for Script {
    fn key_locator(&self) -> Option<&FirstKey> {
        self.first_key()
    }
}

/// Derive the routing key for one call
///
/// Returns `None` for operations without key affinity, and when a fixed
/// index points past the encoded arguments.
pub fn extract_first_key<T: KeyLocated + ?Sized>(
    descriptor: &T,
    original_args: &[Value],
    encoded_args: &[String],
) -> Option<String> {
    match descriptor.key_locator()? {
        FirstKey::Index(index) => encoded_args.get(*index).cloned(),
        FirstKey::Computed(locate) => locate(original_args),
    }
}
