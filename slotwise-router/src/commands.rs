//! Built-in command descriptors
//!
//! A handful of descriptors covering each routing shape the router
//! understands: no key, a fixed index into the encoded arguments, and a
//! key computed from the original call arguments.

use crate::command::{Command, to_arg};
use crate::error::{Result, RouterError};
use serde_json::Value;

fn prefixed(tokens: &[&str], args: &[Value]) -> Result<Vec<String>> {
    let mut out: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    for arg in args {
        out.push(to_arg(arg)?);
    }
    Ok(out)
}

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<()> {
    if args.len() != count {
        return Err(RouterError::Encode(format!(
            "{} expects {} arguments, got {}",
            name,
            count,
            args.len()
        )));
    }
    Ok(())
}

/// `PING` (no key affinity)
pub fn ping() -> Command {
    Command::new("PING", |args| prefixed(&["PING"], args))
}

/// `GET key`
pub fn get() -> Command {
    Command::new("GET", |args| {
        expect_args("GET", args, 1)?;
        prefixed(&["GET"], args)
    })
    .with_first_key_index(1)
    .read_only()
}

/// `SET key value`
pub fn set() -> Command {
    Command::new("SET", |args| {
        expect_args("SET", args, 2)?;
        prefixed(&["SET"], args)
    })
    .with_first_key_index(1)
}

/// `CLUSTER SLOTS`
pub fn cluster_slots() -> Command {
    Command::new("CLUSTER SLOTS", |_| {
        Ok(vec!["CLUSTER".to_string(), "SLOTS".to_string()])
    })
    .read_only()
}

/// `XGROUP CREATECONSUMER key group consumer`
///
/// The key is the third wire token, one past where it sits in the call
/// arguments.
pub fn xgroup_createconsumer() -> Command {
    Command::new("XGROUP CREATECONSUMER", |args| {
        expect_args("XGROUP CREATECONSUMER", args, 3)?;
        prefixed(&["XGROUP", "CREATECONSUMER"], args)
    })
    .with_first_key_index(2)
}

/// `JSON.MSET` over `[{ "key", "path", "value" }, ...]`
pub fn json_mset() -> Command {
    Command::new("JSON.MSET", |args| {
        let entries = args
            .first()
            .and_then(Value::as_array)
            .ok_or_else(|| RouterError::Encode("JSON.MSET expects an array of entries".into()))?;

        let mut out = vec!["JSON.MSET".to_string()];
        for entry in entries {
            let field = |name: &str| {
                entry
                    .get(name)
                    .ok_or_else(|| RouterError::Encode(format!("JSON.MSET entry missing '{}'", name)))
            };
            out.push(to_arg(field("key")?)?);
            out.push(to_arg(field("path")?)?);
            out.push(
                serde_json::to_string(field("value")?)
                    .map_err(|e| RouterError::Encode(e.to_string()))?,
            );
        }
        Ok(out)
    })
    .with_first_key_index(1)
}

/// `CMS.MERGE destination numkeys source... [WEIGHTS weight...]`
///
/// Sources are plain names or `{ "name", "weight" }` objects; weights are
/// emitted only when every source carries one. The destination is read
/// from the original arguments since the encoded layout depends on them.
pub fn cms_merge() -> Command {
    Command::new("CMS.MERGE", |args| {
        expect_args("CMS.MERGE", args, 2)?;
        let sources = args[1]
            .as_array()
            .ok_or_else(|| RouterError::Encode("CMS.MERGE expects an array of sources".into()))?;

        let mut out = vec![
            "CMS.MERGE".to_string(),
            to_arg(&args[0])?,
            sources.len().to_string(),
        ];
        let mut weights = Vec::with_capacity(sources.len());
        for source in sources {
            match source {
                Value::Object(obj) => {
                    let name = obj
                        .get("name")
                        .ok_or_else(|| RouterError::Encode("CMS.MERGE source missing 'name'".into()))?;
                    out.push(to_arg(name)?);
                    if let Some(weight) = obj.get("weight") {
                        weights.push(to_arg(weight)?);
                    }
                }
                other => out.push(to_arg(other)?),
            }
        }
        if !weights.is_empty() {
            if weights.len() != sources.len() {
                return Err(RouterError::Encode(
                    "CMS.MERGE weights must be given for every source or none".into(),
                ));
            }
            out.push("WEIGHTS".to_string());
            out.extend(weights);
        }
        Ok(out)
    })
    .with_first_key_fn(|args| args.first().and_then(Value::as_str).map(str::to_string))
}

/// `FUNCTION LIST [LIBRARYNAME pattern]`
pub fn function_list() -> Command {
    Command::new("FUNCTION LIST", |args| {
        let mut out = vec!["FUNCTION".to_string(), "LIST".to_string()];
        if let Some(pattern) = args.first() {
            out.push("LIBRARYNAME".to_string());
            out.push(to_arg(pattern)?);
        }
        Ok(out)
    })
    .read_only()
}

/// Every built-in descriptor
pub fn builtin() -> Vec<Command> {
    vec![
        ping(),
        get(),
        set(),
        cluster_slots(),
        xgroup_createconsumer(),
        json_mset(),
        cms_merge(),
        function_list(),
    ]
}
