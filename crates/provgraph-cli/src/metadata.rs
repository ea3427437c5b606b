// Annotation parsing for the --meta flag
//
// `key=value` pairs with dot-nested keys: `training.epochs=10` becomes
// `{ "training": { "epochs": "10" } }`. Values are always strings.

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

/// Parses `key=value` arguments into a JSON object, or `None` when there are none.
pub fn parse_annotations(args: &[String]) -> Result<Option<Value>> {
    if args.is_empty() {
        return Ok(None);
    }

    let mut root = Map::new();
    for arg in args {
        let (key, value) = split_pair(arg)?;
        insert_nested(&mut root, key, value)?;
    }
    Ok(Some(Value::Object(root)))
}

fn split_pair(arg: &str) -> Result<(&str, &str)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid annotation '{}': expected 'key=value'", arg))?;

    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in annotation '{}'", arg);
    }
    Ok((key, value.trim()))
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: &str) -> Result<()> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        bail!("Invalid annotation key '{}': empty segment", key);
    }

    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => bail!("Empty annotation key"),
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => bail!("Cannot nest '{}': '{}' already holds a value", key, segment),
        };
    }

    if matches!(current.get(*last), Some(Value::Object(_))) {
        bail!("Cannot set '{}': it already holds nested keys", key);
    }
    current.insert(last.to_string(), Value::String(value.to_string()));
    Ok(())
}
