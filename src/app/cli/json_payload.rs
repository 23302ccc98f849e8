//! `ddmq json '<object>'`
//!
//! The object names the command in `cmd` and carries the command's options
//! as fields. It is turned into the equivalent argument list and parsed by
//! the same parser as a normal command line, so both paths accept and reject
//! exactly the same things.
//!
//! ```text
//! {"cmd": "publish", "root": "/srv/ddmq", "queue": "jobs",
//!  "message": "resize 42", "priority": 1, "requeue": true}
//! ```
//!
//! `false` and `null` fields count as not given.

use clap::Parser;
use serde_json::{Map, Value};

use crate::app::cli::args::Cli;
use crate::app::error::{AppError, AppResult};

/// Field name and the flag it becomes when given a value
const VALUE_FLAGS: &[(&str, &str)] = &[
    ("priority", "--priority"),
    ("timeout", "--timeout"),
    ("requeue_prio", "--requeue-prio"),
    ("requeue_limit", "--requeue-limit"),
    ("clean_interval", "--clean-interval"),
    ("format", "--format"),
    ("count", "--count"),
];

/// Field name and the switch it becomes when `true`
const SWITCHES: &[(&str, &str)] = &[
    ("f", "--force"),
    ("force", "--force"),
    ("skip_cleaning", "--skip-cleaning"),
    ("C", "--skip-cleaning"),
    ("s", "--silent"),
    ("silent", "--silent"),
    ("v", "--verbose"),
    ("d", "--debug"),
    ("names_only", "--names-only"),
];

const POSITIONALS: &[&str] = &["root", "queue", "message", "msg_files"];

/// Parse a JSON command object into a full command line
pub fn parse_payload(payload: &str) -> AppResult<Cli> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| AppError::Payload(format!("not valid JSON ({})", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::Payload("expected a JSON object".to_string()))?;
    Cli::try_parse_from(to_arguments(object)?).map_err(|e| AppError::Payload(e.to_string()))
}

/// The argument list equivalent to a JSON command object
pub fn to_arguments(object: &Map<String, Value>) -> AppResult<Vec<String>> {
    let cmd = object
        .get("cmd")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Payload("missing string field 'cmd'".to_string()))?;
    if cmd == "json" {
        return Err(AppError::Payload("'json' commands cannot be nested".to_string()));
    }
    let takes_format = matches!(cmd, "view" | "consume");

    let mut flags = Vec::new();
    for (key, value) in object {
        if key == "cmd" || POSITIONALS.contains(&key.as_str()) || is_unset(value) {
            continue;
        }
        if key == "format" && !takes_format {
            continue;
        }

        if let Some((_, flag)) = SWITCHES.iter().find(|(name, _)| *name == key.as_str()) {
            flags.push(flag.to_string());
        } else if key == "requeue" {
            // a number is the legacy form: requeue with that priority
            match value {
                Value::Bool(true) => flags.push("--requeue".to_string()),
                Value::Number(_) => {
                    flags.push("--requeue-prio".to_string());
                    flags.push(scalar(key, value)?);
                }
                _ => return Err(bad_field(key, "true or a priority")),
            }
        } else if key == "n" {
            // names only for view, a count for consume
            match value {
                Value::Bool(true) => flags.push("--names-only".to_string()),
                Value::Number(_) => {
                    flags.push("--count".to_string());
                    flags.push(scalar(key, value)?);
                }
                _ => return Err(bad_field(key, "true or a number")),
            }
        } else if let Some((_, flag)) = VALUE_FLAGS.iter().find(|(name, _)| *name == key.as_str()) {
            flags.push(flag.to_string());
            flags.push(scalar(key, value)?);
        } else {
            return Err(AppError::Payload(format!("unknown field '{}'", key)));
        }
    }

    let mut arguments = vec!["ddmq".to_string(), cmd.to_string()];
    arguments.extend(flags);
    arguments.push("--".to_string());
    for key in POSITIONALS {
        if let Some(value) = object.get(*key).filter(|v| !is_unset(v)) {
            arguments.push(list_or_scalar(key, value)?);
        }
    }
    Ok(arguments)
}

fn is_unset(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(false))
}

fn scalar(key: &str, value: &Value) -> AppResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(bad_field(key, "a string or a number")),
    }
}

fn list_or_scalar(key: &str, value: &Value) -> AppResult<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar(key, item))
            .collect::<AppResult<Vec<_>>>()
            .map(|items| items.join(",")),
        _ => scalar(key, value),
    }
}

fn bad_field(key: &str, expected: &str) -> AppError {
    AppError::Payload(format!("field '{}' must be {}", key, expected))
}
