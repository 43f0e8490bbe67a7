//! Scenario script format.
//!
//! Each line is a JSON object tagged by `"op"`. Blank lines and `#` comments
//! are skipped.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use permgate_core::{Request, RequestKind};

use crate::arbiter::GrantOptions;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptOp {
    /// A runtime callback fires.
    Request { request: Request },
    Grant {
        #[serde(rename = "requestID")]
        request_id: String,
        #[serde(default)]
        options: GrantOptions,
    },
    Deny {
        #[serde(rename = "requestID")]
        request_id: String,
    },
    GrantGroup {
        #[serde(rename = "requestID")]
        request_id: String,
        #[serde(default)]
        granted: Value,
    },
    DenyGroup {
        #[serde(rename = "requestID")]
        request_id: String,
    },
    DismissGroup {
        #[serde(rename = "requestID")]
        request_id: String,
    },
    /// Bare pop of a queue front.
    Advance { kind: RequestKind },
    Sleep { ms: u64 },
    /// Change the host window focus.
    Focus { focused: bool },
    Snapshot,
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Script line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a whole NDJSON scenario.
///
/// Requests without a `requestID` get a generated one.
pub fn parse_script(input: &str) -> Result<Vec<ScriptOp>, ReplayError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(i, line)| {
            parse_line(line).map_err(|source| ReplayError::Parse { line: i + 1, source })
        })
        .collect()
}

/// Read and parse a scenario from `path`, or from stdin when `None`.
pub fn read_script(path: Option<&Path>) -> Result<Vec<ScriptOp>, ReplayError> {
    let input = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    parse_script(&input)
}

fn parse_line(line: &str) -> Result<ScriptOp, serde_json::Error> {
    let mut raw: Value = serde_json::from_str(line)?;
    if let Some(request) = raw.get_mut("request").and_then(Value::as_object_mut) {
        request
            .entry("requestID")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    }
    serde_json::from_value(raw)
}
