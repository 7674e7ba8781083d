//! Token list loading
//!
//! Accepted shapes:
//!
//! ```text
//! ["0xAA", "0xBB"]
//! [{"address": "0xAA"}, {"address": "0xBB"}]
//! {"tokens": [ ...either of the above... ]}
//! ```

use serde_json::Value;
use std::path::Path;

#[derive(Debug)]
pub enum TokenListError {
    Io(std::io::Error),
    Json(serde_json::Error),
    UnrecognizedShape(String),
    /// Array element that is neither a string nor an `{address}` object
    InvalidEntry { index: usize, reason: String },
}

impl From<std::io::Error> for TokenListError {
    fn from(err: std::io::Error) -> Self {
        TokenListError::Io(err)
    }
}

impl From<serde_json::Error> for TokenListError {
    fn from(err: serde_json::Error) -> Self {
        TokenListError::Json(err)
    }
}

impl std::fmt::Display for TokenListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenListError::Io(e) => write!(f, "Cannot read token list: {}", e),
            TokenListError::Json(e) => write!(f, "Token list is not valid JSON: {}", e),
            TokenListError::UnrecognizedShape(shape) => write!(
                f,
                "Unrecognized token list shape ({}); expected an array or {{\"tokens\": [...]}}",
                shape
            ),
            TokenListError::InvalidEntry { index, reason } => {
                write!(f, "Invalid token list entry #{}: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for TokenListError {}

pub fn load_token_file(path: impl AsRef<Path>) -> Result<Vec<String>, TokenListError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;
    let tokens = parse_token_list(&value)?;

    log::info!("📋 Loaded {} tokens from {}", tokens.len(), path.display());
    Ok(tokens)
}

/// Normalize any accepted shape to trimmed, non-blank, first-occurrence-unique addresses
pub fn parse_token_list(value: &Value) -> Result<Vec<String>, TokenListError> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(map) => match map.get("tokens") {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(TokenListError::UnrecognizedShape(format!(
                    "\"tokens\" is {}",
                    json_type(other)
                )))
            }
            None => {
                return Err(TokenListError::UnrecognizedShape(
                    "object without \"tokens\"".to_string(),
                ))
            }
        },
        other => return Err(TokenListError::UnrecognizedShape(json_type(other).to_string())),
    };

    let mut tokens: Vec<String> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let address = match entry {
            Value::String(s) => s.as_str(),
            Value::Object(map) => match map.get("address") {
                Some(Value::String(s)) => s.as_str(),
                Some(Value::Null) | None => "",
                Some(other) => {
                    return Err(TokenListError::InvalidEntry {
                        index,
                        reason: format!("address is {}", json_type(other)),
                    })
                }
            },
            other => {
                return Err(TokenListError::InvalidEntry {
                    index,
                    reason: format!("expected string or {{\"address\"}}, got {}", json_type(other)),
                })
            }
        };

        let address = address.trim();
        if address.is_empty() {
            continue;
        }
        if tokens.iter().any(|t| t == address) {
            log::debug!("Skipping duplicate token {}", address);
            continue;
        }
        tokens.push(address.to_string());
    }

    Ok(tokens)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
