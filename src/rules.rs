//! Broadcast suppression rules (the blacklist).
//!
//! A rule is a `{ key, value }` pair. A log message whose top-level field
//! `key` is exactly `value` is still written to the sink but is never
//! broadcast to the notification channel.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// A single suppression rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BroadcastRule {
    pub key: String,
    pub value: Value,
}

impl BroadcastRule {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// True if `payload` is an object whose own field `key` equals `value`.
    pub fn matches(&self, payload: &Value) -> bool {
        payload
            .as_object()
            .and_then(|fields| fields.get(&self.key))
            .is_some_and(|field| strict_equals(field, &self.value))
    }
}

/// Decides whether a payload may be broadcast.
///
/// An absent or empty rule set allows everything. Otherwise the first rule
/// that matches suppresses the broadcast.
pub fn allows(rules: Option<&[BroadcastRule]>, payload: &Value) -> bool {
    match rules {
        None => true,
        Some(rules) => !rules.iter().any(|rule| rule.matches(payload)),
    }
}

/// Value equality where numbers compare by value, so `50` and `50.0` match.
fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}

/// An owned set of rules, loadable from inline configuration and files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blacklist {
    rules: Vec<BroadcastRule>,
}

impl Blacklist {
    pub fn new(rules: Vec<BroadcastRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[BroadcastRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn allows(&self, payload: &Value) -> bool {
        allows(Some(self.rules.as_slice()), payload)
    }

    /// Loads rules from YAML files, each holding a list of `{key, value}`.
    pub fn load_from_files(paths: &[PathBuf]) -> Result<Vec<BroadcastRule>> {
        let mut rules = Vec::new();
        for path in paths {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read blacklist file: {}", path.display()))?;
            let file_rules: Vec<BroadcastRule> = serde_yml::from_str(&content)
                .with_context(|| {
                    format!("Failed to parse YAML from blacklist file: {}", path.display())
                })?;
            rules.extend(file_rules);
        }
        Ok(rules)
    }
}

impl From<Vec<BroadcastRule>> for Blacklist {
    fn from(rules: Vec<BroadcastRule>) -> Self {
        Self::new(rules)
    }
}
