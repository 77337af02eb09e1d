//! Flat key/value configuration lookups.
//!
//! The reconciler reads its policy toggles and claim mappings through the
//! [`ConfigSource`] trait. [`Properties`] is the TOML-backed implementation:
//! nested tables are flattened into dotted keys, so the following two
//! documents describe the same key `auth.group.mapping.Domain.Admins`:
//!
//! ```toml
//! [auth.group.mapping]
//! "Domain.Admins" = ["portal-admins"]
//! ```
//!
//! ```toml
//! [auth]
//! "group.mapping.Domain.Admins" = "portal-admins"
//! ```

use std::collections::BTreeMap;

use toml::Value;
use tracing::warn;

/// Source of boolean, string, and string-array settings.
pub trait ConfigSource: Send + Sync {
    /// Boolean value for `key`, or `default` when missing or not a boolean.
    fn get_boolean(&self, key: &str, default: bool) -> bool;

    /// String value for `key`.
    fn get_string(&self, key: &str) -> Option<String>;

    /// String list for `key`.
    fn get_string_array(&self, key: &str) -> Option<Vec<String>>;
}

/// In-memory property set keyed by fully dotted names.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: BTreeMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a TOML table into dotted keys, each prefixed with `prefix`.
    pub fn from_table(prefix: &str, table: &toml::Table) -> Self {
        let mut props = Self::new();
        flatten_into(&mut props.values, prefix, table);
        props
    }

    /// Builder-style setter, mostly for tests and programmatic setups.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(inner) => flatten_into(out, &full, inner),
            other => {
                out.insert(full, other.clone());
            }
        }
    }
}

/// Interpret a value as a boolean the way property files usually spell them.
pub fn parse_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Some(true),
            "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

impl ConfigSource for Properties {
    fn get_boolean(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            None => default,
            Some(value) => parse_boolean(value).unwrap_or_else(|| {
                warn!(key, %value, default, "property is not a boolean, using default");
                default
            }),
        }
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            // A list yields its first element.
            Value::Array(items) => items.first().and_then(scalar_to_string),
            other => scalar_to_string(other),
        }
    }

    fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.values.get(key)? {
            Value::Array(items) => Some(items.iter().filter_map(scalar_to_string).collect()),
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            other => scalar_to_string(other).map(|s| vec![s]),
        }
    }
}
