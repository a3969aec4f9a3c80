//! Tagged-union values for tool arguments.
//!
//! Tool arguments arrive from the model as loosely-typed JSON and from remote
//! clients with schemas the server has never seen. `ToolValue` keeps that
//! flexibility while giving the router and the built-in tools typed access.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ToolValue>),
    Map(BTreeMap<String, ToolValue>),
}

impl ToolValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ToolValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&ToolValue> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<serde_json::Value> for ToolValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<ToolValue> for serde_json::Value {
    fn from(value: ToolValue) -> Self {
        match value {
            ToolValue::Null => Self::Null,
            ToolValue::Bool(b) => Self::Bool(b),
            // Integral numbers go back out as integers so "limit": 5 stays 5.
            ToolValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Self::from(n as i64),
            ToolValue::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            ToolValue::String(s) => Self::String(s),
            ToolValue::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            ToolValue::Map(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ToolValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ToolValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for ToolValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ToolValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// The full argument map of one tool call.
///
/// Backed by a `BTreeMap` so the serialized form has a stable key order,
/// which the router relies on when hashing calls for loop detection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(BTreeMap<String, ToolValue>);

impl ToolArguments {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse the raw argument string emitted by a model.
    ///
    /// An empty string is an empty argument map; anything other than a JSON
    /// object is rejected.
    pub fn from_json_str(raw: &str) -> Result<Self, ToolError> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("malformed JSON arguments: {e}")))?;
        Self::try_from(value)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ToolValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ToolValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ToolValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ToolValue> {
        self.0.remove(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ToolValue::as_str)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ToolValue::as_f64)
    }

    /// Fetch a required string argument.
    pub fn require_str(&self, key: &str) -> Result<&str, ToolError> {
        self.str(key)
            .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
    }

    /// String items of an array argument; non-string items are skipped.
    pub fn str_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(ToolValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-sorted JSON rendering, identical for semantically identical maps.
    pub fn canonical_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(ToolValue::Map(self.0.clone()))
    }
}

impl TryFrom<serde_json::Value> for ToolArguments {
    type Error = ToolError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match ToolValue::from(value) {
            ToolValue::Map(map) => Ok(Self(map)),
            ToolValue::Null => Ok(Self::new()),
            other => Err(ToolError::InvalidArguments(format!(
                "arguments must be an object, got {other:?}"
            ))),
        }
    }
}
