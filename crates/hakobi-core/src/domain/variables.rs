//! Variables: an insertion-ordered name -> typed value mapping.
//!
//! The engine hands variables over as a JSON object, and we keep the order it
//! arrived in (a plain `HashMap` would scramble it, `BTreeMap` would re-sort
//! it). Internally this is just a `Vec` of entries with map-like accessors;
//! lookups are linear, which is fine at the sizes a single task carries.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A typed variable value.
///
/// Serialized untagged, so `{"count": 3, "label": "x"}` round-trips without
/// any wrapper objects. Structured payloads fall through to `Json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Json(serde_json::Value),
}

impl From<&str> for VariableValue {
    fn from(s: &str) -> Self {
        VariableValue::String(s.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(s: String) -> Self {
        VariableValue::String(s)
    }
}

impl From<i64> for VariableValue {
    fn from(n: i64) -> Self {
        VariableValue::Int(n)
    }
}

impl From<f64> for VariableValue {
    fn from(n: f64) -> Self {
        VariableValue::Double(n)
    }
}

impl From<bool> for VariableValue {
    fn from(b: bool) -> Self {
        VariableValue::Bool(b)
    }
}

impl From<serde_json::Value> for VariableValue {
    fn from(v: serde_json::Value) -> Self {
        VariableValue::Json(v)
    }
}

/// Ordered collection of named variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    entries: Vec<(String, VariableValue)>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable, keeping first-insertion order.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Builder-style `set`, convenient in handlers.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// The whole mapping as one JSON object (for typed payload decoding).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VariablesVisitor;

        impl<'de> Visitor<'de> for VariablesVisitor {
            type Value = Variables;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of variables")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vars = Variables::new();
                // MapAccess streams entries in document order, which is
                // exactly the order we want to preserve.
                while let Some((name, value)) = access.next_entry::<String, VariableValue>()? {
                    vars.entries.push((name, value));
                }
                Ok(vars)
            }
        }

        deserializer.deserialize_map(VariablesVisitor)
    }
}
