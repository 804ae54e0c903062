//! Parsed request bodies.
//!
//! Body parser middleware stores one of these under the `body` attribute.
//! Request parameter lookup goes through the [`Body`] trait and does not care
//! which parser produced it.

use std::fmt;

use serde_json::{Map, Value};

/// Uniform accessor over an already-parsed payload.
pub trait Body: Send + Sync + fmt::Debug {
    /// Value under `key`, `None` when absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Value at `index` for indexed payloads.
    fn get_index(&self, index: usize) -> Option<Value>;

    /// The whole payload as a JSON value.
    fn as_native(&self) -> Value;

    /// Number of top-level entries.
    fn len(&self) -> usize;

    /// Top-level keys in payload order.
    fn keys(&self) -> Vec<String>;

    fn as_str(&self, key: &str) -> Option<String>;
    fn as_i64(&self, key: &str) -> Option<i64>;
    fn as_f64(&self, key: &str) -> Option<f64>;
    fn as_bool(&self, key: &str) -> Option<bool>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn contains_value(&self, value: &Value) -> bool;
}

/// A JSON document. Coercions are strict: a number is never read as a string.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody {
    value: Value,
}

impl JsonBody {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes).map(Self::new)
    }

    fn field(&self, key: &str) -> Option<&Value> {
        match &self.value {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl Body for JsonBody {
    fn get(&self, key: &str) -> Option<Value> {
        self.field(key).filter(|v| !v.is_null()).cloned()
    }

    fn get_index(&self, index: usize) -> Option<Value> {
        match &self.value {
            Value::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    fn as_native(&self) -> Value {
        self.value.clone()
    }

    fn len(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    fn keys(&self) -> Vec<String> {
        match &self.value {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    fn as_str(&self, key: &str) -> Option<String> {
        self.field(key).and_then(Value::as_str).map(str::to_string)
    }

    fn as_i64(&self, key: &str) -> Option<i64> {
        self.field(key).and_then(Value::as_i64)
    }

    fn as_f64(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(Value::as_f64)
    }

    fn as_bool(&self, key: &str) -> Option<bool> {
        self.field(key).and_then(Value::as_bool)
    }

    fn contains_value(&self, value: &Value) -> bool {
        match &self.value {
            Value::Object(map) => map.values().any(|v| v == value),
            Value::Array(items) => items.contains(value),
            _ => false,
        }
    }
}

/// An `application/x-www-form-urlencoded` form.
///
/// Every value is a string; repeated keys become an array. Coercions parse
/// the string. There is no indexed access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlEncodedBody {
    fields: Vec<(String, Vec<String>)>,
}

impl UrlEncodedBody {
    pub fn parse(bytes: &[u8]) -> Self {
        let mut fields: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in url::form_urlencoded::parse(bytes) {
            match fields.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value.into_owned()),
                None => fields.push((key.into_owned(), vec![value.into_owned()])),
            }
        }
        Self { fields }
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    fn to_value(values: &[String]) -> Value {
        match values {
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl Body for UrlEncodedBody {
    fn get(&self, key: &str) -> Option<Value> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| Self::to_value(values))
    }

    fn get_index(&self, _index: usize) -> Option<Value> {
        None
    }

    fn as_native(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, values)| (k.clone(), Self::to_value(values)))
            .collect();
        Value::Object(map)
    }

    fn len(&self) -> usize {
        self.fields.len()
    }

    fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|(k, _)| k.clone()).collect()
    }

    fn as_str(&self, key: &str) -> Option<String> {
        self.first(key).map(str::to_string)
    }

    fn as_i64(&self, key: &str) -> Option<i64> {
        self.first(key).and_then(|v| v.trim().parse().ok())
    }

    fn as_f64(&self, key: &str) -> Option<f64> {
        self.first(key).and_then(|v| v.trim().parse().ok())
    }

    fn as_bool(&self, key: &str) -> Option<bool> {
        match self.first(key)?.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    fn contains_value(&self, value: &Value) -> bool {
        let Some(needle) = value.as_str() else {
            return false;
        };
        self.fields
            .iter()
            .any(|(_, values)| values.iter().any(|v| v == needle))
    }
}
