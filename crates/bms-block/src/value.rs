//! The JSON-shaped value tree every diff and patch input is normalized into.
//!
//! Native Rust values enter the engine through a serde round-trip
//! ([`Value::from_serialize`]) so that differently typed structs with the same
//! serialized shape compare structurally. The tree itself is a plain sum type:
//! objects, arrays, scalars, plus the [`Value::Ignore`] sentinel that only has
//! meaning inside a patch value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::BlockResult;

/// Field name of the marker object that encodes [`Value::Ignore`] on the wire.
pub const IGNORE_TAG: &str = "$block";

/// Tag value of the marker object that encodes [`Value::Ignore`] on the wire.
pub const IGNORE_VALUE: &str = "ignore";

/// String-keyed object members. Key order is irrelevant for comparison.
pub type Map = BTreeMap<String, Value>;

/// A node of a normalized configuration tree.
///
/// Serializes as plain JSON; `Ignore` is written as `{"$block": "ignore"}` and
/// that exact single-key object is read back as `Ignore`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Object(Map),
    Array(Vec<Value>),
    Scalar(Scalar),
    /// "Leave the corresponding position in the destination unchanged."
    Ignore,
}

/// A leaf value.
#[derive(Clone, Debug)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// The JSON type of a [`Value`], used for type-change detection and errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
    Ignore,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Bool => "bool",
            ValueKind::Null => "null",
            ValueKind::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// The JSON `null` value.
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    /// An empty object.
    pub fn empty_object() -> Self {
        Value::Object(Map::new())
    }

    /// Normalize any serializable value into a [`Value`] tree.
    ///
    /// Fails only if `value` cannot be represented as JSON (for example a map
    /// with non-string keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> BlockResult<Self> {
        Ok(Value::from(serde_json::to_value(value)?))
    }

    /// Convert the tree back into a native type.
    pub fn into_deserialize<T: DeserializeOwned>(self) -> BlockResult<T> {
        Ok(serde_json::from_value(serde_json::Value::from(self))?)
    }

    /// The JSON type of this value, or [`ValueKind::Ignore`].
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Object(_) => ValueKind::Object,
            Value::Array(_) => ValueKind::Array,
            Value::Scalar(Scalar::String(_)) => ValueKind::String,
            Value::Scalar(Scalar::Number(_)) => ValueKind::Number,
            Value::Scalar(Scalar::Bool(_)) => ValueKind::Bool,
            Value::Scalar(Scalar::Null) => ValueKind::Null,
            Value::Ignore => ValueKind::Ignore,
        }
    }

    /// The zero value of this value's type: `{}`, `[]`, `""`, `0`, `false`
    /// or `null`.
    pub fn zero(&self) -> Self {
        match self {
            Value::Object(_) => Value::empty_object(),
            Value::Array(_) => Value::Array(Vec::new()),
            Value::Scalar(Scalar::String(_)) => Value::from(""),
            Value::Scalar(Scalar::Number(_)) => Value::from(0i64),
            Value::Scalar(Scalar::Bool(_)) => Value::from(false),
            Value::Scalar(Scalar::Null) => Value::null(),
            Value::Ignore => Value::Ignore,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Value::Ignore)
    }

    /// The members, if this is an object.
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Look up an object member. Returns `None` for non-objects.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(field))
    }
}

impl Scalar {
    pub fn is_string(&self) -> bool {
        matches!(self, Scalar::String(_))
    }

    /// Identity used to index keyed array elements. Numbers that compare
    /// equal (`1` and `1.0`) share an identity.
    pub(crate) fn identity(&self) -> String {
        match self {
            Scalar::Null => "z".to_string(),
            Scalar::Bool(b) => format!("b:{b}"),
            Scalar::Number(n) => format!("n:{}", canonical_number(n)),
            Scalar::String(s) => format!("s:{s}"),
        }
    }
}

pub(crate) fn canonical_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        // Integral floats inside the exactly representable range print like integers.
        Some(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            (f as i64).to_string()
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Number(a), Scalar::Number(b)) => numbers_equal(a, b),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            _ => false,
        }
    }
}

/// Formats the scalar as a JSON literal (strings are quoted and escaped).
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::Value::from(self.clone());
        write!(f, "{json}")
    }
}

fn is_ignore_marker(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    map.len() == 1 && map.get(IGNORE_TAG).and_then(|v| v.as_str()) == Some(IGNORE_VALUE)
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => Value::Scalar(Scalar::Number(n)),
            serde_json::Value::String(s) => Value::Scalar(Scalar::String(s)),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                if is_ignore_marker(&map) {
                    return Value::Ignore;
                }
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Scalar(scalar) => serde_json::Value::from(scalar),
            Value::Ignore => {
                let mut marker = serde_json::Map::new();
                marker.insert(
                    IGNORE_TAG.to_string(),
                    serde_json::Value::String(IGNORE_VALUE.to_string()),
                );
                serde_json::Value::Object(marker)
            }
        }
    }
}

impl From<Scalar> for serde_json::Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(b),
            Scalar::Number(n) => serde_json::Value::Number(n),
            Scalar::String(s) => serde_json::Value::String(s),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<u64> for Scalar {
    fn from(n: u64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Scalar(n.into())
    }
}

/// Non-finite floats have no JSON form and become `null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        match Number::from_f64(n) {
            Some(n) => Value::Scalar(Scalar::Number(n)),
            None => Value::null(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(b.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}
