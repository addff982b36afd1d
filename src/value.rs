//! Property values for LazyQuery records
//!
//! A `Value` is the content of one property cell. Each cell also carries a
//! `PropertyType` tag; writes are type-checked against it. Values of the
//! same type are ordered the way sorting in the in-memory backend needs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Property data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bool,
    /// Buffered-lifecycle status of the owning record.
    Status,
}

/// Buffered-lifecycle state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    None,
    Added,
    Modified,
    Removed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::None => "None",
            ItemStatus::Added => "Added",
            ItemStatus::Modified => "Modified",
            ItemStatus::Removed => "Removed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property value enum to support multiple types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    // Float64 must precede Float32 for untagged decoding
    Float64(f64),
    Float32(f32),
    String(String),
    Status(ItemStatus),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<ItemStatus> {
        match self {
            Value::Status(s) => Some(*s),
            _ => None,
        }
    }

    /// True if this value may be stored in a cell of the given type.
    /// Null fits every type.
    pub fn fits(&self, property_type: PropertyType) -> bool {
        matches!(
            (self, property_type),
            (Value::Null, _)
                | (Value::Int32(_), PropertyType::Int32)
                | (Value::Int64(_), PropertyType::Int64)
                | (Value::Float32(_), PropertyType::Float32)
                | (Value::Float64(_), PropertyType::Float64)
                | (Value::String(_), PropertyType::String)
                | (Value::Bool(_), PropertyType::Bool)
                | (Value::Status(_), PropertyType::Status)
        )
    }

    /// Coerce a loosely-typed value (e.g. one deserialized from JSON, where
    /// every integer arrives as the narrowest fitting variant) into `property_type`.
    pub fn coerce(self, property_type: PropertyType) -> Option<Value> {
        if self.fits(property_type) {
            return Some(self);
        }
        match (self, property_type) {
            (Value::Int32(v), PropertyType::Int64) => Some(Value::Int64(v as i64)),
            (Value::Int64(v), PropertyType::Int32) => i32::try_from(v).ok().map(Value::Int32),
            (Value::Int32(v), PropertyType::Float64) => Some(Value::Float64(v as f64)),
            (Value::Int64(v), PropertyType::Float64) => Some(Value::Float64(v as f64)),
            (Value::Float64(v), PropertyType::Float32) => Some(Value::Float32(v as f32)),
            (Value::Float32(v), PropertyType::Float64) => Some(Value::Float64(v as f64)),
            _ => None,
        }
    }

    /// Total order over values for sorting. Nulls compare equal to each
    /// other; callers decide where nulls go relative to non-null values.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float32(a), Value::Float32(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Status(a), Value::Status(b)) => (*a as u8).cmp(&(*b as u8)),
            // Mixed types - compare by debug text for deterministic ordering
            (a, b) => format!("{:?}", a).cmp(&format!("{:?}", b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Status(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ItemStatus> for Value {
    fn from(s: ItemStatus) -> Self {
        Value::Status(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits() {
        assert!(Value::Int32(1).fits(PropertyType::Int32));
        assert!(!Value::Int32(1).fits(PropertyType::String));
        assert!(Value::Null.fits(PropertyType::Bool));
        assert!(Value::Status(ItemStatus::Added).fits(PropertyType::Status));
    }

    #[test]
    fn test_coerce_widens_integers() {
        assert_eq!(Value::Int32(5).coerce(PropertyType::Int64), Some(Value::Int64(5)));
        assert_eq!(Value::Int64(5).coerce(PropertyType::Int32), Some(Value::Int32(5)));
        assert_eq!(Value::Int64(i64::MAX).coerce(PropertyType::Int32), None);
        assert_eq!(Value::from("x").coerce(PropertyType::Int32), None);
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int32(1).compare(&Value::Int32(2)), Ordering::Less);
        assert_eq!(Value::from("b").compare(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::Null.compare(&Value::Int32(0)), Ordering::Less);
        assert_eq!(Value::Float64(f64::NAN).compare(&Value::Float64(1.0)), Ordering::Equal);
    }

    #[test]
    fn test_untagged_json() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, "abc", 1.5]"#).unwrap();
        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Bool(true));
        assert_eq!(values[2], Value::Int32(3));
        assert_eq!(values[3], Value::from("abc"));
        assert_eq!(values[4], Value::Float64(1.5));
    }
}
