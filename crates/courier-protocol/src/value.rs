//! AMQP value model.
//!
//! Only the part of the AMQP type system the broker has to look inside is
//! modeled here. Message bodies are otherwise carried around opaquely.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An AMQP symbolic constant, e.g. `amqp:declare:list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    /// Create a new symbol.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Descriptor of a described value.
///
/// AMQP allows both the symbolic and the numeric form for every
/// well-known descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descriptor {
    /// Symbolic form, e.g. `amqp:discharge:list`.
    Symbol(Symbol),
    /// Numeric form, e.g. `0x32`.
    Code(u64),
}

impl Descriptor {
    /// Check whether this descriptor is either form of a well-known type.
    #[must_use]
    pub fn matches(&self, symbol: &str, code: u64) -> bool {
        match self {
            Descriptor::Symbol(s) => s.as_str() == symbol,
            Descriptor::Code(c) => *c == code,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Symbol(s) => write!(f, "{s}"),
            Descriptor::Code(c) => write!(f, "{c:#x}"),
        }
    }
}

/// A value tagged with a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Described {
    /// Type descriptor.
    pub descriptor: Descriptor,
    /// Described value.
    pub value: Value,
}

/// An AMQP value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Ulong(u64),
    Long(i64),
    String(String),
    Symbol(Symbol),
    Binary(#[serde(with = "serde_bytes")] Vec<u8>),
    List(Vec<Value>),
    Described(Box<Described>),
}

impl Value {
    /// Build a described value.
    #[must_use]
    pub fn described(descriptor: Descriptor, value: Value) -> Self {
        Value::Described(Box::new(Described { descriptor, value }))
    }

    /// Get the described value, if this is one.
    #[must_use]
    pub fn as_described(&self) -> Option<&Described> {
        match self {
            Value::Described(d) => Some(d),
            _ => None,
        }
    }

    /// Get the list elements, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the bytes, if this is a binary value.
    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get the string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is the null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_matches_both_forms() {
        let symbolic = Descriptor::Symbol("amqp:declare:list".into());
        let numeric = Descriptor::Code(0x31);

        assert!(symbolic.matches("amqp:declare:list", 0x31));
        assert!(numeric.matches("amqp:declare:list", 0x31));
        assert!(!numeric.matches("amqp:discharge:list", 0x32));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(Descriptor::Code(0x32).to_string(), "0x32");
        assert_eq!(
            Descriptor::Symbol("amqp:discharge:list".into()).to_string(),
            "amqp:discharge:list"
        );
    }

    #[test]
    fn test_value_accessors() {
        let value = Value::described(
            Descriptor::Code(0x32),
            Value::List(vec![Value::Binary(b"tx".to_vec()), Value::Bool(true)]),
        );

        let described = value.as_described().unwrap();
        let fields = described.value.as_list().unwrap();
        assert_eq!(fields[0].as_binary(), Some(&b"tx"[..]));
        assert!(value.as_list().is_none());
        assert!(Value::default().is_null());
    }
}
