use bytes::Bytes;
use std::collections::BTreeMap;

/// A bencode value.
///
/// Dictionaries are kept in a `BTreeMap`, so re-encoding a decoded value
/// always produces the canonical sorted-key form. This is what makes
/// `SHA-1(encode(info))` a stable identity for the info dictionary.
///
/// # Examples
///
/// ```
/// use remora::bencode::Value;
///
/// let v = Value::from(42i64);
/// assert_eq!(v.as_integer(), Some(42));
///
/// let s = Value::from("spam");
/// assert_eq!(s.as_str(), Some("spam"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A signed 64-bit integer.
    Integer(i64),
    /// A byte string, not necessarily valid UTF-8.
    Bytes(Bytes),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A dictionary with byte-string keys, sorted by key.
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// Returns the integer payload, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Returns the byte-string payload, if this is a byte string.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        if let Value::Bytes(b) = self {
            Some(b)
        } else {
            None
        }
    }

    /// Returns the payload as `&str` when it is a valid UTF-8 byte string.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the list payload, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(l) = self {
            Some(l)
        } else {
            None
        }
    }

    /// Returns the dictionary payload, if this is a dictionary.
    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        if let Value::Dict(d) = self {
            Some(d)
        } else {
            None
        }
    }

    /// Dictionary lookup; `None` when this is not a dictionary or the key
    /// is absent.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeMap<Bytes, Value>> for Value {
    fn from(d: BTreeMap<Bytes, Value>) -> Self {
        Value::Dict(d)
    }
}
