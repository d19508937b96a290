//! RESP2 data types and value representation.

use bytes::Bytes;

/// Represents a RESP2 protocol value.
///
/// Null bulk strings and null arrays are first-class: a caller can always
/// distinguish "zero elements" (`BulkString("")`, `Array(vec![])`) from
/// "no value" (`Nil`, `NilArray`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null bulk string: `$-1\r\n`, the protocol's explicit absence
    Nil,

    /// Null array: `*-1\r\n`, distinct from both `Nil` and an empty array
    NilArray,

    /// Simple string: `+OK\r\n`
    SimpleString(Bytes),

    /// Error: `-ERR message\r\n`
    Error(Bytes),

    /// Integer: `:1000\r\n`
    Integer(i64),

    /// Bulk string: `$6\r\nfoobar\r\n`
    BulkString(Bytes),

    /// Array: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
    Array(Vec<Value>),
}

impl Value {
    /// Check if the value is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if the value is a null bulk string or a null array
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil | Value::NilArray)
    }

    /// Try to convert to a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(s) | Value::BulkString(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }

    /// Try to convert to bytes
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::SimpleString(b) | Value::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Try to convert to integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to convert to array
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert to String with lossy UTF-8 conversion
    pub fn to_string_lossy(&self) -> Option<String> {
        match self {
            Value::SimpleString(s) | Value::BulkString(s) | Value::Error(s) => {
                Some(String::from_utf8_lossy(s).into_owned())
            }
            _ => None,
        }
    }

    /// Try to consume and convert to Vec<Value>
    pub fn into_vec(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    // Convenience constructors

    /// Create a simple string value
    pub fn simple_string(s: impl Into<Bytes>) -> Self {
        Value::SimpleString(s.into())
    }

    /// Create a bulk string value
    pub fn bulk_string(s: impl Into<Bytes>) -> Self {
        Value::BulkString(s.into())
    }

    /// Create an error value
    pub fn error(e: impl Into<Bytes>) -> Self {
        Value::Error(e.into())
    }

    /// Create an integer value
    pub fn integer(i: i64) -> Self {
        Value::Integer(i)
    }

    /// Create an array value from an iterator
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Create a null value
    pub fn nil() -> Self {
        Value::Nil
    }
}

// Convenient From implementations
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::BulkString(Bytes::from(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::BulkString(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::BulkString(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::BulkString(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::BulkString(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Nil,
        }
    }
}
