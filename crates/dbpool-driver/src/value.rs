//! Bind parameter values.

use std::fmt;

use bytes::Bytes;

/// Binary payloads longer than this are summarized rather than rendered
/// in instrumentation output.
pub const BINARY_SUMMARY_THRESHOLD: usize = 32;

/// A value bound to a statement parameter.
///
/// The pool kernel does not interpret values; it only carries them to the
/// driver and renders them (safely) in instrumentation events.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Bytes(Bytes),
}

impl Value {
    /// Whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    /// Render the value for logs and instrumentation events.
    ///
    /// Binary values longer than [`BINARY_SUMMARY_THRESHOLD`] are summarized
    /// as `<N bytes of binary data>` so large blobs never leak into free-text
    /// output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) if b.len() > BINARY_SUMMARY_THRESHOLD => {
                write!(f, "<{} bytes of binary data>", b.len())
            }
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Text("abc".into()).to_string(), "'abc'");
    }

    #[test]
    fn test_display_small_binary_is_hex() {
        let v = Value::Bytes(Bytes::from_static(&[0xde, 0xad]));
        assert_eq!(v.to_string(), "0xdead");
    }

    #[test]
    fn test_display_large_binary_is_summarized() {
        let v = Value::Bytes(Bytes::from(vec![0u8; 1024]));
        assert_eq!(v.to_string(), "<1024 bytes of binary data>");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Int(7));
    }
}
