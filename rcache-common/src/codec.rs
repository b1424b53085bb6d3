//! # Value Codec
//!
//! Decides how a cache value is represented on the wire and reverses that
//! decision on read.
//!
//! ## Design Principles
//!
//! 1. **Integer Fast Path**: Values that serialize to an integral number, or
//!    to a string that reads as one, are stored as plain decimal text so the
//!    store can `INCR` them in place.
//! 2. **Opaque Blobs**: Everything else is stored as serde_json bytes.
//! 3. **Probe Order**: Decoding tries an integer parse first, then the blob.
//!    This must mirror the encoding decision exactly; there is no type tag on
//!    the wire beyond "parses as an integer or not".
//!
//! ## Representation Table
//!
//! ```text
//! value            wire bytes        representation
//! 42               42                Integer
//! 3.0              3                 Integer
//! 3.5              3.5               Blob
//! "7"              7                 Integer
//! "3.5"            "3.5"             Blob
//! {"a":1}          {"a":1}           Blob
//! set_str("raw")   raw               Text   (codec bypassed)
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CodecError, CodecResult};

// Floats at or beyond these bounds do not truncate into an i64 exactly.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Wire representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Native integer the store can increment.
    Integer,
    /// Serialized value.
    Blob,
    /// Caller-supplied text written verbatim.
    Text,
}

/// An encoded value ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Integer(i64),
    Blob(Vec<u8>),
    Text(Vec<u8>),
}

impl Encoded {
    /// Returns the representation chosen at encode time.
    pub fn representation(&self) -> Representation {
        match self {
            Encoded::Integer(_) => Representation::Integer,
            Encoded::Blob(_) => Representation::Blob,
            Encoded::Text(_) => Representation::Text,
        }
    }

    /// Returns the bytes to send to the store.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Encoded::Integer(value) => value.to_string().into_bytes(),
            Encoded::Blob(data) | Encoded::Text(data) => data.clone(),
        }
    }

    /// Consumes the value and returns the bytes to send to the store.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Encoded::Integer(value) => value.to_string().into_bytes(),
            Encoded::Blob(data) | Encoded::Text(data) => data,
        }
    }
}

/// Encodes a value, taking the integer fast path when it is lossless.
///
/// # Examples
/// ```rust
/// use rcache_common::{encode, Encoded, Representation};
///
/// assert_eq!(encode(&12).unwrap(), Encoded::Integer(12));
/// assert_eq!(encode(&4.0).unwrap(), Encoded::Integer(4));
/// assert_eq!(encode(&4.5).unwrap().representation(), Representation::Blob);
/// assert_eq!(encode("7").unwrap(), Encoded::Integer(7));
/// ```
pub fn encode<V: Serialize + ?Sized>(value: &V) -> CodecResult<Encoded> {
    let value = serde_json::to_value(value).map_err(CodecError::Serialize)?;
    let integral = match &value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(integral_float)),
        Value::String(text) => text.trim().parse::<f64>().ok().and_then(integral_float),
        _ => None,
    };
    if let Some(int) = integral {
        return Ok(Encoded::Integer(int));
    }
    serde_json::to_vec(&value)
        .map(Encoded::Blob)
        .map_err(CodecError::Serialize)
}

/// Returns the float as an i64 when it is finite, integral and in range.
fn integral_float(float: f64) -> Option<i64> {
    if float.trunc() == float && (I64_LOWER..I64_UPPER).contains(&float) {
        Some(float as i64)
    } else {
        None
    }
}

/// Wraps text that must be stored verbatim, bypassing the codec.
pub fn encode_text(text: impl AsRef<[u8]>) -> Encoded {
    Encoded::Text(text.as_ref().to_vec())
}

/// Decodes stored bytes: integer parse first, blob second.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> CodecResult<T> {
    match parse_integer(raw) {
        Some(int) => serde_json::from_value(Value::from(int)).map_err(CodecError::Deserialize),
        None => serde_json::from_slice(raw).map_err(CodecError::Deserialize),
    }
}

/// Parses the integer fast path, ignoring surrounding ASCII whitespace.
pub fn parse_integer(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

/// Undecoded bytes as returned by the store.
///
/// Returned by the bulk reads that skip decoding; call [`RawValue::decode`]
/// to apply the codec later.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawValue(Vec<u8>);

impl RawValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        RawValue(bytes.into())
    }

    /// Decodes with the value codec.
    pub fn decode<T: DeserializeOwned>(&self) -> CodecResult<T> {
        decode(&self.0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the bytes as text, replacing invalid UTF-8 sequences.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.len() <= 32 {
            write!(f, "RawValue({:?})", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "RawValue({}B)", self.0.len())
        }
    }
}
