//! # Key Codec
//!
//! Turns a logical `(name, version)` pair into the canonical byte string sent
//! to the store.
//!
//! ## Design Principles
//!
//! 1. **Deterministic Encoding**: The same prefix, version and name always
//!    produce the same bytes, so keys written by one process are found by
//!    another.
//! 2. **Version Isolation**: The version is part of the key, so bumping it
//!    hides every entry written under the previous version.
//! 3. **Idempotent Wrapping**: A `WireKey` passed back into the codec is
//!    returned unchanged. The `ToWireKey` trait makes this a type-level
//!    guarantee instead of a runtime check.
//!
//! ## Layout Example
//!
//! ```text
//! prefix "app", version 3, name "user:42":
//! +--------+---+---------+---+---------+
//! | prefix | : | version | : | name    |
//! +--------+---+---------+---+---------+
//! | app    | : | 3       | : | user:42 |
//! +--------+---+---------+---+---------+
//! ```

use std::borrow::Borrow;
use std::fmt;

/// Version used when the caller does not pass one.
pub const DEFAULT_VERSION: u32 = 1;

/// Encoded key as sent to the store.
///
/// Immutable once built. Compares equal to a `str` holding the same bytes,
/// which lets callers check previously made keys against plain strings.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireKey {
    bytes: Vec<u8>,
}

impl WireKey {
    /// Wraps bytes that are already in wire form.
    ///
    /// No prefix or version is applied; use this for keys that live outside
    /// the cache namespace.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        WireKey {
            bytes: bytes.into(),
        }
    }

    /// Returns the encoded key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the key and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for WireKey {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl Borrow<[u8]> for WireKey {
    fn borrow(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq<str> for WireKey {
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for WireKey {
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<String> for WireKey {
    fn eq(&self, other: &String) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<WireKey> for str {
    fn eq(&self, other: &WireKey) -> bool {
        other == self
    }
}

impl PartialEq<WireKey> for &str {
    fn eq(&self, other: &WireKey) -> bool {
        other == *self
    }
}

impl fmt::Debug for WireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireKey({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Display for WireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

/// Anything the cache accepts as a key.
///
/// Plain strings are namespaced by the codec; `WireKey` passes through
/// untouched regardless of prefix or version.
pub trait ToWireKey {
    fn to_wire_key(&self, codec: &KeyCodec, version: Option<u32>) -> WireKey;
}

impl ToWireKey for str {
    fn to_wire_key(&self, codec: &KeyCodec, version: Option<u32>) -> WireKey {
        codec.compose(self, version)
    }
}

impl ToWireKey for String {
    fn to_wire_key(&self, codec: &KeyCodec, version: Option<u32>) -> WireKey {
        codec.compose(self, version)
    }
}

impl ToWireKey for WireKey {
    fn to_wire_key(&self, _codec: &KeyCodec, _version: Option<u32>) -> WireKey {
        self.clone()
    }
}

impl<T: ToWireKey + ?Sized> ToWireKey for &T {
    fn to_wire_key(&self, codec: &KeyCodec, version: Option<u32>) -> WireKey {
        (**self).to_wire_key(codec, version)
    }
}

/// Builds wire keys from logical names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
    default_version: u32,
}

impl Default for KeyCodec {
    fn default() -> Self {
        KeyCodec {
            prefix: String::new(),
            default_version: DEFAULT_VERSION,
        }
    }
}

impl KeyCodec {
    /// Creates a codec with a key prefix and the version applied when callers
    /// pass `None`.
    pub fn new(prefix: impl Into<String>, default_version: u32) -> Self {
        KeyCodec {
            prefix: prefix.into(),
            default_version,
        }
    }

    /// Returns the wire key for `key` under `version`.
    ///
    /// # Examples
    /// ```rust
    /// use rcache_common::KeyCodec;
    ///
    /// let codec = KeyCodec::new("app", 1);
    /// let key = codec.make_key("user:42", Some(3));
    /// assert_eq!(key, "app:3:user:42");
    ///
    /// // Already-encoded keys are not encoded twice.
    /// assert_eq!(codec.make_key(&key, Some(9)), key);
    /// ```
    pub fn make_key<K: ToWireKey + ?Sized>(&self, key: &K, version: Option<u32>) -> WireKey {
        key.to_wire_key(self, version)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_version(&self) -> u32 {
        self.default_version
    }

    fn compose(&self, name: &str, version: Option<u32>) -> WireKey {
        let version = version.unwrap_or(self.default_version).to_string();
        let mut bytes = Vec::with_capacity(self.prefix.len() + version.len() + name.len() + 2);
        bytes.extend_from_slice(self.prefix.as_bytes());
        bytes.push(b':');
        bytes.extend_from_slice(version.as_bytes());
        bytes.push(b':');
        bytes.extend_from_slice(name.as_bytes());
        WireKey { bytes }
    }
}
