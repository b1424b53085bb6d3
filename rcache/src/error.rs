//! Errors surfaced by the cache facade.

use rcache_client::{ClientError, ConfigError};
use rcache_common::{CodecError, WireKey};
use thiserror::Error;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache failures.
///
/// A missing key is not an error for reads; only increments require the key
/// to exist.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Settings could not be turned into connection parameters.
    #[error("invalid cache settings: {0}")]
    Config(#[from] ConfigError),

    /// Transport, protocol or server failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Increment on a key or hash field that does not exist.
    #[error("key {key} not found")]
    KeyNotFound { key: WireKey },

    /// Increment fallback found a value that is not a number.
    #[error("value stored at {key} is not a number")]
    NotNumeric { key: WireKey },
}
