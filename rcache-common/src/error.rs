//! Errors raised while encoding or decoding cache values.

use thiserror::Error;

/// Result alias for value codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Value codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be turned into a blob.
    #[error("failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The stored bytes are neither an integer nor a valid blob for the
    /// requested type.
    #[error("failed to deserialize value: {0}")]
    Deserialize(#[source] serde_json::Error),
}
