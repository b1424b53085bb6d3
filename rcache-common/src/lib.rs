// rcache-common - Shared key, value and expiration codecs for rcache
//
// This crate decides how logical cache keys and values look on the wire.

pub mod codec;
pub mod error;
pub mod expiry;
pub mod key;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use expiry::*;
pub use key::*;
