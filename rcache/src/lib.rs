//! # rcache
//!
//! Typed caching on top of a Redis-compatible store: scalar and hash-field
//! values with optional expirations, versioned key namespaces and batched
//! writes.
//!
//! ```no_run
//! use rcache::{Cache, CacheSettings, PoolRegistry};
//!
//! # fn main() -> Result<(), rcache::CacheError> {
//! let registry = PoolRegistry::default();
//! let cache = Cache::open(&registry, &CacheSettings::new("127.0.0.1:6379"))?;
//!
//! cache.set("visits", &41, None, None)?;
//! let visits = cache.incr("visits", 1, None)?;
//! assert_eq!(visits.as_i64(), Some(42));
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod hash;
mod set;
mod settings;

pub use cache::Cache;
pub use error::{CacheError, CacheResult};
pub use settings::{CacheOptions, CacheSettings, DbSetting, DEFAULT_DB, DEFAULT_LOCATION};

// Re-export the building blocks callers need alongside the cache.
pub use rcache_client::{ClientError, ConnectionInfo, Endpoint, ParserKind, PoolLimits, PoolRegistry, StoreClient};
pub use rcache_common::{Encoded, Expiration, KeyCodec, RawValue, Representation, ToWireKey, WireKey};
