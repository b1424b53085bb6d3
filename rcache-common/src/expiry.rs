//! # Expiration Policy
//!
//! Maps the caller-facing ttl (seconds, optional) onto what a write does.
//!
//! | ttl           | meaning                                  |
//! |---------------|------------------------------------------|
//! | `None`        | the operation's default ttl              |
//! | `Some(0)`     | persistent, no expiration                |
//! | `Some(n > 0)` | expires after `n` seconds                |
//! | `Some(n < 0)` | rejected: nothing is written             |

use std::time::Duration;

/// Default lifetime for scalar writes: 24 hours.
pub const DEFAULT_TIMEOUT_SECS: i64 = 24 * 60 * 60;

/// Ttl applied to hash writes when none is given: persistent.
pub const HASH_DEFAULT_TIMEOUT_SECS: i64 = 0;

/// How a write should expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Stored without a ttl.
    Persistent,
    /// Stored with a ttl.
    Timed(Duration),
    /// Degenerate ttl; the write is skipped and reported as failed.
    Rejected,
}

impl Expiration {
    /// Resolves an optional ttl in seconds, substituting `default_secs` for
    /// `None`.
    pub fn resolve(ttl: Option<i64>, default_secs: i64) -> Self {
        Self::from_secs(ttl.unwrap_or(default_secs))
    }

    /// Classifies an explicit ttl in seconds.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Expiration::Persistent,
            secs if secs > 0 => Expiration::Timed(Duration::from_secs(secs as u64)),
            _ => Expiration::Rejected,
        }
    }

    /// Returns the ttl when the write expires.
    #[inline]
    pub const fn ttl(&self) -> Option<Duration> {
        match self {
            Expiration::Timed(ttl) => Some(*ttl),
            _ => None,
        }
    }

    /// Returns true unless the ttl was rejected.
    #[inline]
    pub const fn allows_write(&self) -> bool {
        !matches!(self, Expiration::Rejected)
    }
}
