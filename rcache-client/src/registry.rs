//! # Pool Registry
//!
//! Purpose: Hand out one connection pool per connection identity so every
//! cache talking to the same server, database and dialect shares sockets.
//!
//! ## Design Principles
//! 1. **Explicit Lifecycle**: Build one registry at startup and pass it by
//!    reference to each cache; there is no process-wide singleton.
//! 2. **Append-Only**: Pools are created on first use and never evicted.
//! 3. **Double-Checked Insertion**: Lookups take the read lock; only a miss
//!    takes the write lock, and re-checks before inserting.
//!
//! ## Usage Notes
//! - The password is not part of the identity. A pool authenticates with the
//!   password of the first `ConnectionInfo` registered for its identity.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::{ConnectionIdentity, ConnectionInfo};
use crate::pool::{ConnectionPool, PoolLimits};

/// Memoizes connection pools by identity.
pub struct PoolRegistry {
    limits: PoolLimits,
    pools: RwLock<HashMap<ConnectionIdentity, ConnectionPool>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        PoolRegistry::new(PoolLimits::default())
    }
}

impl PoolRegistry {
    /// Creates an empty registry whose pools use `limits`.
    pub fn new(limits: PoolLimits) -> Self {
        PoolRegistry {
            limits,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the pool for `info`'s identity, creating it on first use.
    pub fn get_pool(&self, info: &ConnectionInfo) -> ConnectionPool {
        let identity = info.identity();
        if let Some(pool) = self.pools.read().get(&identity) {
            return pool.clone();
        }

        let mut pools = self.pools.write();
        pools
            .entry(identity)
            .or_insert_with(|| {
                debug!(endpoint = %info.endpoint, db = info.db, parser = ?info.parser, "created connection pool");
                ConnectionPool::new(info.clone(), self.limits.clone())
            })
            .clone()
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoint, ParserKind};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;

    fn tcp_info(port: u16, db: u32) -> ConnectionInfo {
        let mut info = ConnectionInfo::new(Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        });
        info.db = db;
        info
    }

    #[test]
    fn same_identity_same_pool() {
        let registry = PoolRegistry::default();
        let a = registry.get_pool(&tcp_info(6379, 1));
        let b = registry.get_pool(&tcp_info(6379, 1));
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_identities_different_pools() {
        let registry = PoolRegistry::default();
        let base = registry.get_pool(&tcp_info(6379, 1));
        let other_db = registry.get_pool(&tcp_info(6379, 2));
        let other_port = registry.get_pool(&tcp_info(6380, 1));

        let mut resp3 = tcp_info(6379, 1);
        resp3.parser = ParserKind::Resp3;
        let other_parser = registry.get_pool(&resp3);

        let mut unix = ConnectionInfo::new(Endpoint::Unix {
            path: PathBuf::from("/tmp/store.sock"),
        });
        unix.db = 1;
        let other_transport = registry.get_pool(&unix);

        for pool in [&other_db, &other_port, &other_parser, &other_transport] {
            assert!(!base.ptr_eq(pool));
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn first_password_wins() {
        let registry = PoolRegistry::default();
        let mut first = tcp_info(6379, 0);
        first.password = Some("first".to_string());
        let mut second = first.clone();
        second.password = Some("second".to_string());

        registry.get_pool(&first);
        let pool = registry.get_pool(&second);
        assert_eq!(pool.info().password.as_deref(), Some("first"));
    }

    #[test]
    fn concurrent_first_use_creates_one_pool() {
        let registry = Arc::new(PoolRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_pool(&tcp_info(7000, 0)))
            })
            .collect();
        let pools: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        for pool in &pools[1..] {
            assert!(pools[0].ptr_eq(pool));
        }
    }

    #[test]
    fn registration_does_not_connect() {
        let registry = PoolRegistry::default();
        assert!(registry.is_empty());
        let pool = registry.get_pool(&tcp_info(1, 0));
        assert_eq!(pool.open_connections(), 0);
    }
}
