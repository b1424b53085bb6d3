//! Set-type helper.

use rcache_common::{Expiration, ToWireKey, DEFAULT_TIMEOUT_SECS};
use tracing::debug;

use crate::cache::Cache;
use crate::error::CacheResult;

impl Cache {
    /// Adds members to a set with one `SADD`, then gives the set one shared
    /// expiration.
    ///
    /// `expiry`: `None` means 24 hours, `Some(0)` leaves the set persistent,
    /// a negative expiry writes nothing. Returns how many members were new.
    ///
    /// `name` goes through the key codec like every other key. Pass a
    /// [`WireKey`](rcache_common::WireKey) to address a set by its exact store
    /// name instead.
    pub fn sadd_list<N, M>(&self, name: &N, members: &[M], expiry: Option<i64>, version: Option<u32>) -> CacheResult<u64>
    where
        N: ToWireKey + ?Sized,
        M: AsRef<[u8]>,
    {
        let name = self.make_key(name, version);
        let expiration = Expiration::resolve(expiry, DEFAULT_TIMEOUT_SECS);
        if !expiration.allows_write() {
            debug!(key = %name, "negative expiry, set write skipped");
            return Ok(0);
        }
        if members.is_empty() {
            return Ok(0);
        }

        let members: Vec<&[u8]> = members.iter().map(AsRef::as_ref).collect();
        let added = self.client.sadd(name.as_bytes(), &members)?;
        if let Some(ttl) = expiration.ttl() {
            self.client.expire(name.as_bytes(), ttl)?;
        }
        Ok(added)
    }
}
