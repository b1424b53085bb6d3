//! Hash-field caching.
//!
//! Field names are namespaced with the same prefix and version as the hash
//! name. Hash writes are persistent unless a positive ttl is given, and a ttl
//! always applies to the whole hash.

use std::hash::Hash;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Number;
use tracing::{debug, warn};

use rcache_client::Counter;
use rcache_common::{
    decode, encode, Expiration, RawValue, ToWireKey, WireKey, HASH_DEFAULT_TIMEOUT_SECS,
};

use crate::cache::{add_one, Cache};
use crate::error::{CacheError, CacheResult};

impl Cache {
    /// Fetches and decodes one hash field.
    pub fn hget<N, F, T>(&self, name: &N, field: &F, version: Option<u32>) -> CacheResult<Option<T>>
    where
        N: ToWireKey + ?Sized,
        F: ToWireKey + ?Sized,
        T: DeserializeOwned,
    {
        let name = self.make_key(name, version);
        let field = self.make_key(field, version);
        match self.client.hget(name.as_bytes(), field.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`Cache::hget`], returning `default` for a missing field.
    pub fn hget_or<N, F, T>(&self, name: &N, field: &F, default: T, version: Option<u32>) -> CacheResult<T>
    where
        N: ToWireKey + ?Sized,
        F: ToWireKey + ?Sized,
        T: DeserializeOwned,
    {
        Ok(self.hget(name, field, version)?.unwrap_or(default))
    }

    /// Returns every field of a hash, undecoded and keyed by wire field key.
    pub fn hget_all<N: ToWireKey + ?Sized>(&self, name: &N, version: Option<u32>) -> CacheResult<IndexMap<WireKey, RawValue>> {
        let name = self.make_key(name, version);
        Ok(self
            .client
            .hgetall(name.as_bytes())?
            .into_iter()
            .map(|(field, value)| (WireKey::from_bytes(field), RawValue::new(value)))
            .collect())
    }

    /// Fetches several fields in one `HMGET`, in input order, omitting missing
    /// fields.
    pub fn hget_many<N, K, T>(&self, name: &N, fields: &[K], version: Option<u32>) -> CacheResult<IndexMap<K, T>>
    where
        N: ToWireKey + ?Sized,
        K: ToWireKey + Clone + Eq + Hash,
        T: DeserializeOwned,
    {
        let mut found = IndexMap::with_capacity(fields.len());
        if fields.is_empty() {
            return Ok(found);
        }
        let name = self.make_key(name, version);
        let wire: Vec<WireKey> = fields.iter().map(|field| self.make_key(field, version)).collect();
        let args: Vec<&[u8]> = wire.iter().map(WireKey::as_bytes).collect();
        let values = self.client.hmget(name.as_bytes(), &args)?;
        for (field, raw) in fields.iter().zip(values) {
            if let Some(raw) = raw {
                found.insert(field.clone(), decode(&raw)?);
            }
        }
        Ok(found)
    }

    /// Sets one hash field. Returns `true` when the field was created.
    ///
    /// The field is always written. Only a positive `ttl` touches the hash
    /// expiration, and it applies to the whole hash.
    pub fn hset<N, F, V>(&self, name: &N, field: &F, value: &V, ttl: Option<i64>, version: Option<u32>) -> CacheResult<bool>
    where
        N: ToWireKey + ?Sized,
        F: ToWireKey + ?Sized,
        V: Serialize + ?Sized,
    {
        let name = self.make_key(name, version);
        let field = self.make_key(field, version);
        let expiration = Expiration::resolve(ttl, HASH_DEFAULT_TIMEOUT_SECS);
        let value = encode(value)?.into_bytes();
        let created = self.client.hset(name.as_bytes(), field.as_bytes(), &value)?;
        if let Some(ttl) = expiration.ttl() {
            self.client.expire(name.as_bytes(), ttl)?;
        }
        Ok(created)
    }

    /// Sets several hash fields with one `HMSET` and at most one `EXPIRE`.
    ///
    /// Every value is encoded before anything is sent. An empty mapping sends
    /// nothing and returns `false`.
    pub fn hset_many<N, I, K, V>(&self, name: &N, entries: I, ttl: Option<i64>, version: Option<u32>) -> CacheResult<bool>
    where
        N: ToWireKey + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: ToWireKey,
        V: Serialize,
    {
        let name = self.make_key(name, version);
        let expiration = Expiration::resolve(ttl, HASH_DEFAULT_TIMEOUT_SECS);
        if !expiration.allows_write() {
            debug!(key = %name, "negative ttl, hash write skipped");
            return Ok(false);
        }

        let mut encoded = Vec::new();
        for (field, value) in entries {
            encoded.push((self.make_key(&field, version), encode(&value)?.into_bytes()));
        }
        if encoded.is_empty() {
            return Ok(false);
        }

        let pairs: Vec<(&[u8], &[u8])> = encoded
            .iter()
            .map(|(field, value)| (field.as_bytes(), value.as_slice()))
            .collect();
        self.client.hmset(name.as_bytes(), &pairs)?;
        if let Some(ttl) = expiration.ttl() {
            self.client.expire(name.as_bytes(), ttl)?;
        }
        Ok(true)
    }

    /// Adds `delta` to a numeric hash field.
    ///
    /// Same contract as [`Cache::incr`]: the field must exist, and a rejected
    /// `HINCRBY` falls back to a non-atomic read, add one, `hset` sequence that
    /// leaves the hash expiration untouched.
    pub fn hincr<N, F>(&self, name: &N, field: &F, delta: i64, version: Option<u32>) -> CacheResult<Number>
    where
        N: ToWireKey + ?Sized,
        F: ToWireKey + ?Sized,
    {
        let name = self.make_key(name, version);
        let field = self.make_key(field, version);
        if !self.client.hexists(name.as_bytes(), field.as_bytes())? {
            return Err(CacheError::KeyNotFound { key: field });
        }
        match self.client.hincr_by(name.as_bytes(), field.as_bytes(), delta)? {
            Counter::Value(value) => Ok(Number::from(value)),
            Counter::Rejected(message) => {
                warn!(key = %name, field = %field, reason = %String::from_utf8_lossy(&message), "atomic hash increment rejected, falling back");
                let current = self.client.hget(name.as_bytes(), field.as_bytes())?;
                let next = add_one(&field, current)?;
                self.hset(&name, &field, &next, None, None)?;
                Ok(next)
            }
        }
    }

    /// Returns true when the hash has the field.
    pub fn has_hkey<N, F>(&self, name: &N, field: &F, version: Option<u32>) -> CacheResult<bool>
    where
        N: ToWireKey + ?Sized,
        F: ToWireKey + ?Sized,
    {
        let name = self.make_key(name, version);
        let field = self.make_key(field, version);
        Ok(self.client.hexists(name.as_bytes(), field.as_bytes())?)
    }
}
